//! Process inspection for runtime instances, via the OS process table.
//!
//! The runtime reports its own stats over the control channel; this is
//! the outside view used to cross-check them and to watch for exits.

use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};

use crate::types::ProcessInfo;

pub struct ProcessProbe {
    system: System,
}

impl Default for ProcessProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    /// Stats for one pid, or `None` if it is not in the process table.
    pub fn info(&mut self, pid: u32) -> Option<ProcessInfo> {
        let pid = Pid::from_u32(pid);
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.system.process(pid).map(|p| ProcessInfo {
            pid: pid.as_u32(),
            name: p.name().to_string_lossy().into_owned(),
            cpu_usage: p.cpu_usage(),
            memory_bytes: p.memory(),
        })
    }

    /// All processes whose name contains `name`.
    pub fn find_by_name(&mut self, name: &str) -> Vec<ProcessInfo> {
        self.system.refresh_processes(ProcessesToUpdate::All, true);
        self.system
            .processes()
            .values()
            .filter(|p| p.name().to_string_lossy().contains(name))
            .map(|p| ProcessInfo {
                pid: p.pid().as_u32(),
                name: p.name().to_string_lossy().into_owned(),
                cpu_usage: p.cpu_usage(),
                memory_bytes: p.memory(),
            })
            .collect()
    }

    /// Whether `pid` is alive. An exited-but-unreaped child shows up in
    /// the table as a zombie; that counts as dead here.
    pub fn is_alive(&mut self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        match self.system.process(pid) {
            Some(p) => !matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead),
            None => false,
        }
    }

    /// One-shot form of [`is_alive`](Self::is_alive) for use inside wait
    /// predicates, where holding a probe across calls is inconvenient.
    pub fn pid_alive(pid: u32) -> bool {
        Self::new().is_alive(pid)
    }
}
