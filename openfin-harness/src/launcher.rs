//! Launches and controls the runtime process under test.
//!
//! Mirrors the two ways the harness historically started the runtime:
//! a fresh launch of the runtime binary with a manifest url, or attaching
//! to an instance that is already listening on a debugger port.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{info, instrument, warn};

use crate::errors::HarnessError;
use crate::process::ProcessProbe;
use crate::wait::wait_until;

/// How to start (or find) the runtime process.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Path to the runtime binary or launch script.
    pub binary: PathBuf,
    /// Url of the application manifest to boot, served by the harness.
    pub config_url: String,
    /// Devtools port the runtime should expose.
    pub remote_debugging_port: Option<u16>,
    /// Attach to an already-running instance at this debugger address
    /// instead of spawning a new process.
    pub attach_to: Option<String>,
    /// Extra arguments appended verbatim.
    pub extra_args: Vec<String>,
    /// Pipe the child's stdout/stderr instead of inheriting them.
    pub piped_stdio: bool,
}

impl LaunchOptions {
    pub fn new(binary: impl Into<PathBuf>, config_url: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            config_url: config_url.into(),
            remote_debugging_port: None,
            attach_to: None,
            extra_args: Vec::new(),
            piped_stdio: false,
        }
    }
}

/// A spawned runtime process.
#[derive(Debug)]
pub struct RuntimeHandle {
    child: Child,
    pid: u32,
}

/// Spawns the runtime described by `options`.
///
/// Returns `Ok(None)` when `attach_to` is set: there is nothing to spawn,
/// the caller connects to the existing instance instead.
#[instrument(skip(options), fields(binary = %options.binary.display()))]
pub async fn launch(options: &LaunchOptions) -> Result<Option<RuntimeHandle>, HarnessError> {
    if let Some(addr) = &options.attach_to {
        info!(%addr, "attaching to existing runtime instance");
        return Ok(None);
    }

    let mut cmd = Command::new(&options.binary);
    cmd.arg(format!("--config={}", options.config_url));
    if let Some(port) = options.remote_debugging_port {
        cmd.arg(format!("--remote-debugging-port={port}"));
    }
    cmd.args(&options.extra_args);
    if options.piped_stdio {
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    }
    cmd.kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| {
        HarnessError::Launch(format!("spawn {}: {e}", options.binary.display()))
    })?;
    let pid = child.id().ok_or_else(|| {
        HarnessError::Launch("runtime process exited before it could be observed".into())
    })?;
    info!(pid, config = %options.config_url, "runtime launched");
    Ok(Some(RuntimeHandle { child, pid }))
}

impl RuntimeHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// True while the child has not been reaped.
    pub fn is_running(&mut self) -> Result<bool, HarnessError> {
        let status = self
            .child
            .try_wait()
            .map_err(|e| HarnessError::Internal(format!("try_wait: {e}")))?;
        Ok(status.is_none())
    }

    /// Kills the process outright. Closing the app through the runtime's
    /// close-application request is the polite path; this is the hammer
    /// for teardown.
    pub async fn kill(&mut self) -> Result<(), HarnessError> {
        self.child
            .kill()
            .await
            .map_err(|e| HarnessError::Internal(format!("kill pid {}: {e}", self.pid)))
    }

    /// Polls the process table until the process is gone or `timeout`
    /// elapses. Returns whether it actually exited.
    #[instrument(skip(self))]
    pub async fn wait_for_exit(
        &mut self,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<bool, HarnessError> {
        // Reap first so a finished child does not linger as a zombie and
        // keep the pid alive in the process table.
        if !self.is_running()? {
            return Ok(true);
        }
        let pid = self.pid;
        let gone = wait_until(
            || async move { !ProcessProbe::pid_alive(pid) },
            true,
            poll_interval,
            timeout,
        )
        .await;
        if gone {
            // Collect the exit status now that the process is gone.
            let _ = self.child.try_wait();
        } else {
            warn!(pid, ?timeout, "runtime still alive after wait");
        }
        Ok(gone)
    }
}
