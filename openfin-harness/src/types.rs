//! Shared data types: runtime options, application manifests, window
//! geometry, process stats, session snapshots.

use serde::{Deserialize, Serialize};

/// Options controlling which runtime build the harness talks to and how
/// the control connection is made.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeOptions {
    /// Runtime version string, e.g. "14.78.46.23".
    pub version: String,
    /// Extra command-line arguments passed through to the runtime.
    pub arguments: String,
    /// Local port of the runtime's websocket control channel.
    pub port: u16,
    /// Upper bound on a single control request round-trip, in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            version: String::new(),
            arguments: String::new(),
            port: 9696,
            request_timeout_ms: 10_000,
        }
    }
}

/// The application manifest (`app.json`) served to the runtime at launch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppManifest {
    pub startup_app: StartupApp,
    pub runtime: ManifestRuntime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupApp {
    pub uuid: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub auto_show: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestRuntime {
    pub version: String,
    #[serde(default)]
    pub arguments: String,
}

/// Window geometry as reported and accepted by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub top: i32,
    pub left: i32,
    pub width: u32,
    pub height: u32,
}

/// Process stats for one runtime process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub cpu_usage: f32,
    pub memory_bytes: u64,
}

/// A restorable capture of an application's window layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub windows: Vec<SnapshotWindow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotWindow {
    pub name: String,
    pub url: String,
    pub bounds: WindowBounds,
}
