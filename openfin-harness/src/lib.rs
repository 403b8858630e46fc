//! Exploratory test harness for an OpenFin-style desktop runtime.
//!
//! Probes a locally running runtime instance: lifecycle (launch, running
//! state, close events), window bounds, process stats, and session
//! snapshot restore. The application under test is a static web asset
//! hosted by the harness's own [`FileServer`]; the runtime is spawned via
//! [`launcher`] and controlled over [`RuntimeConnection`].
//!
//! External state never settles instantly, so assertions go through
//! [`wait_until`]: poll a predicate until it reports the expected value
//! or a deadline expires.

pub mod errors;
pub mod launcher;
pub mod process;
pub mod runtime;
pub mod server;
pub mod types;
pub mod wait;

pub use errors::HarnessError;
pub use launcher::{launch, LaunchOptions, RuntimeHandle};
pub use process::ProcessProbe;
pub use runtime::{AppEvent, AppEventKind, RuntimeConnection};
pub use server::FileServer;
pub use types::{
    AppManifest, ProcessInfo, RuntimeOptions, SessionSnapshot, SnapshotWindow, WindowBounds,
};
pub use wait::{try_wait_until, wait_until, wait_until_outcome, WaitOutcome};
