use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Runtime connection error: {0}")]
    Connection(String),

    #[error("Runtime protocol error: {0}")]
    Protocol(String),

    #[error("Failed to launch runtime process: {0}")]
    Launch(String),

    #[error("File server error: {0}")]
    Server(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
