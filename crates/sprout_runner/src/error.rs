//! Error types for the runner module.

use thiserror::Error;

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that can occur while running or controlling processes.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Empty command line")]
    EmptyCommand,

    #[error("Failed to spawn {program}: {message}")]
    SpawnFailed { program: String, message: String },

    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Command timeout after {0} seconds")]
    Timeout(u64),

    #[error("Failed to signal process {pid}: {message}")]
    SignalFailed { pid: u32, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
