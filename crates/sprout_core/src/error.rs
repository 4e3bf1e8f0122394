//! Error types for the core module.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur during core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Run already exists: {0}")]
    RunAlreadyExists(String),

    #[error("Stage not registered: {0}")]
    StageNotFound(String),

    #[error("Invalid pipeline state: {0}")]
    InvalidState(String),

    #[error("Run {0} has no workspace")]
    NoWorkspace(String),

    #[error("Generator failed: {0}")]
    Generator(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Runner error: {0}")]
    Runner(#[from] sprout_runner::RunnerError),

    #[error("Workspace error: {0}")]
    Workspace(#[from] sprout_workspace::WorkspaceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for CoreError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
