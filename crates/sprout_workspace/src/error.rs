//! Error types for workspace operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for workspace operations.
pub type WorkspaceResult<T> = Result<T, WorkspaceError>;

/// Errors that can occur while preparing or patching a workspace.
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("Template directory not found: {0}")]
    TemplateNotFound(PathBuf),

    #[error("Path escapes the workspace: {0}")]
    PathEscapesWorkspace(String),

    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Template copy failed: {0}")]
    CopyFailed(String),

    #[error("Archive export failed: {0}")]
    ArchiveFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
