//! Pipeline state threaded through the graph.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome recorded for a single stage invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Ok,
    Err,
    Noop,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Err => "err",
            Self::Noop => "noop",
        }
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One line of the task log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub stage: String,
    pub timestamp: DateTime<Utc>,
    pub status: StageStatus,
    pub note: String,
}

impl LogEntry {
    pub fn new(stage: impl Into<String>, status: StageStatus, note: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            timestamp: Utc::now(),
            status,
            note: note.into(),
        }
    }
}

/// Classification of a failure recorded in the pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// An install or build command exited non-zero or could not run.
    ExternalCommandFailure,
    /// The server started but never answered its health check.
    HealthCheckTimeout,
    /// A stage returned an error or panicked.
    StageInternalFailure,
    /// The engine itself failed outside any stage.
    TerminalGraphFailure,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExternalCommandFailure => "external_command_failure",
            Self::HealthCheckTimeout => "health_check_timeout",
            Self::StageInternalFailure => "stage_internal_failure",
            Self::TerminalGraphFailure => "terminal_graph_failure",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A failure diagnostic with its classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageError {
    pub kind: FailureKind,
    pub message: String,
}

impl StageError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ExternalCommandFailure, message)
    }

    pub fn health_timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::HealthCheckTimeout, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FailureKind::StageInternalFailure, message)
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self::new(FailureKind::TerminalGraphFailure, message)
    }
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// The record every stage reads and the graph engine updates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub slug: String,
    /// Request driving this invocation
    pub user_prompt: String,
    /// True when re-entering the graph to edit an existing run
    pub edit_mode: bool,
    pub spec: Option<Value>,
    pub plan: Option<Value>,
    /// Workspace root once scaffolded
    pub repo_path: Option<PathBuf>,
    /// Append-only change log
    pub file_diffs: Vec<String>,
    /// Append-only audit trail, one entry per stage invocation
    pub task_log: Vec<LogEntry>,
    pub last_error: Option<StageError>,
    /// Error that the most recent productive fix addressed
    pub previous_error: Option<StageError>,
    pub build_retry_count: u32,
    pub fixer_applied_fixes: bool,
    /// Set only while the most recent build is healthy
    pub run_url: Option<String>,
    pub process_id: Option<u32>,
    pub build_logs: String,
    pub archive_path: Option<PathBuf>,
}

impl PipelineState {
    pub fn new(slug: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            user_prompt: user_prompt.into(),
            ..Default::default()
        }
    }

    /// A run succeeded when it ends with a verified URL.
    pub fn succeeded(&self) -> bool {
        self.run_url.is_some()
    }

    /// Task log entries recorded for `stage`.
    pub fn entries_for<'a>(&'a self, stage: &'a str) -> impl Iterator<Item = &'a LogEntry> + 'a {
        self.task_log.iter().filter(move |e| e.stage == stage)
    }

    /// `(stage, status)` pairs in order, for summaries.
    pub fn trail(&self) -> Vec<(String, StageStatus)> {
        self.task_log.iter().map(|e| (e.stage.clone(), e.status)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serializes_with_snake_case_kinds() {
        let mut state = PipelineState::new("demo-1", "a todo app");
        state.last_error = Some(StageError::health_timeout("Dev server not responding"));
        state.task_log.push(LogEntry::new("Builder", StageStatus::Err, "pid=1 healthy=false"));

        let json = serde_json::to_value(&state).unwrap();

        assert_eq!(json["last_error"]["kind"], "health_check_timeout");
        assert_eq!(json["task_log"][0]["status"], "err");
        let back: PipelineState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_entries_for_and_trail() {
        let mut state = PipelineState::new("s", "p");
        state.task_log.push(LogEntry::new("Builder", StageStatus::Err, ""));
        state.task_log.push(LogEntry::new("Fixer", StageStatus::Ok, ""));
        state.task_log.push(LogEntry::new("Builder", StageStatus::Ok, ""));

        assert_eq!(state.entries_for("Builder").count(), 2);
        assert_eq!(
            state.trail(),
            vec![
                ("Builder".to_string(), StageStatus::Err),
                ("Fixer".to_string(), StageStatus::Ok),
                ("Builder".to_string(), StageStatus::Ok),
            ]
        );
        assert!(!state.succeeded());
    }
}
