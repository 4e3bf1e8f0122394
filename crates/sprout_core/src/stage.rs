//! Stage definitions and the executor that makes every stage total.
//!
//! A stage reads the current [`PipelineState`] and returns a [`StageUpdate`]:
//! the fields it wants to change plus the status and note of its task log
//! entry. The [`StageExecutor`] merges the update, so stages never touch the
//! state directly and each invocation leaves exactly one log entry behind,
//! whether the stage succeeded, failed or panicked.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::error::CoreResult;
use crate::state::{LogEntry, PipelineState, StageError, StageStatus};

/// Nodes of the pipeline graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageId {
    Spec,
    Plan,
    Scaffold,
    Build,
    Fix,
    Deploy,
}

impl StageId {
    /// Node name used in task logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Spec => "SpecSynthesizer",
            StageId::Plan => "Planner",
            StageId::Scaffold => "Scaffolder",
            StageId::Build => "Builder",
            StageId::Fix => "Fixer",
            StageId::Deploy => "PreviewDeploy",
        }
    }

    pub fn all() -> [StageId; 6] {
        [
            StageId::Spec,
            StageId::Plan,
            StageId::Scaffold,
            StageId::Build,
            StageId::Fix,
            StageId::Deploy,
        ]
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Partial state update returned by a stage.
///
/// `None` leaves a field as it is. Clearable fields are `Option<Option<_>>`
/// so a stage can distinguish "unchanged" from "cleared". Diff entries are
/// appended.
#[derive(Debug, Clone, PartialEq)]
pub struct StageUpdate {
    pub status: StageStatus,
    pub note: String,
    pub spec: Option<Value>,
    pub plan: Option<Value>,
    pub repo_path: Option<PathBuf>,
    pub file_diffs: Vec<String>,
    pub last_error: Option<Option<StageError>>,
    pub previous_error: Option<Option<StageError>>,
    pub build_retry_count: Option<u32>,
    pub fixer_applied_fixes: Option<bool>,
    pub run_url: Option<Option<String>>,
    pub process_id: Option<Option<u32>>,
    pub build_logs: Option<String>,
    pub archive_path: Option<Option<PathBuf>>,
}

impl StageUpdate {
    pub fn new(status: StageStatus, note: impl Into<String>) -> Self {
        Self {
            status,
            note: note.into(),
            spec: None,
            plan: None,
            repo_path: None,
            file_diffs: Vec::new(),
            last_error: None,
            previous_error: None,
            build_retry_count: None,
            fixer_applied_fixes: None,
            run_url: None,
            process_id: None,
            build_logs: None,
            archive_path: None,
        }
    }

    pub fn ok(note: impl Into<String>) -> Self {
        Self::new(StageStatus::Ok, note)
    }

    pub fn err(note: impl Into<String>) -> Self {
        Self::new(StageStatus::Err, note)
    }

    pub fn noop(note: impl Into<String>) -> Self {
        Self::new(StageStatus::Noop, note)
    }

    pub fn spec(mut self, spec: Value) -> Self {
        self.spec = Some(spec);
        self
    }

    pub fn plan(mut self, plan: Value) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn repo_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.repo_path = Some(path.into());
        self
    }

    pub fn diffs(mut self, diffs: Vec<String>) -> Self {
        self.file_diffs.extend(diffs);
        self
    }

    pub fn last_error(mut self, error: Option<StageError>) -> Self {
        self.last_error = Some(error);
        self
    }

    pub fn previous_error(mut self, error: Option<StageError>) -> Self {
        self.previous_error = Some(error);
        self
    }

    pub fn build_retry_count(mut self, count: u32) -> Self {
        self.build_retry_count = Some(count);
        self
    }

    pub fn fixer_applied_fixes(mut self, applied: bool) -> Self {
        self.fixer_applied_fixes = Some(applied);
        self
    }

    pub fn run_url(mut self, url: Option<String>) -> Self {
        self.run_url = Some(url);
        self
    }

    pub fn process_id(mut self, pid: Option<u32>) -> Self {
        self.process_id = Some(pid);
        self
    }

    pub fn build_logs(mut self, logs: impl Into<String>) -> Self {
        self.build_logs = Some(logs.into());
        self
    }

    pub fn archive_path(mut self, path: Option<PathBuf>) -> Self {
        self.archive_path = Some(path);
        self
    }

    /// Merge into `state` and append the task log entry for `stage`.
    pub fn apply(self, stage: StageId, state: &mut PipelineState) {
        if let Some(spec) = self.spec {
            state.spec = Some(spec);
        }
        if let Some(plan) = self.plan {
            state.plan = Some(plan);
        }
        if let Some(path) = self.repo_path {
            state.repo_path = Some(path);
        }
        state.file_diffs.extend(self.file_diffs);
        if let Some(error) = self.last_error {
            state.last_error = error;
        }
        if let Some(error) = self.previous_error {
            state.previous_error = error;
        }
        if let Some(count) = self.build_retry_count {
            state.build_retry_count = count;
        }
        if let Some(applied) = self.fixer_applied_fixes {
            state.fixer_applied_fixes = applied;
        }
        if let Some(url) = self.run_url {
            state.run_url = url;
        }
        if let Some(pid) = self.process_id {
            state.process_id = pid;
        }
        if let Some(logs) = self.build_logs {
            state.build_logs = logs;
        }
        if let Some(path) = self.archive_path {
            state.archive_path = path;
        }
        state
            .task_log
            .push(LogEntry::new(stage.as_str(), self.status, self.note));
    }
}

/// A node of the pipeline graph.
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    fn description(&self) -> &str;

    /// Compute the update for `state`. Errors are recorded by the executor
    /// as internal failures; they never abort the run.
    async fn execute(&self, state: &PipelineState) -> CoreResult<StageUpdate>;
}

/// Runs a stage as a total `PipelineState -> PipelineState` function.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageExecutor;

impl StageExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Invoke `stage` and merge its result into `state`.
    ///
    /// The stage runs on its own task so that a panic is contained and
    /// reported like any other internal failure.
    pub async fn invoke(&self, stage: Arc<dyn Stage>, mut state: PipelineState) -> PipelineState {
        let id = stage.id();
        let snapshot = state.clone();
        let joined = tokio::spawn(async move { stage.execute(&snapshot).await }).await;

        let update = match joined {
            Ok(Ok(update)) => {
                debug!("{} finished with {}", id, update.status);
                update
            }
            Ok(Err(e)) => {
                error!("{} failed: {}", id, e);
                StageUpdate::err(e.to_string()).last_error(Some(StageError::internal(e.to_string())))
            }
            Err(join_error) => {
                let message = if join_error.is_panic() {
                    format!("{} panicked", id)
                } else {
                    format!("{} was cancelled", id)
                };
                error!("{}", message);
                StageUpdate::err(message.clone()).last_error(Some(StageError::internal(message)))
            }
        };

        update.apply(id, &mut state);
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::state::FailureKind;

    struct Fixed(CoreResult<StageUpdate>);

    #[async_trait]
    impl Stage for Fixed {
        fn id(&self) -> StageId {
            StageId::Plan
        }

        fn description(&self) -> &str {
            "returns a canned result"
        }

        async fn execute(&self, _state: &PipelineState) -> CoreResult<StageUpdate> {
            match &self.0 {
                Ok(update) => Ok(update.clone()),
                Err(e) => Err(CoreError::InvalidState(e.to_string())),
            }
        }
    }

    struct Panics;

    #[async_trait]
    impl Stage for Panics {
        fn id(&self) -> StageId {
            StageId::Spec
        }

        fn description(&self) -> &str {
            "always panics"
        }

        async fn execute(&self, _state: &PipelineState) -> CoreResult<StageUpdate> {
            panic!("boom")
        }
    }

    #[test]
    fn test_apply_overwrites_present_fields_only() {
        let mut state = PipelineState::new("s", "p");
        state.run_url = Some("http://localhost:3000".into());
        state.build_retry_count = 2;
        state.file_diffs.push("Updated a".into());

        StageUpdate::ok("done")
            .diffs(vec!["Fixed b".into()])
            .last_error(None)
            .apply(StageId::Fix, &mut state);

        assert_eq!(state.run_url.as_deref(), Some("http://localhost:3000"));
        assert_eq!(state.build_retry_count, 2);
        assert_eq!(state.file_diffs, vec!["Updated a", "Fixed b"]);
        assert_eq!(state.task_log.len(), 1);
        assert_eq!(state.task_log[0].stage, "Fixer");

        StageUpdate::ok("").run_url(None).apply(StageId::Build, &mut state);
        assert!(state.run_url.is_none());
    }

    #[tokio::test]
    async fn test_executor_records_one_entry() {
        let stage = Arc::new(Fixed(Ok(StageUpdate::ok("planned").plan(serde_json::json!([])))));

        let state = StageExecutor::new().invoke(stage, PipelineState::new("s", "p")).await;

        assert_eq!(state.task_log.len(), 1);
        assert_eq!(state.task_log[0].status, StageStatus::Ok);
        assert_eq!(state.plan, Some(serde_json::json!([])));
    }

    #[tokio::test]
    async fn test_executor_converts_errors() {
        let stage = Arc::new(Fixed(Err(CoreError::InvalidState("no plan".into()))));

        let state = StageExecutor::new().invoke(stage, PipelineState::new("s", "p")).await;

        assert_eq!(state.task_log.len(), 1);
        assert_eq!(state.task_log[0].status, StageStatus::Err);
        let error = state.last_error.unwrap();
        assert_eq!(error.kind, FailureKind::StageInternalFailure);
        assert!(error.message.contains("no plan"));
    }

    #[tokio::test]
    async fn test_executor_contains_panics() {
        let state = StageExecutor::new()
            .invoke(Arc::new(Panics), PipelineState::new("s", "p"))
            .await;

        assert_eq!(state.task_log.len(), 1);
        assert_eq!(state.task_log[0].stage, "SpecSynthesizer");
        assert_eq!(
            state.last_error.map(|e| e.kind),
            Some(FailureKind::StageInternalFailure)
        );
    }
}
