use std::sync::Arc;

use async_trait::async_trait;
use sprout_runner::{BuildFailure, BuildSupervisor, HealthCheck};
use tracing::{info, warn};

use crate::error::CoreResult;
use crate::stage::{Stage, StageId, StageUpdate};
use crate::state::{PipelineState, StageError};

/// Installs, builds and serves the workspace, then waits for health.
///
/// Every failing invocation bumps `build_retry_count`; the URL is only
/// published after a healthy check.
pub struct BuildStage {
    supervisor: Arc<BuildSupervisor>,
    health: Arc<dyn HealthCheck>,
}

impl BuildStage {
    pub fn new(supervisor: Arc<BuildSupervisor>, health: Arc<dyn HealthCheck>) -> Self {
        Self { supervisor, health }
    }
}

#[async_trait]
impl Stage for BuildStage {
    fn id(&self) -> StageId {
        StageId::Build
    }

    fn description(&self) -> &str {
        "Install, build and serve the workspace"
    }

    async fn execute(&self, state: &PipelineState) -> CoreResult<StageUpdate> {
        if let Some(pid) = state.process_id {
            info!("Stopping previous server pid={}", pid);
            if let Err(e) = self.supervisor.stop(pid).await {
                warn!("Could not stop previous server pid={}: {}", pid, e);
            }
        }

        let retries = state.build_retry_count;
        let root = match state.repo_path.as_ref().filter(|p| p.is_dir()) {
            Some(root) => root,
            None => {
                return Ok(StageUpdate::err("repo_path not set or invalid")
                    .run_url(None)
                    .process_id(None)
                    .last_error(Some(StageError::internal("Invalid repo_path")))
                    .build_retry_count(retries + 1));
            }
        };

        let outcome = self.supervisor.build(root, self.health.as_ref()).await;

        let update = match outcome.error {
            None => StageUpdate::ok(format!(
                "pid={} healthy=true",
                outcome.process_id.map(|p| p.to_string()).unwrap_or_default()
            ))
            .run_url(Some(self.supervisor.config().run_url.clone()))
            .last_error(None),
            Some(failure) => {
                let (note, error) = match &failure {
                    BuildFailure::HealthCheckTimeout { .. } => (
                        format!(
                            "pid={} healthy=false",
                            outcome.process_id.map(|p| p.to_string()).unwrap_or_default()
                        ),
                        StageError::health_timeout(failure.to_string()),
                    ),
                    BuildFailure::CommandFailed { step, stderr, .. } => (
                        format!("{} failed: {}", step, stderr.trim()),
                        StageError::external(failure.to_string()),
                    ),
                    BuildFailure::CommandError { .. } | BuildFailure::SpawnFailed(_) => {
                        (failure.to_string(), StageError::external(failure.to_string()))
                    }
                };
                StageUpdate::err(note)
                    .run_url(None)
                    .last_error(Some(error))
                    .build_retry_count(retries + 1)
            }
        };

        Ok(update
            .process_id(outcome.process_id)
            .build_logs(outcome.logs)
            .repo_path(root.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{FailureKind, StageStatus};
    use sprout_runner::{BuildConfig, FnHealthCheck, MockResponse, MockRunner, ProcessRunner};
    use std::time::Duration;
    use tempfile::TempDir;

    fn stage(runner: &MockRunner, healthy: bool) -> BuildStage {
        let config = BuildConfig::default()
            .health_timeout(Duration::from_millis(30))
            .poll_interval(Duration::from_millis(5));
        let supervisor = BuildSupervisor::new(Arc::new(runner.clone()), config);
        BuildStage::new(Arc::new(supervisor), Arc::new(FnHealthCheck(move || healthy)))
    }

    fn state_in(dir: &TempDir) -> PipelineState {
        let mut state = PipelineState::new("s", "p");
        state.repo_path = Some(dir.path().to_path_buf());
        state
    }

    #[tokio::test]
    async fn test_healthy_build_publishes_url() {
        let dir = TempDir::new().unwrap();
        let runner = MockRunner::new();
        let mut state = state_in(&dir);
        state.last_error = Some(StageError::external("old"));

        let update = stage(&runner, true).execute(&state).await.unwrap();

        assert_eq!(update.status, StageStatus::Ok);
        assert_eq!(update.run_url, Some(Some("http://localhost:3000".to_string())));
        assert_eq!(update.last_error, Some(None));
        assert_eq!(update.build_retry_count, None);
        assert!(matches!(update.process_id, Some(Some(_))));
    }

    #[tokio::test]
    async fn test_install_failure_counts_retry() {
        let dir = TempDir::new().unwrap();
        let runner = MockRunner::new().add_response(MockResponse::failure(1, "npm ERR! 404"));
        let mut state = state_in(&dir);
        state.build_retry_count = 1;

        let update = stage(&runner, true).execute(&state).await.unwrap();

        assert_eq!(update.status, StageStatus::Err);
        assert_eq!(update.build_retry_count, Some(2));
        assert_eq!(update.run_url, Some(None));
        let error = update.last_error.flatten().unwrap();
        assert_eq!(error.kind, FailureKind::ExternalCommandFailure);
        assert!(error.message.contains("npm ERR! 404"));
        assert!(update.build_logs.unwrap().contains("=== npm install ==="));
    }

    #[tokio::test]
    async fn test_unhealthy_server_keeps_pid() {
        let dir = TempDir::new().unwrap();
        let runner = MockRunner::new();

        let update = stage(&runner, false).execute(&state_in(&dir)).await.unwrap();

        assert_eq!(update.run_url, Some(None));
        assert!(matches!(update.process_id, Some(Some(_))));
        assert_eq!(
            update.last_error.flatten().map(|e| e.kind),
            Some(FailureKind::HealthCheckTimeout)
        );
    }

    #[tokio::test]
    async fn test_previous_server_is_stopped() {
        let dir = TempDir::new().unwrap();
        let runner = MockRunner::new();
        let build = stage(&runner, true);
        let first = build.execute(&state_in(&dir)).await.unwrap();
        let old_pid = first.process_id.flatten().unwrap();

        let mut state = state_in(&dir);
        state.process_id = Some(old_pid);
        build.execute(&state).await.unwrap();

        assert!(!runner.is_alive(old_pid).await);
        assert_eq!(runner.get_method_calls("stop").len(), 1);
    }

    #[tokio::test]
    async fn test_missing_workspace() {
        let runner = MockRunner::new();
        let mut state = PipelineState::new("s", "p");
        state.repo_path = Some("/no/such/workspace".into());
        state.run_url = Some("http://localhost:3000".into());

        let update = stage(&runner, true).execute(&state).await.unwrap();

        assert_eq!(update.note, "repo_path not set or invalid");
        assert_eq!(update.run_url, Some(None));
        assert_eq!(update.build_retry_count, Some(1));
        assert_eq!(
            update.last_error.flatten().map(|e| e.message),
            Some("Invalid repo_path".to_string())
        );
        assert!(runner.get_calls().is_empty());
    }
}
