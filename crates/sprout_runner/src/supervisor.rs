//! Build supervisor: install, build, serve, then wait for health.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{BuildConfig, CommandSpec};
use crate::error::RunnerResult;
use crate::health::{wait_until_healthy, HealthCheck};
use crate::runner::ProcessRunner;

/// Steps of a build cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStep {
    Install,
    Build,
    Serve,
}

impl BuildStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Build => "build",
            Self::Serve => "serve",
        }
    }
}

impl std::fmt::Display for BuildStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a build cycle did not produce a healthy server.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildFailure {
    #[error("{step} failed with exit code {exit_code}: {stderr}")]
    CommandFailed {
        step: BuildStep,
        exit_code: i64,
        stderr: String,
    },

    #[error("{step} could not run: {message}")]
    CommandError { step: BuildStep, message: String },

    #[error("server could not be started: {0}")]
    SpawnFailed(String),

    #[error("Dev server not responding within {timeout_ms}ms")]
    HealthCheckTimeout { timeout_ms: u64 },
}

impl BuildFailure {
    /// True when the server came up but never reported healthy.
    pub fn is_health_timeout(&self) -> bool {
        matches!(self, Self::HealthCheckTimeout { .. })
    }
}

/// Result of one build cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildOutcome {
    pub success: bool,
    pub process_id: Option<u32>,
    pub logs: String,
    pub error: Option<BuildFailure>,
}

impl BuildOutcome {
    fn failed(logs: String, process_id: Option<u32>, failure: BuildFailure) -> Self {
        Self {
            success: false,
            process_id,
            logs,
            error: Some(failure),
        }
    }
}

/// Runs the install → build → serve → health sequence for a workspace.
///
/// Install and build short-circuit on a non-zero exit. The server is
/// spawned detached and its pid returned whether or not it becomes healthy;
/// success is decided by the health predicate alone.
pub struct BuildSupervisor {
    runner: Arc<dyn ProcessRunner>,
    config: BuildConfig,
}

impl BuildSupervisor {
    pub fn new(runner: Arc<dyn ProcessRunner>, config: BuildConfig) -> Self {
        Self { runner, config }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn runner(&self) -> Arc<dyn ProcessRunner> {
        self.runner.clone()
    }

    /// Run a full build cycle in `workspace`.
    pub async fn build(&self, workspace: &Path, health: &dyn HealthCheck) -> BuildOutcome {
        let mut logs = String::new();

        if let Some(cache) = &self.config.cache_dir {
            let cache_path = workspace.join(cache);
            match std::fs::remove_dir_all(&cache_path) {
                Ok(()) => debug!("Cleared build cache at {:?}", cache_path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Could not clear build cache {:?}: {}", cache_path, e),
            }
        }

        for (step, command) in [
            (BuildStep::Install, self.config.install_command(workspace)),
            (BuildStep::Build, self.config.build_command(workspace)),
        ] {
            if let Err(failure) = self.run_step(step, &command, &mut logs).await {
                return BuildOutcome::failed(logs, None, failure);
            }
        }

        let log_file = workspace.join(&self.config.log_file);
        let pid = match self.runner.spawn(&self.config.serve, workspace, &log_file).await {
            Ok(pid) => pid,
            Err(e) => {
                error!("Failed to start server in {:?}: {}", workspace, e);
                return BuildOutcome::failed(logs, None, BuildFailure::SpawnFailed(e.to_string()));
            }
        };

        let healthy = wait_until_healthy(
            health,
            self.config.health_timeout_duration(),
            self.config.poll_interval_duration(),
        )
        .await;

        info!("Server pid={} healthy={}", pid, healthy);

        if healthy {
            BuildOutcome {
                success: true,
                process_id: Some(pid),
                logs,
                error: None,
            }
        } else {
            BuildOutcome::failed(
                logs,
                Some(pid),
                BuildFailure::HealthCheckTimeout {
                    timeout_ms: self.config.health_timeout_ms,
                },
            )
        }
    }

    async fn run_step(
        &self,
        step: BuildStep,
        command: &CommandSpec,
        logs: &mut String,
    ) -> Result<(), BuildFailure> {
        info!("Running {}: {}", step, command.display());
        logs.push_str(&format!("\n=== {} ===\n", command.display()));

        match self.runner.run(command).await {
            Ok(output) => {
                logs.push_str(&output.stdout);
                logs.push('\n');
                logs.push_str(&output.stderr);

                if output.success() {
                    Ok(())
                } else {
                    error!("{} exited with {}", step, output.exit_code);
                    Err(BuildFailure::CommandFailed {
                        step,
                        exit_code: output.exit_code,
                        stderr: output.stderr,
                    })
                }
            }
            Err(e) => {
                error!("{} could not run: {}", step, e);
                logs.push_str(&e.to_string());
                Err(BuildFailure::CommandError {
                    step,
                    message: e.to_string(),
                })
            }
        }
    }

    /// Stop a server process: terminate, then force-kill after the grace period.
    pub async fn stop(&self, pid: u32) -> RunnerResult<()> {
        self.runner.stop(pid, self.config.stop_grace_duration()).await
    }
}
