//! Request handling on top of the engine and the registry.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use sprout_runner::{BuildSupervisor, HealthCheck, ProcessRunner};
use sprout_workspace::export_archive;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{CoreError, CoreResult};
use crate::generator::Generator;
use crate::graph::GraphEngine;
use crate::intent::{clean_slug, detect_intent, make_slug, IntentAction};
use crate::registry::{Run, RunRegistry};
use crate::stages::{pipeline_stages, StageDeps};
use crate::state::PipelineState;

/// Builds, edits, exports and resets runs.
pub struct RunService {
    config: Arc<PipelineConfig>,
    engine: Arc<GraphEngine>,
    registry: Arc<RunRegistry>,
}

impl RunService {
    /// Wire the full pipeline from its external collaborators.
    pub fn new(
        config: PipelineConfig,
        generator: Arc<dyn Generator>,
        runner: Arc<dyn ProcessRunner>,
        health: Arc<dyn HealthCheck>,
    ) -> Self {
        let config = Arc::new(config);
        let supervisor = Arc::new(BuildSupervisor::new(runner, config.build.clone()));
        let deps = StageDeps {
            config: config.clone(),
            generator,
            supervisor: supervisor.clone(),
            health,
        };
        let engine = GraphEngine::new(config.retry_policy()).with_stages(pipeline_stages(&deps));

        Self {
            config,
            engine: Arc::new(engine),
            registry: Arc::new(RunRegistry::new(supervisor)),
        }
    }

    pub fn from_parts(config: Arc<PipelineConfig>, engine: Arc<GraphEngine>, registry: Arc<RunRegistry>) -> Self {
        Self {
            config,
            engine,
            registry,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<GraphEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }

    /// Start a new run for `prompt`.
    ///
    /// Only one preview server runs at a time, so every other run is torn
    /// down first.
    pub async fn build(&self, prompt: &str) -> CoreResult<Run> {
        let slug = self.fresh_slug(prompt).await;

        for other in self.registry.slugs().await {
            if other != slug {
                info!("Tearing down run {} before new build", other);
                if let Err(e) = self.registry.destroy(&other).await {
                    warn!("Could not tear down {}: {}", other, e);
                }
            }
        }

        self.registry.create(&slug, prompt).await?;
        let mut run = self.registry.lock(&slug).await?;

        info!("Building {} for: {}", slug, prompt);
        let result = self.engine.run(PipelineState::new(slug.clone(), prompt)).await;
        run.update(result);
        Ok(run.clone())
    }

    /// Apply `prompt` as an edit to an existing run.
    pub async fn edit(&self, slug: &str, prompt: &str) -> CoreResult<Run> {
        let wanted = clean_slug(slug);
        let slug = self
            .registry
            .resolve(&wanted)
            .await
            .ok_or(CoreError::RunNotFound(wanted))?;
        let mut run = self.registry.lock(&slug).await?;

        if let Some(pid) = run.state.process_id {
            self.registry.stop_process(pid).await;
        }

        let previous = &run.state;
        let state = PipelineState {
            slug: slug.clone(),
            user_prompt: format!(
                "Original app: {}. Edit requirement: {}",
                run.initial_prompt, prompt
            ),
            edit_mode: true,
            repo_path: previous.repo_path.clone(),
            task_log: previous.task_log.clone(),
            file_diffs: previous.file_diffs.clone(),
            archive_path: previous.archive_path.clone(),
            ..Default::default()
        };

        info!("Editing {}: {}", slug, prompt);
        let result = self.engine.run(state).await;
        run.update(result);
        Ok(run.clone())
    }

    /// Route a request by intent. A build aimed at a known slug becomes an edit.
    pub async fn process(&self, prompt: &str, slug: Option<&str>) -> CoreResult<Run> {
        let intent = detect_intent(prompt, slug);
        let existing = match &intent.slug {
            Some(slug) => self.registry.resolve(slug).await,
            None => None,
        };

        match (intent.action, existing, intent.slug) {
            (_, Some(existing), _) => self.edit(&existing, &intent.details).await,
            (IntentAction::Edit, None, Some(slug)) => Err(CoreError::RunNotFound(slug)),
            _ => self.build(&intent.details).await,
        }
    }

    /// Archive a run's workspace to `<work_dir>/<slug>/artifact.tar.gz`.
    pub async fn export(&self, slug: &str) -> CoreResult<PathBuf> {
        let run = self.registry.get_required(slug).await?;
        let repo = run
            .state
            .repo_path
            .ok_or_else(|| CoreError::NoWorkspace(slug.to_string()))?;
        let dest = self.config.work_dir.join(slug).join("artifact");
        Ok(export_archive(&repo, &dest)?)
    }

    /// Stop, delete and forget a run.
    pub async fn reset(&self, slug: &str) -> CoreResult<()> {
        self.registry.destroy(slug).await
    }

    /// Stop every run's server, keeping workspaces and registry entries.
    pub async fn stop_all(&self) {
        for slug in self.registry.slugs().await {
            if let Ok(mut run) = self.registry.lock(&slug).await {
                if let Some(pid) = run.state.process_id.take() {
                    self.registry.stop_process(pid).await;
                }
            }
        }
    }

    async fn fresh_slug(&self, prompt: &str) -> String {
        let base = make_slug(prompt, Utc::now().timestamp());
        let mut slug = base.clone();
        let mut n = 2;
        while self.registry.resolve(&slug).await.as_deref() == Some(slug.as_str()) {
            slug = format!("{}-{}", base, n);
            n += 1;
        }
        slug
    }
}
