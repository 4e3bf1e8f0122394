//! Run registry: the process-wide slug → run mapping.
//!
//! Each run sits behind its own async mutex. Holding the guard from
//! [`RunRegistry::lock`] across a whole graph invocation queues other
//! requests for the same slug, while different slugs proceed independently.
//! A request still queued when the run is destroyed gets `RunNotFound`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sprout_runner::BuildSupervisor;
use sprout_workspace::remove_workspace;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::state::PipelineState;

/// A registered run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub slug: String,
    /// Prompt of the build that created the run; edits are phrased against it
    pub initial_prompt: String,
    pub state: PipelineState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    destroyed: bool,
}

impl Run {
    pub fn new(slug: impl Into<String>, initial_prompt: impl Into<String>) -> Self {
        let slug = slug.into();
        let initial_prompt = initial_prompt.into();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            state: PipelineState::new(slug.clone(), initial_prompt.clone()),
            slug,
            initial_prompt,
            created_at: now,
            updated_at: now,
            destroyed: false,
        }
    }

    /// Replace the pipeline state and bump `updated_at`.
    pub fn update(&mut self, state: PipelineState) {
        self.state = state;
        self.updated_at = Utc::now();
    }

    /// True once the registry has torn the run down.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

type RunHandle = Arc<Mutex<Run>>;

/// Owns every run, its server process and its workspace.
pub struct RunRegistry {
    runs: RwLock<HashMap<String, RunHandle>>,
    supervisor: Arc<BuildSupervisor>,
}

impl RunRegistry {
    pub fn new(supervisor: Arc<BuildSupervisor>) -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            supervisor,
        }
    }

    /// Register a new run for `slug`.
    pub async fn create(&self, slug: &str, initial_prompt: &str) -> CoreResult<Run> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(slug) {
            return Err(CoreError::RunAlreadyExists(slug.to_string()));
        }
        let run = Run::new(slug, initial_prompt);
        runs.insert(slug.to_string(), Arc::new(Mutex::new(run.clone())));
        info!("Registered run {} ({})", slug, run.id);
        Ok(run)
    }

    /// Snapshot of a run. Waits while the run is locked.
    pub async fn get(&self, slug: &str) -> Option<Run> {
        let handle = self.handle(slug).await?;
        let run = handle.lock().await;
        (!run.destroyed).then(|| run.clone())
    }

    pub async fn get_required(&self, slug: &str) -> CoreResult<Run> {
        self.get(slug)
            .await
            .ok_or_else(|| CoreError::RunNotFound(slug.to_string()))
    }

    /// Replace a run wholesale.
    pub async fn put(&self, slug: &str, run: Run) -> CoreResult<()> {
        let handle = self
            .handle(slug)
            .await
            .ok_or_else(|| CoreError::RunNotFound(slug.to_string()))?;
        let mut current = handle.lock().await;
        if current.destroyed {
            return Err(CoreError::RunNotFound(slug.to_string()));
        }
        *current = Run { destroyed: false, ..run };
        current.updated_at = Utc::now();
        Ok(())
    }

    /// Exclusive access to a run until the guard is dropped.
    ///
    /// Fails with `RunNotFound` if the run was destroyed while waiting.
    pub async fn lock(&self, slug: &str) -> CoreResult<OwnedMutexGuard<Run>> {
        let handle = self
            .handle(slug)
            .await
            .ok_or_else(|| CoreError::RunNotFound(slug.to_string()))?;
        let guard = handle.lock_owned().await;
        if guard.destroyed {
            return Err(CoreError::RunNotFound(slug.to_string()));
        }
        Ok(guard)
    }

    /// Stop the run's server, delete its workspace and preview archive, and
    /// forget it.
    ///
    /// Process and filesystem cleanup are best-effort; a server that already
    /// exited is not an error. The entry is removed before the run's lock is
    /// released, and requests still queued on it fail with `RunNotFound`.
    pub async fn destroy(&self, slug: &str) -> CoreResult<()> {
        let mut run = self.lock(slug).await?;
        run.destroyed = true;

        if let Some(pid) = run.state.process_id.take() {
            self.stop_process(pid).await;
        }
        if let Some(repo) = &run.state.repo_path {
            remove_workspace(repo);
        }
        if let Some(archive) = run.state.archive_path.take() {
            match std::fs::remove_file(&archive) {
                Ok(()) => debug!("Removed archive {:?}", archive),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Could not remove archive {:?}: {}", archive, e),
            }
        }

        self.runs.write().await.remove(slug);
        drop(run);
        info!("Destroyed run {}", slug);
        Ok(())
    }

    /// Stop a server process, logging instead of failing.
    pub async fn stop_process(&self, pid: u32) {
        match self.supervisor.stop(pid).await {
            Ok(()) => debug!("Stopped pid={}", pid),
            Err(e) => warn!("Could not stop pid={}: {}", pid, e),
        }
    }

    /// Exact slug if registered, else the first registered slug containing it.
    pub async fn resolve(&self, slug: &str) -> Option<String> {
        let runs = self.runs.read().await;
        if runs.contains_key(slug) {
            return Some(slug.to_string());
        }
        if slug.is_empty() {
            return None;
        }
        let mut matches: Vec<&String> = runs.keys().filter(|k| k.contains(slug)).collect();
        matches.sort();
        matches.first().map(|s| s.to_string())
    }

    /// Registered slugs, sorted.
    pub async fn slugs(&self) -> Vec<String> {
        let mut slugs: Vec<String> = self.runs.read().await.keys().cloned().collect();
        slugs.sort();
        slugs
    }

    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runs.read().await.is_empty()
    }

    async fn handle(&self, slug: &str) -> Option<RunHandle> {
        self.runs.read().await.get(slug).cloned()
    }
}

impl std::fmt::Debug for RunRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunRegistry").finish_non_exhaustive()
    }
}
