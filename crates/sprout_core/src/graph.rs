//! Graph engine: runs stages along a fixed transition table.
//!
//! ```text
//! Spec -> Plan -> Scaffold -> Build --(ok)--------------------> Deploy
//!                               ^  \--(error / no url)--> Fix --/
//!                               \---------(retry)---------/
//! ```
//!
//! The engine holds no run state and is shared across runs behind an `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info, info_span, warn, Instrument};

use crate::error::{CoreError, CoreResult};
use crate::retry::RetryPolicy;
use crate::stage::{Stage, StageExecutor, StageId};
use crate::state::{LogEntry, PipelineState, StageError, StageStatus};

/// Task log stage name for failures outside any stage.
pub const GRAPH_STAGE: &str = "Graph";

/// Outgoing edge of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Unconditional edge.
    Always(StageId),
    /// Decided by [`RetryPolicy::after_build`].
    AfterBuild,
    /// Decided by [`RetryPolicy::after_fix`].
    AfterFix,
    /// The run ends after this stage.
    Terminal,
}

/// The pipeline's edges: Spec→Plan→Scaffold→Build, then the two
/// conditional edges, then Deploy as the only terminal stage.
pub fn default_transitions() -> HashMap<StageId, Transition> {
    HashMap::from([
        (StageId::Spec, Transition::Always(StageId::Plan)),
        (StageId::Plan, Transition::Always(StageId::Scaffold)),
        (StageId::Scaffold, Transition::Always(StageId::Build)),
        (StageId::Build, Transition::AfterBuild),
        (StageId::Fix, Transition::AfterFix),
        (StageId::Deploy, Transition::Terminal),
    ])
}

pub struct GraphEngine {
    stages: HashMap<StageId, Arc<dyn Stage>>,
    transitions: HashMap<StageId, Transition>,
    entry: StageId,
    policy: RetryPolicy,
    executor: StageExecutor,
}

impl GraphEngine {
    /// Engine with the default transition table and no stages registered.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            stages: HashMap::new(),
            transitions: default_transitions(),
            entry: StageId::Spec,
            policy,
            executor: StageExecutor::new(),
        }
    }

    /// Register a stage under its own id, replacing any previous one.
    pub fn register(&mut self, stage: Arc<dyn Stage>) {
        self.stages.insert(stage.id(), stage);
    }

    pub fn with_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.register(stage);
        self
    }

    pub fn with_stages(mut self, stages: impl IntoIterator<Item = Arc<dyn Stage>>) -> Self {
        for stage in stages {
            self.register(stage);
        }
        self
    }

    /// Replace the outgoing edge of `from`.
    pub fn with_transition(mut self, from: StageId, transition: Transition) -> Self {
        self.transitions.insert(from, transition);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn is_registered(&self, id: StageId) -> bool {
        self.stages.contains_key(&id)
    }

    /// Run the graph from the entry stage until a terminal stage.
    ///
    /// Never fails: an error outside the stages is appended to the task log
    /// as a `Graph` entry, mirrored into `last_error`, and the partial state
    /// is returned.
    pub async fn run(&self, state: PipelineState) -> PipelineState {
        let span = info_span!("run", slug = %state.slug);
        async move {
            let mut state = state;
            if let Err(e) = self.drive(&mut state).await {
                error!("Graph execution failed: {}", e);
                state
                    .task_log
                    .push(LogEntry::new(GRAPH_STAGE, StageStatus::Err, e.to_string()));
                state.last_error = Some(StageError::terminal(e.to_string()));
            }
            self.log_summary(&state);
            state
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, state: &mut PipelineState) -> CoreResult<()> {
        let mut current = self.entry;
        let mut step = 0usize;
        let mut build_visits = 0u32;

        loop {
            step += 1;
            let stage = self
                .stages
                .get(&current)
                .cloned()
                .ok_or_else(|| CoreError::StageNotFound(current.to_string()))?;

            if current == StageId::Build {
                build_visits += 1;
            }

            info!("Executing stage [{}]: {}", step, current);
            *state = self.executor.invoke(stage, std::mem::take(state)).await;
            if let Some(entry) = state.task_log.last() {
                info!("Stage {} completed: {} {}", current, entry.status, entry.note);
            }

            let transition = self
                .transitions
                .get(&current)
                .copied()
                .ok_or_else(|| CoreError::InvalidState(format!("no transition from {}", current)))?;

            let mut next = match transition {
                Transition::Always(next) => next,
                Transition::AfterBuild => self.policy.after_build(state),
                Transition::AfterFix => self.policy.after_fix(state),
                Transition::Terminal => return Ok(()),
            };

            if next == StageId::Build && build_visits >= self.policy.max_build_visits() {
                warn!(
                    "Builder already ran {} time(s), routing to {}",
                    build_visits,
                    StageId::Deploy
                );
                next = StageId::Deploy;
            }

            current = next;
        }
    }

    fn log_summary(&self, state: &PipelineState) {
        let trail: Vec<String> = state
            .trail()
            .into_iter()
            .map(|(stage, status)| format!("{}:{}", stage, status))
            .collect();
        info!(
            slug = %state.slug,
            repo_path = ?state.repo_path,
            run_url = ?state.run_url,
            last_error = ?state.last_error.as_ref().map(|e| e.to_string()),
            "Run finished: {}",
            trail.join(" -> ")
        );
    }
}

impl std::fmt::Debug for GraphEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphEngine")
            .field("stages", &self.stages.keys().collect::<Vec<_>>())
            .field("entry", &self.entry)
            .field("policy", &self.policy)
            .finish()
    }
}
