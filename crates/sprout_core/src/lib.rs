//! # sprout_core
//!
//! Pipeline engine for sprout: turns a prompt into a running preview by
//! threading a [`PipelineState`] through six stages.
//!
//! # Architecture
//!
//! - **Stages**: spec, plan, scaffold, build, fix and deploy, each a [`Stage`]
//! - **Executor**: makes every stage a total state transform
//! - **Graph**: fixed transition table with a bounded build/fix loop
//! - **Registry**: slug → run mapping with per-run locking
//! - **Service**: build, edit, export and reset requests
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sprout_core::{PipelineConfig, RunService, TemplateGenerator};
//! use sprout_runner::{HttpHealthCheck, SystemRunner};
//!
//! # async fn demo() -> sprout_core::CoreResult<()> {
//! let config = PipelineConfig::load(None)?;
//! let health = Arc::new(HttpHealthCheck::new(config.build.health_url.clone()));
//! let service = RunService::new(
//!     config,
//!     Arc::new(TemplateGenerator::new()),
//!     Arc::new(SystemRunner::new()),
//!     health,
//! );
//!
//! let run = service.build("a todo list with a dark navbar").await?;
//! println!("{} -> {:?}", run.slug, run.state.run_url);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod generator;
pub mod graph;
pub mod intent;
pub mod registry;
pub mod retry;
pub mod service;
pub mod stage;
pub mod stages;
pub mod state;

pub use config::PipelineConfig;
pub use error::{CoreError, CoreResult};
pub use generator::{
    default_file_map, default_plan, default_spec, parse_json_output, Generator, Proposal,
    ProposalRequest, Role, ScriptedGenerator, TemplateGenerator,
};
pub use graph::{default_transitions, GraphEngine, Transition, GRAPH_STAGE};
pub use intent::{detect_intent, make_slug, Intent, IntentAction};
pub use registry::{Run, RunRegistry};
pub use retry::{RetryPolicy, DEFAULT_MAX_RETRIES};
pub use service::RunService;
pub use stage::{Stage, StageExecutor, StageId, StageUpdate};
pub use stages::{pipeline_stages, StageDeps};
pub use state::{FailureKind, LogEntry, PipelineState, StageError, StageStatus};
