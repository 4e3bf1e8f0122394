//! The six pipeline stages.

mod build;
mod deploy;
mod fix;
mod plan;
mod scaffold;
mod spec;

use std::sync::Arc;

use serde_json::Value;
use sprout_runner::{BuildSupervisor, HealthCheck};

use crate::config::PipelineConfig;
use crate::generator::{parse_json_output, Generator};
use crate::stage::Stage;

pub use build::BuildStage;
pub use deploy::DeployStage;
pub use fix::FixStage;
pub use plan::PlanStage;
pub use scaffold::ScaffoldStage;
pub use spec::SpecStage;

/// Collaborators shared by the stages.
#[derive(Clone)]
pub struct StageDeps {
    pub config: Arc<PipelineConfig>,
    pub generator: Arc<dyn Generator>,
    pub supervisor: Arc<BuildSupervisor>,
    pub health: Arc<dyn HealthCheck>,
}

/// One instance of every stage, ready to register with a `GraphEngine`.
pub fn pipeline_stages(deps: &StageDeps) -> Vec<Arc<dyn Stage>> {
    vec![
        Arc::new(SpecStage::new(deps.generator.clone())),
        Arc::new(PlanStage::new(deps.generator.clone())),
        Arc::new(ScaffoldStage::new(deps.generator.clone(), deps.config.clone())),
        Arc::new(BuildStage::new(deps.supervisor.clone(), deps.health.clone())),
        Arc::new(FixStage::new(deps.generator.clone())),
        Arc::new(DeployStage::new(deps.config.clone())),
    ]
}

/// Unwrap `{"output": ...}` envelopes and decode JSON carried in strings.
pub(crate) fn unwrap_output(value: Value) -> Value {
    match value {
        Value::String(text) => match parse_json_output(&text) {
            Some(parsed) => unwrap_output(parsed),
            None => Value::String(text),
        },
        Value::Object(mut map) if map.len() == 1 && map.contains_key("output") => {
            unwrap_output(map.remove("output").unwrap_or(Value::Null))
        }
        other => other,
    }
}
