use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::unwrap_output;
use crate::error::CoreResult;
use crate::generator::{default_spec, Generator, ProposalRequest, Role};
use crate::stage::{Stage, StageId, StageUpdate};
use crate::state::PipelineState;

/// Turns the prompt into a structured app spec.
pub struct SpecStage {
    generator: Arc<dyn Generator>,
}

impl SpecStage {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Stage for SpecStage {
    fn id(&self) -> StageId {
        StageId::Spec
    }

    fn description(&self) -> &str {
        "Synthesize an app spec from the prompt"
    }

    async fn execute(&self, state: &PipelineState) -> CoreResult<StageUpdate> {
        let request = ProposalRequest::new(Role::Spec, state.user_prompt.clone());
        let proposal = self.generator.propose(&request).await?;

        Ok(match unwrap_output(proposal.output) {
            Value::Object(spec) => {
                let note = format!("spec with keys: {}", spec.keys().cloned().collect::<Vec<_>>().join(", "));
                StageUpdate::ok(note).spec(Value::Object(spec))
            }
            _ => StageUpdate::ok("default spec").spec(default_spec()),
        })
    }
}
