use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::unwrap_output;
use crate::error::CoreResult;
use crate::generator::{default_plan, Generator, ProposalRequest, Role};
use crate::stage::{Stage, StageId, StageUpdate};
use crate::state::PipelineState;

/// Breaks the spec into file-level tasks.
pub struct PlanStage {
    generator: Arc<dyn Generator>,
}

impl PlanStage {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Stage for PlanStage {
    fn id(&self) -> StageId {
        StageId::Plan
    }

    fn description(&self) -> &str {
        "Plan implementation tasks for the spec"
    }

    async fn execute(&self, state: &PipelineState) -> CoreResult<StageUpdate> {
        let request = ProposalRequest::new(Role::Plan, state.user_prompt.clone())
            .with_context(json!({ "spec": state.spec }));
        let proposal = self.generator.propose(&request).await?;

        Ok(match unwrap_output(proposal.output) {
            Value::Array(tasks) => StageUpdate::ok(format!("{} task(s)", tasks.len())).plan(Value::Array(tasks)),
            _ => StageUpdate::ok("default plan").plan(default_plan()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{MockGenerator, Proposal};

    #[tokio::test]
    async fn test_plan_receives_spec() {
        let mut generator = MockGenerator::new();
        generator
            .expect_propose()
            .withf(|r| r.role == Role::Plan && r.context["spec"]["pages"][0] == "/")
            .returning(|_| {
                Ok(Proposal::new(json!({"output": [
                    {"id": "t1", "description": "index", "files": ["pages/index.js"]},
                    {"id": "t2", "description": "api", "files": ["pages/api/data.js"]}
                ]})))
            });
        let mut state = PipelineState::new("s", "p");
        state.spec = Some(json!({"pages": ["/"]}));

        let update = PlanStage::new(Arc::new(generator)).execute(&state).await.unwrap();

        assert_eq!(update.note, "2 task(s)");
        assert_eq!(update.plan.unwrap().as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_object_output_falls_back() {
        let mut generator = MockGenerator::new();
        generator
            .expect_propose()
            .returning(|_| Ok(Proposal::new(json!({"task": "everything"}))));

        let update = PlanStage::new(Arc::new(generator))
            .execute(&PipelineState::new("s", "p"))
            .await
            .unwrap();

        assert_eq!(update.plan, Some(default_plan()));
    }
}
