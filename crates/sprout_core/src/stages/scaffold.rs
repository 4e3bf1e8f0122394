use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use sprout_workspace::{
    copy_template, file_map_from_value, prepare_workspace, workspace_path, PatchApplier,
    WorkspaceError,
};
use tracing::{info, warn};

use super::unwrap_output;
use crate::config::PipelineConfig;
use crate::error::CoreResult;
use crate::generator::{default_file_map, Generator, ProposalRequest, Role};
use crate::stage::{Stage, StageId, StageUpdate};
use crate::state::{PipelineState, StageError};

/// Prepares the workspace and writes the generated project files into it.
pub struct ScaffoldStage {
    generator: Arc<dyn Generator>,
    config: Arc<PipelineConfig>,
}

impl ScaffoldStage {
    pub fn new(generator: Arc<dyn Generator>, config: Arc<PipelineConfig>) -> Self {
        Self { generator, config }
    }
}

#[async_trait]
impl Stage for ScaffoldStage {
    fn id(&self) -> StageId {
        StageId::Scaffold
    }

    fn description(&self) -> &str {
        "Scaffold the project workspace"
    }

    async fn execute(&self, state: &PipelineState) -> CoreResult<StageUpdate> {
        let request = ProposalRequest::new(Role::Scaffold, state.user_prompt.clone())
            .with_context(json!({ "spec": state.spec, "plan": state.plan }));
        let proposal = self.generator.propose(&request).await?;

        let mut files = file_map_from_value(&unwrap_output(proposal.output));
        if files.is_empty() {
            info!("No usable files proposed, using the default project");
            files = file_map_from_value(&default_file_map());
        }

        let root = state
            .repo_path
            .clone()
            .unwrap_or_else(|| workspace_path(&self.config.work_dir, &state.slug));
        prepare_workspace(&root, !state.edit_mode)?;

        match copy_template(&self.config.template_dir, &root) {
            Ok(_) => {}
            Err(WorkspaceError::TemplateNotFound(dir)) => {
                warn!("Template {:?} not found, scaffolding from generated files only", dir)
            }
            Err(e) => return Err(e.into()),
        }

        let mut diffs = Vec::new();
        let update = match PatchApplier::new(&root).apply(&files, "Updated", &mut diffs) {
            Ok(applied) => StageUpdate::ok(format!("applied {} file(s)", applied)),
            Err(e) => {
                let message = format!("Failed to scaffold: {}", e);
                StageUpdate::err(message.clone()).last_error(Some(StageError::internal(message)))
            }
        };

        Ok(update.repo_path(root).diffs(diffs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{MockGenerator, Proposal};
    use crate::state::StageStatus;
    use std::fs;
    use tempfile::TempDir;

    fn setup(output: serde_json::Value) -> (TempDir, ScaffoldStage) {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join("template");
        fs::create_dir_all(template.join("pages/api")).unwrap();
        fs::write(template.join("pages/api/health.js"), "ok").unwrap();

        let config = PipelineConfig::default()
            .work_dir(dir.path().join("work"))
            .template_dir(template);
        let mut generator = MockGenerator::new();
        generator
            .expect_propose()
            .returning(move |_| Ok(Proposal::new(output.clone())));

        (dir, ScaffoldStage::new(Arc::new(generator), Arc::new(config)))
    }

    #[tokio::test]
    async fn test_fresh_scaffold_wipes_and_writes() {
        let (dir, stage) = setup(json!({"output": {"pages/index.js": "hi", "package.json": {"name": "x"}}}));
        let root = dir.path().join("work/demo-1");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("stale.txt"), "old").unwrap();

        let update = stage.execute(&PipelineState::new("demo-1", "p")).await.unwrap();

        assert_eq!(update.status, StageStatus::Ok);
        assert_eq!(update.repo_path.as_deref(), Some(root.as_path()));
        assert_eq!(update.file_diffs, vec!["Updated package.json", "Updated pages/index.js"]);
        assert!(!root.join("stale.txt").exists());
        assert!(root.join("pages/api/health.js").exists());
        assert_eq!(fs::read_to_string(root.join("pages/index.js")).unwrap(), "hi");
    }

    #[tokio::test]
    async fn test_edit_keeps_workspace() {
        let (dir, stage) = setup(json!({"pages/index.js": "edited"}));
        let root = dir.path().join("work/demo-2");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("package.json"), "{}").unwrap();
        fs::write(root.join("notes.md"), "keep").unwrap();

        let mut state = PipelineState::new("demo-2", "p");
        state.edit_mode = true;
        state.repo_path = Some(root.clone());
        let update = stage.execute(&state).await.unwrap();

        assert_eq!(update.file_diffs, vec!["Updated pages/index.js"]);
        assert!(root.join("notes.md").exists());
        // Already scaffolded, so the template was not copied again.
        assert!(!root.join("pages/api/health.js").exists());
    }

    #[tokio::test]
    async fn test_empty_output_uses_default_project() {
        let (dir, stage) = setup(json!({}));

        let update = stage.execute(&PipelineState::new("demo-3", "p")).await.unwrap();

        assert_eq!(update.file_diffs.len(), 4);
        assert!(dir.path().join("work/demo-3/tailwind.config.js").exists());
    }

    #[tokio::test]
    async fn test_escaping_path_is_recorded() {
        let (_dir, stage) = setup(json!({"../evil.js": "x", "a.js": "y"}));

        let update = stage.execute(&PipelineState::new("demo-4", "p")).await.unwrap();

        assert_eq!(update.status, StageStatus::Err);
        assert!(update.repo_path.is_some());
        assert!(matches!(update.last_error, Some(Some(_))));
    }
}
