use std::sync::Arc;

use async_trait::async_trait;
use sprout_workspace::export_archive;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::CoreResult;
use crate::stage::{Stage, StageId, StageUpdate};
use crate::state::{PipelineState, StageError};

/// Terminal stage: reports the preview and exports the workspace.
pub struct DeployStage {
    config: Arc<PipelineConfig>,
}

impl DeployStage {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Stage for DeployStage {
    fn id(&self) -> StageId {
        StageId::Deploy
    }

    fn description(&self) -> &str {
        "Publish the preview URL and archive the workspace"
    }

    async fn execute(&self, state: &PipelineState) -> CoreResult<StageUpdate> {
        let (Some(root), Some(url)) = (state.repo_path.as_ref(), state.run_url.as_ref()) else {
            let update = StageUpdate::err("missing repo_path or run_url");
            // An earlier failure says more about the run than this one.
            return Ok(match state.last_error {
                Some(_) => update,
                None => update.last_error(Some(StageError::internal("missing repo_path or run_url"))),
            });
        };

        let dest = self.config.work_dir.join(format!("{}-preview", state.slug));
        let mut note = format!("preview ready at {}", url);
        // A failed export leaves the previous archive path in place.
        let archive = match export_archive(root, &dest) {
            Ok(path) => {
                info!("Preview archive at {:?}", path);
                Some(path)
            }
            Err(e) => {
                warn!("Preview export failed: {}", e);
                note.push_str(&format!(" (export failed: {})", e));
                None
            }
        };

        let update = StageUpdate::ok(note).last_error(None);
        Ok(match archive {
            Some(path) => update.archive_path(Some(path)),
            None => update,
        })
    }
}
