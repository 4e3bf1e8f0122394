use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use sprout_workspace::{file_map_from_value, PatchApplier};
use tracing::{info, warn};

use super::unwrap_output;
use crate::error::CoreResult;
use crate::generator::{Generator, ProposalRequest, Role};
use crate::stage::{Stage, StageId, StageUpdate};
use crate::state::PipelineState;

/// Characters of build output passed along with a fix request.
const LOG_TAIL_CHARS: usize = 4000;

/// Asks the collaborator for file changes addressing `last_error`.
///
/// A productive fix clears `last_error` and keeps it as `previous_error`.
/// An unproductive one leaves the error in place, which ends the retry loop.
pub struct FixStage {
    generator: Arc<dyn Generator>,
}

impl FixStage {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Stage for FixStage {
    fn id(&self) -> StageId {
        StageId::Fix
    }

    fn description(&self) -> &str {
        "Propose and apply fixes for the last failure"
    }

    async fn execute(&self, state: &PipelineState) -> CoreResult<StageUpdate> {
        let Some(error) = state.last_error.as_ref() else {
            return Ok(StageUpdate::noop("no errors to fix").fixer_applied_fixes(false));
        };
        let Some(root) = state.repo_path.as_ref() else {
            return Ok(StageUpdate::noop("no workspace to fix").fixer_applied_fixes(false));
        };

        let request = ProposalRequest::new(
            Role::Fix,
            format!("Fix this error: {}\n\nRepo path: {}", error.message, root.display()),
        )
        .with_context(json!({
            "error": error,
            "repo_path": root,
            "build_logs": log_tail(&state.build_logs),
        }));

        let output = match self.generator.propose(&request).await {
            Ok(proposal) => proposal.output,
            Err(e) => {
                warn!("Fix proposal failed: {}", e);
                return Ok(StageUpdate::noop(format!("fixed_files=0 (generator failed: {})", e))
                    .fixer_applied_fixes(false));
            }
        };

        let files = file_map_from_value(&unwrap_output(output));
        let mut diffs = Vec::new();
        // Writes are not transactional; whatever landed before a failure counts.
        let (applied, failure) = match PatchApplier::new(root).apply(&files, "Fixed", &mut diffs) {
            Ok(applied) => (applied, None),
            Err(e) => {
                warn!("Fix application stopped after {} file(s): {}", diffs.len(), e);
                (diffs.len(), Some(e))
            }
        };

        let mut note = format!("fixed_files={}", applied);
        if let Some(e) = &failure {
            note.push_str(&format!(" (failed to apply fixes: {})", e));
        }

        if applied == 0 {
            let update = match failure {
                Some(_) => StageUpdate::err(note),
                None => StageUpdate::noop(note),
            };
            return Ok(update.fixer_applied_fixes(false));
        }

        info!("Applied {} fix(es) for {}", applied, error.kind);
        Ok(StageUpdate::ok(note)
            .diffs(diffs)
            .fixer_applied_fixes(true)
            .previous_error(Some(error.clone()))
            .last_error(None))
    }
}

fn log_tail(logs: &str) -> &str {
    if logs.len() <= LOG_TAIL_CHARS {
        return logs;
    }
    let mut start = logs.len() - LOG_TAIL_CHARS;
    while !logs.is_char_boundary(start) {
        start += 1;
    }
    &logs[start..]
}
