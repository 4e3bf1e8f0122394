//! Copying the base project template into a workspace.

use std::fs;
use std::path::Path;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{WorkspaceError, WorkspaceResult};

/// File whose presence marks a workspace as already scaffolded.
pub const PROJECT_MARKER: &str = "package.json";

/// Directories never copied out of a template.
const SKIPPED_DIRS: &[&str] = &["node_modules", ".next", ".git"];

/// Copy `template_dir` into `workspace` unless the workspace already holds
/// a project.
///
/// Returns `true` when files were copied. Existing files in the workspace
/// are overwritten by template files of the same name.
pub fn copy_template(template_dir: &Path, workspace: &Path) -> WorkspaceResult<bool> {
    if workspace.join(PROJECT_MARKER).exists() {
        debug!("{:?} already scaffolded, skipping template copy", workspace);
        return Ok(false);
    }
    if !template_dir.is_dir() {
        return Err(WorkspaceError::TemplateNotFound(template_dir.to_path_buf()));
    }

    fs::create_dir_all(workspace)?;
    info!("Copying template {:?} to {:?}", template_dir, workspace);

    let mut copied = 0usize;
    let walker = WalkDir::new(template_dir)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| {
            !(e.file_type().is_dir()
                && SKIPPED_DIRS.contains(&e.file_name().to_string_lossy().as_ref()))
        });

    for entry in walker {
        let entry = entry.map_err(|e| WorkspaceError::CopyFailed(e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(template_dir)
            .map_err(|e| WorkspaceError::CopyFailed(e.to_string()))?;
        let target = workspace.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }

    debug!("Copied {} template file(s)", copied);
    Ok(true)
}
