//! # sprout_workspace
//!
//! On-disk side of a sprout run: the per-run working directory, the base
//! project template, file mapping application and export.
//!
//! ```rust,no_run
//! use sprout_workspace::{copy_template, create_work_dir, FileMap, PatchApplier};
//! use std::path::Path;
//!
//! let root = create_work_dir(Path::new("work"), "todo-app-1700000000", true)?;
//! copy_template(Path::new("templates/next-basic"), &root)?;
//!
//! let mut files = FileMap::new();
//! files.insert("pages/index.js".into(), "export default () => null".into());
//! let mut diffs = Vec::new();
//! PatchApplier::new(&root).apply(&files, "Updated", &mut diffs)?;
//! # Ok::<(), sprout_workspace::WorkspaceError>(())
//! ```

pub mod archive;
pub mod error;
pub mod patch;
pub mod template;
pub mod workdir;

pub use archive::{export_archive, ARCHIVE_EXTENSION};
pub use error::{WorkspaceError, WorkspaceResult};
pub use patch::{
    file_map_from_value, unified_diff, DiffLog, FileContent, FileMap, PatchApplier, MAX_DIFF_LINES,
};
pub use template::{copy_template, PROJECT_MARKER};
pub use workdir::{create_work_dir, list_files, prepare_workspace, remove_workspace, workspace_path};
