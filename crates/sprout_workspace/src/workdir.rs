//! Per-run working directories.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::WorkspaceResult;

/// Where the workspace for `slug` lives under `base`.
pub fn workspace_path(base: &Path, slug: &str) -> PathBuf {
    base.join(slug)
}

/// Create (if needed) and return the workspace for `slug`.
///
/// With `fresh` set, any existing directory is removed first.
pub fn create_work_dir(base: &Path, slug: &str, fresh: bool) -> WorkspaceResult<PathBuf> {
    let path = workspace_path(base, slug);
    prepare_workspace(&path, fresh)?;
    Ok(path)
}

/// Make sure `path` exists as a directory, wiping it first when `fresh`.
pub fn prepare_workspace(path: &Path, fresh: bool) -> WorkspaceResult<()> {
    if fresh && path.exists() {
        debug!("Wiping existing workspace {:?}", path);
        fs::remove_dir_all(path)?;
    }
    fs::create_dir_all(path)?;
    Ok(())
}

/// Recursively delete a workspace. Best-effort: failures are logged and
/// reported as `false`.
pub fn remove_workspace(path: &Path) -> bool {
    if !path.exists() {
        return true;
    }
    match fs_extra::dir::remove(path) {
        Ok(()) => {
            debug!("Removed workspace {:?}", path);
            true
        }
        Err(e) => {
            warn!("Could not remove workspace {:?}: {}", path, e);
            false
        }
    }
}

/// Relative paths of the files in a workspace, sorted, excluding installed
/// dependencies and build output.
pub fn list_files(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            !(e.file_type().is_dir() && (name == "node_modules" || name == ".next"))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            e.path()
                .strip_prefix(root)
                .ok()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
        })
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_work_dir_fresh_wipes() {
        let base = TempDir::new().unwrap();
        let path = create_work_dir(base.path(), "demo-1", false).unwrap();
        fs::write(path.join("stale.txt"), "old").unwrap();

        let kept = create_work_dir(base.path(), "demo-1", false).unwrap();
        assert!(kept.join("stale.txt").exists());

        let wiped = create_work_dir(base.path(), "demo-1", true).unwrap();
        assert!(wiped.is_dir());
        assert!(!wiped.join("stale.txt").exists());
    }

    #[test]
    fn test_remove_workspace() {
        let base = TempDir::new().unwrap();
        let path = create_work_dir(base.path(), "gone", false).unwrap();
        fs::create_dir_all(path.join("a/b")).unwrap();
        fs::write(path.join("a/b/c.txt"), "x").unwrap();

        assert!(remove_workspace(&path));
        assert!(!path.exists());
        assert!(remove_workspace(&path));
    }

    #[test]
    fn test_list_files_skips_dependencies() {
        let base = TempDir::new().unwrap();
        fs::create_dir_all(base.path().join("pages")).unwrap();
        fs::create_dir_all(base.path().join("node_modules/react")).unwrap();
        fs::write(base.path().join("pages/index.js"), "").unwrap();
        fs::write(base.path().join("package.json"), "{}").unwrap();
        fs::write(base.path().join("node_modules/react/index.js"), "").unwrap();

        assert_eq!(list_files(base.path()), vec!["package.json", "pages/index.js"]);
    }
}
