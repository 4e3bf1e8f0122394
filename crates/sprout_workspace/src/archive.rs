//! Workspace export as a gzip tarball.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::info;

use crate::error::{WorkspaceError, WorkspaceResult};

/// Extension appended to the destination stem.
pub const ARCHIVE_EXTENSION: &str = "tar.gz";

/// Archive `root` to `<dest_without_ext>.tar.gz` using the system `tar`.
///
/// Installed dependencies and build output are left out. The destination
/// may lie inside `root`; the tarball is staged beside `root` and moved into
/// place afterwards. Returns the path of the archive.
pub fn export_archive(root: &Path, dest_without_ext: &Path) -> WorkspaceResult<PathBuf> {
    if !root.is_dir() {
        return Err(WorkspaceError::ArchiveFailed(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let mut dest = dest_without_ext.as_os_str().to_os_string();
    dest.push(".");
    dest.push(ARCHIVE_EXTENSION);
    let dest = PathBuf::from(dest);

    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workspace".to_string());
    let staging = root
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!(".{}.export.partial", name));

    let output = Command::new("tar")
        .arg("-czf")
        .arg(&staging)
        .arg("--exclude=./node_modules")
        .arg("--exclude=./.next")
        .arg("-C")
        .arg(root)
        .arg(".")
        .output()
        .map_err(|e| WorkspaceError::ArchiveFailed(format!("failed to run tar: {}", e)))?;

    if !output.status.success() {
        let _ = fs::remove_file(&staging);
        return Err(WorkspaceError::ArchiveFailed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    fs::rename(&staging, &dest)?;

    info!("Exported {:?} to {:?}", root, dest);
    Ok(dest)
}
