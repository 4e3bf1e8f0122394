//! File mapping application with an append-only diff log.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{WorkspaceError, WorkspaceResult};

/// Content for a single file in a mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileContent {
    Text(String),
    /// Written as pretty-printed JSON.
    Structured(Value),
}

impl FileContent {
    /// Render the content exactly as it will be written to disk.
    pub fn render(&self) -> WorkspaceResult<String> {
        match self {
            Self::Text(text) => Ok(text.clone()),
            // serde_json's default map is ordered, so keys come out sorted.
            Self::Structured(value) => Ok(serde_json::to_string_pretty(value)?),
        }
    }
}

impl From<&str> for FileContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for FileContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// Relative path → content. Ordered so application order is stable.
pub type FileMap = BTreeMap<String, FileContent>;

/// Human-readable change descriptors, e.g. `"Updated pages/index.js"`.
pub type DiffLog = Vec<String>;

/// Build a file map from a loosely-typed JSON object.
///
/// String values become text files and objects become structured files.
/// Any other value is skipped. Non-object input yields an empty map.
pub fn file_map_from_value(value: &Value) -> FileMap {
    let mut files = FileMap::new();
    if let Value::Object(entries) = value {
        for (path, content) in entries {
            match content {
                Value::String(text) => {
                    files.insert(path.clone(), FileContent::Text(text.clone()));
                }
                Value::Object(_) => {
                    files.insert(path.clone(), FileContent::Structured(content.clone()));
                }
                other => debug!("Skipping {} with non-file value {}", path, other),
            }
        }
    }
    files
}

/// Writes file mappings into a workspace root.
///
/// Every write replaces the whole file. There is no transaction: if a write
/// fails, earlier entries of the same mapping stay on disk.
#[derive(Debug, Clone)]
pub struct PatchApplier {
    root: PathBuf,
}

impl PatchApplier {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Apply `files`, appending `"<verb> <path>"` to `diffs` for each write.
    ///
    /// Returns the number of files written.
    pub fn apply(&self, files: &FileMap, verb: &str, diffs: &mut DiffLog) -> WorkspaceResult<usize> {
        let mut applied = 0;

        for (relative, content) in files {
            let target = self.resolve(relative)?;
            let rendered = content.render()?;

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|source| WorkspaceError::WriteFailed {
                    path: relative.clone(),
                    source,
                })?;
            }

            if tracing::enabled!(tracing::Level::DEBUG) {
                let previous = fs::read_to_string(&target).unwrap_or_default();
                debug!("{}", unified_diff(&previous, &rendered, relative));
            }

            fs::write(&target, rendered).map_err(|source| WorkspaceError::WriteFailed {
                path: relative.clone(),
                source,
            })?;

            diffs.push(format!("{} {}", verb, relative));
            applied += 1;
        }

        info!("{} {} file(s) in {:?}", verb, applied, self.root);
        Ok(applied)
    }

    /// Join a relative path onto the root, refusing anything that would
    /// land outside it.
    fn resolve(&self, relative: &str) -> WorkspaceResult<PathBuf> {
        let path = Path::new(relative);
        let mut normal = 0;
        for component in path.components() {
            match component {
                Component::Normal(_) => normal += 1,
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(WorkspaceError::PathEscapesWorkspace(relative.to_string()));
                }
            }
        }
        if normal == 0 {
            return Err(WorkspaceError::PathEscapesWorkspace(relative.to_string()));
        }
        Ok(self.root.join(path))
    }
}

/// Files longer than this (on either side) are summarized instead of diffed.
pub const MAX_DIFF_LINES: usize = 2000;

/// Line-level unified-style diff between two versions of `path`.
///
/// Produces a single hunk covering the whole file; unchanged lines are
/// prefixed with a space. Returns an empty string when nothing changed.
/// Past [`MAX_DIFF_LINES`] only the header and line counts are returned.
pub fn unified_diff(old: &str, new: &str, path: &str) -> String {
    if old == new {
        return String::new();
    }

    let a: Vec<&str> = old.lines().collect();
    let b: Vec<&str> = new.lines().collect();

    if a.len() > MAX_DIFF_LINES || b.len() > MAX_DIFF_LINES {
        return format!(
            "--- {}\n+++ {}\n@@ -1,{} +1,{} @@ (too large to diff)\n",
            path,
            path,
            a.len(),
            b.len()
        );
    }

    // Longest common subsequence table, filled from the end.
    let mut lcs = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for i in (0..a.len()).rev() {
        for j in (0..b.len()).rev() {
            lcs[i][j] = if a[i] == b[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut out = format!("--- {}\n+++ {}\n@@ -1,{} +1,{} @@\n", path, path, a.len(), b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() || j < b.len() {
        if i < a.len() && j < b.len() && a[i] == b[j] {
            out.push_str(&format!(" {}\n", a[i]));
            i += 1;
            j += 1;
        } else if j < b.len() && (i == a.len() || lcs[i][j + 1] >= lcs[i + 1][j]) {
            out.push_str(&format!("+{}\n", b[j]));
            j += 1;
        } else {
            out.push_str(&format!("-{}\n", a[i]));
            i += 1;
        }
    }
    out
}
