//! Artifact locator: finds the package an export wrote

use crate::core::error::LocateError;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Find a file with `extension` anywhere under `root`
///
/// Extension matching ignores ASCII case. When several files match, the
/// lexically smallest path wins so repeated runs pick the same one.
pub fn locate(root: &Path, extension: &str) -> Result<PathBuf, LocateError> {
    let wanted = extension.trim_start_matches('.');
    let not_found = || LocateError::NotFound {
        root: root.to_path_buf(),
        extension: wanted.to_string(),
    };

    if !root.exists() {
        return Err(not_found());
    }

    let mut matches = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|source| LocateError::Walk {
            root: root.to_path_buf(),
            source,
        })?;
        let is_package = entry
            .path()
            .extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(wanted))
            .unwrap_or(false);
        if entry.file_type().is_file() && is_package {
            matches.push(entry.into_path());
        }
    }

    matches.sort();
    matches.into_iter().next().ok_or_else(not_found)
}
