use std::path::{Path, PathBuf};

use crate::{Error, Result};

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(ext)))
}

/// Recursively lists the files in `dir` with one of the `extensions` (case insensitive).
/// The result is sorted, the checkpoint indices are only meaningful for a stable file order.
pub fn find_source_files(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let dir_str = dir.to_str().ok_or_else(|| Error::Inf(inf::Error::InvalidPath(dir.to_path_buf())))?;
    let pattern = format!("{}/**/*", glob::Pattern::escape(dir_str.trim_end_matches('/')));

    let mut files = Vec::new();
    for entry in glob::glob(&pattern).map_err(|e| Error::InvalidConfiguration(format!("Invalid source directory: {e}")))? {
        match entry {
            Ok(path) => {
                if path.is_file() && has_extension(&path, extensions) {
                    files.push(path);
                }
            }
            Err(e) => log::warn!("Failed to list {}: {}", e.path().display(), e.error()),
        }
    }

    files.sort();
    Ok(files)
}
