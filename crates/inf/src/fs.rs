use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Suffix appended to the file name of a file that is still being written.
pub const TEMPORARY_SUFFIX: &str = ".tmp";

pub fn create_directory_for_file(p: &Path) -> Result {
    if let Some(parent_dir) = p.parent() {
        create_directory(parent_dir)?;
    }

    Ok(())
}

pub fn create_directory(dir: &Path) -> Result {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }

    std::fs::create_dir_all(dir).map_err(|e| {
        Error::Runtime(format!(
            "Failed to create output directory '{}' ({e})",
            dir.to_string_lossy()
        ))
    })
}

/// The temporary name a file is written under before it is renamed to `p`.
/// The temporary lives next to the target so the final rename never crosses a filesystem boundary.
pub fn temporary_path(p: &Path) -> Result<PathBuf> {
    let file_name = p.file_name().ok_or_else(|| Error::InvalidPath(p.to_path_buf()))?;
    let mut temp_name = file_name.to_os_string();
    temp_name.push(TEMPORARY_SUFFIX);
    Ok(p.with_file_name(temp_name))
}

pub fn is_temporary_path(p: &Path) -> bool {
    p.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.len() > TEMPORARY_SUFFIX.len() && name.ends_with(TEMPORARY_SUFFIX))
}

/// True when `p` is a regular file containing at least one byte.
pub fn is_nonempty_file(p: &Path) -> bool {
    std::fs::metadata(p).is_ok_and(|meta| meta.is_file() && meta.len() > 0)
}

/// Flush the directory entry so a completed rename survives a power loss.
/// Not every platform allows opening a directory, failures are ignored.
pub fn sync_directory(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        handle.sync_all().ok();
    }
}

/// Removes leftovers of writes that were interrupted before they were published.
/// Returns the number of removed files.
pub fn remove_stale_temporaries(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_temporary_path(&path) {
            log::debug!("Removing stale temporary file: {}", path.display());
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }

    Ok(removed)
}

/// A file that is written under a temporary name and only becomes visible under its
/// final name once [`StagedFile::publish`] succeeds.
/// Dropping an unpublished `StagedFile` removes the temporary.
#[derive(Debug)]
pub struct StagedFile {
    temp: PathBuf,
    target: PathBuf,
    published: bool,
}

impl StagedFile {
    pub fn new(target: &Path) -> Result<Self> {
        let temp = temporary_path(target)?;
        if temp.exists() {
            std::fs::remove_file(&temp)?;
        }

        Ok(StagedFile {
            temp,
            target: target.to_path_buf(),
            published: false,
        })
    }

    /// The location the content is written to before it is published
    pub fn path(&self) -> &Path {
        &self.temp
    }

    /// Writes the content to the temporary file and flushes it to disk
    pub fn write(&self, contents: impl AsRef<[u8]>) -> Result {
        let flush_error = |e: std::io::Error| Error::Runtime(format!("Failed to write '{}' ({e})", self.temp.display()));

        let mut file = File::create(&self.temp).map_err(flush_error)?;
        file.write_all(contents.as_ref()).map_err(flush_error)?;
        file.sync_all().map_err(flush_error)
    }

    /// Renames the written content into place.
    pub fn publish(mut self) -> Result {
        std::fs::rename(&self.temp, &self.target).map_err(|e| {
            Error::Runtime(format!(
                "Failed to move '{}' into place ({e})",
                self.target.display()
            ))
        })?;
        self.published = true;

        if let Some(parent) = self.target.parent() {
            sync_directory(parent);
        }

        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.published && self.temp.exists() {
            std::fs::remove_file(&self.temp).ok();
        }
    }
}

/// Replaces the content of `p` with `contents` without ever exposing a partially written file.
pub fn write_atomic(p: &Path, contents: impl AsRef<[u8]>) -> Result {
    create_directory_for_file(p)?;
    let staged = StagedFile::new(p)?;
    staged.write(contents)?;
    staged.publish()
}
