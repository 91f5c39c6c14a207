use std::{
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// All tiles of the files before `current_file_index` and the tiles `0..current_tile_index`
/// of file `current_file_index` are complete or were intentionally skipped.
/// The indices refer to the sorted source file list and the tile enumeration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(alias = "current_file")]
    pub current_file_index: usize,
    #[serde(alias = "current_tile", alias = "current_square")]
    pub current_tile_index: usize,
}

impl Checkpoint {
    pub fn new(current_file_index: usize, current_tile_index: usize) -> Self {
        Checkpoint {
            current_file_index,
            current_tile_index,
        }
    }
}

/// Persists the checkpoint as a json file.
/// Saves replace the file atomically and are serialized, a crash never leaves a partial checkpoint behind.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    last_saved: Mutex<Option<Checkpoint>>,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CheckpointStore {
            path: path.into(),
            last_saved: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, reason: impl ToString) -> Error {
        Error::CheckpointIOError {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    /// Returns the stored checkpoint, or the start of the batch if no checkpoint was saved yet
    pub fn load(&self) -> Result<Checkpoint> {
        let checkpoint = match std::fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| self.io_error(e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Checkpoint::default(),
            Err(e) => return Err(self.io_error(e)),
        };

        *self.last_saved.lock().unwrap_or_else(PoisonError::into_inner) = Some(checkpoint);
        Ok(checkpoint)
    }

    pub fn save(&self, file_index: usize, tile_index: usize) -> Result {
        let mut last_saved = self.last_saved.lock().unwrap_or_else(PoisonError::into_inner);
        let checkpoint = Checkpoint::new(file_index, tile_index);
        self.write(&checkpoint)?;
        *last_saved = Some(checkpoint);
        Ok(())
    }

    /// Saves the checkpoint only if it lies beyond the last saved one.
    /// Used by concurrent tile completions that may report their progress out of order.
    pub fn advance(&self, file_index: usize, tile_index: usize) -> Result<bool> {
        let mut last_saved = self.last_saved.lock().unwrap_or_else(PoisonError::into_inner);
        let checkpoint = Checkpoint::new(file_index, tile_index);
        if last_saved.is_some_and(|last| last >= checkpoint) {
            return Ok(false);
        }

        self.write(&checkpoint)?;
        *last_saved = Some(checkpoint);
        Ok(true)
    }

    fn write(&self, checkpoint: &Checkpoint) -> Result {
        let contents = serde_json::to_string_pretty(checkpoint).map_err(|e| self.io_error(e))?;
        inf::fs::write_atomic(&self.path, contents).map_err(|e| self.io_error(e))?;
        log::debug!(
            "Checkpoint saved: file {} tile {}",
            checkpoint.current_file_index,
            checkpoint.current_tile_index
        );
        Ok(())
    }
}
