use std::{
    collections::BTreeSet,
    sync::{Mutex, PoisonError},
};

#[derive(Debug, Default)]
struct CompletionState {
    watermark: usize,
    finished_ahead: BTreeSet<usize>,
}

/// Tracks tiles that finish out of order.
/// The watermark is the length of the longest prefix of the enumeration order in which every tile has finished,
/// it never passes a tile that is still in flight.
#[derive(Debug, Default)]
pub struct TileCompletion {
    state: Mutex<CompletionState>,
}

impl TileCompletion {
    /// All tiles before `start` are considered done
    pub fn starting_at(start: usize) -> Self {
        TileCompletion {
            state: Mutex::new(CompletionState {
                watermark: start,
                finished_ahead: BTreeSet::new(),
            }),
        }
    }

    /// Marks the tile as finished and returns the updated watermark
    pub fn complete(&self, index: usize) -> usize {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if index < state.watermark {
            return state.watermark;
        }

        state.finished_ahead.insert(index);
        loop {
            let next = state.watermark;
            if !state.finished_ahead.remove(&next) {
                break;
            }
            state.watermark += 1;
        }

        state.watermark
    }

    pub fn watermark(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).watermark
    }
}
