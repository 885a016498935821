//! Shared state written by the item tasks of one batch.

use std::sync::OnceLock;

use parking_lot::Mutex;

use super::types::FetchResult;
use crate::error::FetchError;

/// Append-only collection of successful fetches.
///
/// Pre-sized to the batch length so concurrent pushes never reallocate. Only
/// read after every writer has finished.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    entries: Mutex<Vec<FetchResult>>,
}

impl ResultAggregator {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    pub fn push(&self, result: FetchResult) {
        self.entries.lock().push(result);
    }

    /// Take everything collected so far, in completion order.
    pub fn take(&self) -> Vec<FetchResult> {
        std::mem::take(&mut *self.entries.lock())
    }
}

/// Single-assignment cell for the first failure of a batch.
///
/// The first `record` wins, later ones are no-ops. Readers never race a write:
/// [`OnceLock`] publishes the value atomically.
#[derive(Debug, Default)]
pub struct ErrorSlot {
    slot: OnceLock<FetchError>,
}

impl ErrorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer an error. Returns true if this call was the one that filled the slot.
    pub fn record(&self, error: FetchError) -> bool {
        self.slot.set(error).is_ok()
    }

    pub fn get(&self) -> Option<&FetchError> {
        self.slot.get()
    }
}
