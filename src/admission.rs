//! Process-wide admission control for top-level batch operations.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Default number of batch operations allowed to run at once.
pub const DEFAULT_ADMISSION_CAPACITY: usize = 100;

/// Non-blocking counting gate in front of the orchestrator.
///
/// Create one per process and hand clones to every request path. Clones share
/// the same slots.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    permits: Arc<Semaphore>,
    capacity: usize,
}

/// Proof of admission. The slot goes back to the gate when the ticket is dropped.
#[derive(Debug)]
#[must_use = "dropping the ticket releases the admission slot immediately"]
pub struct AdmissionTicket {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionTicket {
    /// Return the slot now rather than at end of scope.
    pub fn release(self) {}
}

impl AdmissionGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Reserve a slot if one is free. Never waits.
    pub fn try_acquire(&self) -> Option<AdmissionTicket> {
        self.permits
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| AdmissionTicket { _permit: permit })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Slots currently held by admitted operations.
    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new(DEFAULT_ADMISSION_CAPACITY)
    }
}
