use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{GatewayError, Result};

/// Bounded concurrency gate for recognition calls.
///
/// Clones share the same permits, so one pool handed to the batch processor
/// bounds every batch running against it.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

/// A held worker slot. Dropping it frees the slot on every exit path,
/// including unwinding out of a panicking task.
#[derive(Debug)]
pub struct WorkerPermit {
    _permit: OwnedSemaphorePermit,
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Result<Self> {
        if max_workers == 0 {
            return Err(GatewayError::Validation(
                "worker pool needs at least one worker".to_string(),
            ));
        }
        Ok(Self {
            permits: Arc::new(Semaphore::new(max_workers)),
            capacity: max_workers,
        })
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> Result<WorkerPermit> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| GatewayError::Internal(format!("worker pool closed: {e}")))?;
        Ok(WorkerPermit { _permit: permit })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots not currently held.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
