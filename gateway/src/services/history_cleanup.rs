use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::history::HistoryStore;

/// Periodically evicts client histories that have been idle past their TTL.
#[derive(Clone)]
pub struct HistoryCleanupManager {
    store: Arc<HistoryStore>,
    interval_secs: u64,
}

impl HistoryCleanupManager {
    pub fn new(store: Arc<HistoryStore>, interval_secs: u64) -> Self {
        Self {
            store,
            interval_secs,
        }
    }

    /// Run a single eviction pass. Returns the number of clients evicted.
    pub fn run_once(&self) -> usize {
        let evicted = self.store.evict_expired(Utc::now());

        if evicted == 0 {
            debug!("No expired client histories");
        } else {
            info!(
                "History cleanup complete: {} clients evicted, {} remaining",
                evicted,
                self.store.client_count()
            );
        }

        evicted
    }

    /// Get the configured interval in seconds
    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }
}
