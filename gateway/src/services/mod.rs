mod batch;
mod history_cleanup;
mod worker_pool;

pub use batch::BatchProcessor;
pub use history_cleanup::HistoryCleanupManager;
pub use worker_pool::{WorkerPermit, WorkerPool};
