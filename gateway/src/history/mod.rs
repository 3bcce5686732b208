//! Per-client history of recognition results, kept in memory with idle expiry.

mod store;

pub use store::{HistoryEntry, HistoryStore};
