use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// A recognition result a client chose to keep.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub image_base64: String,
    pub ocr_result: Box<RawValue>,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(image_base64: String, ocr_result: Box<RawValue>) -> Self {
        Self {
            id: nanoid::nanoid!(),
            image_base64,
            ocr_result,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug)]
struct ClientHistory {
    entries: Vec<HistoryEntry>,
    last_access: DateTime<Utc>,
}

/// In-memory history keyed by client id.
///
/// A client's history is dropped once it has gone untouched for longer than
/// the TTL. Reads do not count as a touch; adds and successful deletes do.
#[derive(Debug)]
pub struct HistoryStore {
    clients: RwLock<HashMap<String, ClientHistory>>,
    ttl: Duration,
}

impl HistoryStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Entries of `client_id`, newest first. Unknown clients get an empty list.
    pub fn get(&self, client_id: &str) -> Vec<HistoryEntry> {
        let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);
        clients
            .get(client_id)
            .map(|history| history.entries.clone())
            .unwrap_or_default()
    }

    pub fn add(&self, client_id: &str, entry: HistoryEntry) {
        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        let history = clients
            .entry(client_id.to_string())
            .or_insert_with(|| ClientHistory {
                entries: Vec::new(),
                last_access: Utc::now(),
            });
        history.entries.insert(0, entry);
        history.last_access = Utc::now();
    }

    /// Remove one entry. Returns whether it existed.
    pub fn delete(&self, client_id: &str, entry_id: &str) -> bool {
        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        let Some(history) = clients.get_mut(client_id) else {
            return false;
        };
        let Some(pos) = history.entries.iter().position(|e| e.id == entry_id) else {
            return false;
        };
        history.entries.remove(pos);
        history.last_access = Utc::now();
        true
    }

    pub fn clear(&self, client_id: &str) {
        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        clients.remove(client_id);
    }

    /// Drop every client idle for longer than the TTL as of `now`.
    /// Returns how many clients were evicted.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        let before = clients.len();
        clients.retain(|_, history| {
            // Negative idle time (clock moved back) keeps the client.
            match (now - history.last_access).to_std() {
                Ok(idle) => idle <= self.ttl,
                Err(_) => true,
            }
        });
        before - clients.len()
    }

    pub fn client_count(&self) -> usize {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
