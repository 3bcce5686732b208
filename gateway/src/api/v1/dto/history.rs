use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::history::HistoryEntry;

/// Request body for `POST /api/v1/history`.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddHistoryRequest {
    /// The image the result belongs to, base64 encoded.
    #[serde(default)]
    pub image_base64: String,
    /// Recognition result to keep, stored as sent.
    #[schema(value_type = Object)]
    pub ocr_result: Box<RawValue>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntryResponse {
    pub id: String,
    pub image_base64: String,
    #[schema(value_type = Object)]
    pub ocr_result: Box<RawValue>,
    pub created_at: DateTime<Utc>,
}

impl From<HistoryEntry> for HistoryEntryResponse {
    fn from(entry: HistoryEntry) -> Self {
        Self {
            id: entry.id,
            image_base64: entry.image_base64,
            ocr_result: entry.ocr_result,
            created_at: entry.created_at,
        }
    }
}

/// Entries of the calling client, newest first.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HistoryListResponse {
    pub entries: Vec<HistoryEntryResponse>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HistoryAddResponse {
    pub entry: HistoryEntryResponse,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HistoryDeleteResponse {
    /// Whether an entry with that id existed.
    pub deleted: bool,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HistoryClearResponse {
    pub cleared: bool,
}
