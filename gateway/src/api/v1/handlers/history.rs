//! v1 history handlers. Every route is scoped to the `X-Client-ID` header.

use axum::extract::{Path, State};

use crate::api::extractors::{AppJson, ClientId};
use crate::api::state::AppState;
use crate::api::v1::dto::{
    AddHistoryRequest, HistoryAddResponse, HistoryClearResponse, HistoryDeleteResponse,
    HistoryEntryResponse, HistoryListResponse,
};
use crate::api::v1::response::{ApiError, ApiResponse};
use crate::history::HistoryEntry;

/// `GET /api/v1/history`
#[utoipa::path(
    get,
    path = "/api/v1/history",
    tag = "history",
    operation_id = "history.list",
    params(("X-Client-ID" = String, Header, description = "Client whose history to read")),
    responses(
        (status = 200, description = "Entries, newest first", body = HistoryListResponse),
        (status = 400, description = "Missing X-Client-ID header", body = ApiError),
    )
)]
pub async fn list_history(
    State(state): State<AppState>,
    ClientId(client_id): ClientId,
) -> ApiResponse<HistoryListResponse> {
    let entries = state
        .history
        .get(&client_id)
        .into_iter()
        .map(HistoryEntryResponse::from)
        .collect();
    ApiResponse::success(HistoryListResponse { entries })
}

/// `POST /api/v1/history`
#[utoipa::path(
    post,
    path = "/api/v1/history",
    tag = "history",
    operation_id = "history.add",
    params(("X-Client-ID" = String, Header, description = "Client the entry belongs to")),
    request_body = AddHistoryRequest,
    responses(
        (status = 200, description = "Entry stored", body = HistoryAddResponse),
        (status = 400, description = "Missing X-Client-ID header or invalid body", body = ApiError),
    )
)]
pub async fn add_history(
    State(state): State<AppState>,
    ClientId(client_id): ClientId,
    AppJson(req): AppJson<AddHistoryRequest>,
) -> ApiResponse<HistoryAddResponse> {
    let entry = HistoryEntry::new(req.image_base64, req.ocr_result);
    state.history.add(&client_id, entry.clone());
    tracing::debug!(client_id = %client_id, entry_id = %entry.id, "History entry added");

    ApiResponse::success(HistoryAddResponse {
        entry: entry.into(),
    })
}

/// `DELETE /api/v1/history/{id}`
#[utoipa::path(
    delete,
    path = "/api/v1/history/{id}",
    tag = "history",
    operation_id = "history.delete",
    params(
        ("id" = String, Path, description = "History entry ID"),
        ("X-Client-ID" = String, Header, description = "Client owning the entry"),
    ),
    responses(
        (status = 200, description = "Whether the entry existed", body = HistoryDeleteResponse),
        (status = 400, description = "Missing X-Client-ID header", body = ApiError),
    )
)]
pub async fn delete_history_entry(
    State(state): State<AppState>,
    ClientId(client_id): ClientId,
    Path(id): Path<String>,
) -> ApiResponse<HistoryDeleteResponse> {
    let deleted = state.history.delete(&client_id, &id);
    ApiResponse::success(HistoryDeleteResponse { deleted })
}

/// `DELETE /api/v1/history`
#[utoipa::path(
    delete,
    path = "/api/v1/history",
    tag = "history",
    operation_id = "history.clear",
    params(("X-Client-ID" = String, Header, description = "Client whose history to clear")),
    responses(
        (status = 200, description = "History cleared", body = HistoryClearResponse),
        (status = 400, description = "Missing X-Client-ID header", body = ApiError),
    )
)]
pub async fn clear_history(
    State(state): State<AppState>,
    ClientId(client_id): ClientId,
) -> ApiResponse<HistoryClearResponse> {
    state.history.clear(&client_id);
    ApiResponse::success(HistoryClearResponse { cleared: true })
}
