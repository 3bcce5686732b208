use axum::Json;
use utoipa::OpenApi;
use utoipa_redoc::{Redoc, Servable};

use super::dto;
use super::handlers;
use super::response;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "OCR Gateway API",
        version = "1.0.0",
        description = "Batch OCR over pluggable recognition backends, with per-client result history.",
    ),
    paths(
        handlers::health::health_check,
        handlers::health::readiness_check,
        handlers::ocr::process_ocr,
        handlers::ocr::process_ocr_with_backend,
        handlers::history::list_history,
        handlers::history::add_history,
        handlers::history::delete_history_entry,
        handlers::history::clear_history,
    ),
    components(schemas(
        // Response envelope
        response::ErrorCode,
        response::ApiError,
        // OCR
        dto::ocr::OcrImageResult,
        dto::ocr::OcrBatchResponse,
        // History
        dto::history::AddHistoryRequest,
        dto::history::HistoryEntryResponse,
        dto::history::HistoryListResponse,
        dto::history::HistoryAddResponse,
        dto::history::HistoryDeleteResponse,
        dto::history::HistoryClearResponse,
        // Health (handler-local types)
        handlers::health::HealthData,
        handlers::health::OcrStatus,
        handlers::health::BackendStatus,
        handlers::health::ReadyData,
    )),
    tags(
        (name = "health", description = "Health and readiness checks"),
        (name = "ocr", description = "Batch text recognition"),
        (name = "history", description = "Per-client history of recognition results"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            utoipa::openapi::security::SecurityScheme::Http(utoipa::openapi::security::Http::new(
                utoipa::openapi::security::HttpAuthScheme::Bearer,
            )),
        );
    }
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn redoc_router<S: Clone + Send + Sync + 'static>() -> axum::Router<S> {
    Redoc::with_url("/docs", ApiDoc::openapi()).into()
}
