use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use crate::api::state::AppState;
use crate::api::v1::response::ApiResponse;

/// Health data returned inside the v1 envelope.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct HealthData {
    pub status: String,
    pub version: String,
    /// Default backend, the one `POST /api/v1/ocr` uses.
    pub ocr: OcrStatus,
    pub backends: Vec<BackendStatus>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct OcrStatus {
    pub status: String,
    pub provider: String,
    pub model: String,
    pub max_workers: usize,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct BackendStatus {
    pub name: String,
    pub model: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct ReadyData {
    pub ready: bool,
}

/// `GET /api/v1/health`
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "health",
    responses(
        (status = 200, description = "Service health status", body = HealthData),
    )
)]
pub async fn health_check(State(state): State<AppState>) -> ApiResponse<HealthData> {
    let default = state.default_backend();

    ApiResponse::success(HealthData {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        ocr: OcrStatus {
            status: availability(state.ocr_available()).to_string(),
            provider: state.ocr_provider().to_string(),
            model: default.model.clone(),
            max_workers: default.batch.pool().capacity(),
        },
        backends: state
            .backends()
            .into_iter()
            .map(|b| BackendStatus {
                name: b.name.clone(),
                model: b.model.clone(),
                status: availability(b.is_available()).to_string(),
            })
            .collect(),
    })
}

fn availability(available: bool) -> &'static str {
    if available {
        "available"
    } else {
        "unavailable"
    }
}

/// `GET /api/v1/ready`
#[utoipa::path(
    get,
    path = "/api/v1/ready",
    tag = "health",
    responses(
        (status = 200, description = "Default OCR backend can serve requests", body = ReadyData),
        (status = 503, description = "Default OCR backend unavailable", body = ReadyData),
    )
)]
pub async fn readiness_check(State(state): State<AppState>) -> ApiResponse<ReadyData> {
    let ready = state.ocr_available();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    ApiResponse::with_status(ReadyData { ready }, status)
}
