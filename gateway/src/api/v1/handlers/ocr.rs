//! v1 OCR handlers: multipart upload in, batch result out.

use axum::extract::{Multipart, Path, State};
use axum::http::HeaderMap;
use tracing::{debug, error, warn};

use crate::api::state::{AppState, Backend};
use crate::api::v1::dto::OcrBatchResponse;
use crate::api::v1::response::{ApiError, ApiResponse, ErrorCode};
use crate::models::ImageTask;

/// Multipart field carrying the images; may be repeated.
pub const IMAGES_FIELD: &str = "images";

/// Extra key the gemini backend demands when `OCR_GEMINI_AUTH_KEY` is set.
pub const GEMINI_KEY_HEADER: &str = "X-Gemini-API-Key";

/// `POST /api/v1/ocr`
#[utoipa::path(
    post,
    path = "/api/v1/ocr",
    tag = "ocr",
    operation_id = "ocr.process",
    request_body(content_type = "multipart/form-data", content = String, description = "One or more `images` file fields"),
    responses(
        (status = 200, description = "Batch processed by the default backend; per-image failures are reported in `results`", body = OcrBatchResponse),
        (status = 400, description = "No images, too many images or malformed form", body = ApiError),
        (status = 401, description = "Missing or invalid API key", body = ApiError),
        (status = 429, description = "Too many concurrent requests", body = ApiError),
    )
)]
pub async fn process_ocr(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> ApiResponse<OcrBatchResponse> {
    let backend = state.default_backend().clone();
    run_batch(&state, &backend, &headers, multipart).await
}

/// `POST /api/v1/ocr/{provider}`
#[utoipa::path(
    post,
    path = "/api/v1/ocr/{provider}",
    tag = "ocr",
    operation_id = "ocr.process_with_backend",
    params(
        ("provider" = String, Path, description = "Backend provider name, e.g. `yandex` or `gemini`"),
        ("X-Gemini-API-Key" = Option<String>, Header, description = "Required by the gemini backend when OCR_GEMINI_AUTH_KEY is set"),
    ),
    request_body(content_type = "multipart/form-data", content = String, description = "One or more `images` file fields"),
    responses(
        (status = 200, description = "Batch processed by the named backend", body = OcrBatchResponse),
        (status = 400, description = "No images, too many images or malformed form", body = ApiError),
        (status = 401, description = "Missing or invalid API key or gemini key", body = ApiError),
        (status = 404, description = "No backend configured under that name", body = ApiError),
        (status = 429, description = "Too many concurrent requests", body = ApiError),
    )
)]
pub async fn process_ocr_with_backend(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    multipart: Multipart,
) -> ApiResponse<OcrBatchResponse> {
    let Some(backend) = state.backend(&provider).cloned() else {
        return ApiResponse::error(
            ErrorCode::NotFound,
            format!("unknown OCR backend: {provider}"),
        );
    };
    run_batch(&state, &backend, &headers, multipart).await
}

async fn run_batch(
    state: &AppState,
    backend: &Backend,
    headers: &HeaderMap,
    mut multipart: Multipart,
) -> ApiResponse<OcrBatchResponse> {
    if backend.name == "gemini" {
        if let Some(expected) = &state.config.ocr.gemini_auth_key {
            let given = headers
                .get(GEMINI_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if given != expected {
                warn!(backend = %backend.name, "Rejected request with missing or wrong gemini key");
                return ApiResponse::error(
                    ErrorCode::Unauthorized,
                    "Invalid or missing authentication key",
                );
            }
        }
    }

    let ocr = &state.config.ocr;
    let mut images: Vec<ImageTask> = Vec::new();
    let mut received = 0usize;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return ApiResponse::error(
                    ErrorCode::InvalidRequest,
                    format!("failed to parse multipart form: {}", e.body_text()),
                );
            }
        };

        if field.name() != Some(IMAGES_FIELD) {
            continue;
        }

        received += 1;
        // Keep counting past the limit so the error can report the total,
        // but stop buffering.
        if received > ocr.max_images_per_request {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        match field.bytes().await {
            Ok(bytes) => images.push(ImageTask::new(filename, bytes.to_vec())),
            Err(e) => {
                // The stream is unusable past a broken part.
                debug!(filename = %filename, "Failed to read uploaded image: {}", e);
                images.push(ImageTask::unreadable(filename, e.body_text()));
                break;
            }
        }
    }

    if received == 0 {
        return ApiResponse::error(ErrorCode::InvalidRequest, "no images provided");
    }

    if received > ocr.max_images_per_request {
        return ApiResponse::error(
            ErrorCode::InvalidRequest,
            format!(
                "maximum {} images allowed, got {}",
                ocr.max_images_per_request, received
            ),
        );
    }

    debug!(backend = %backend.name, images = images.len(), "Dispatching OCR batch");
    match backend
        .batch
        .process_images(images, ocr.max_image_size_bytes(), &ocr.supported_formats)
        .await
    {
        Ok(batch) => ApiResponse::success(OcrBatchResponse::from(batch)),
        Err(e) => {
            error!(error = %e, backend = %backend.name, "Failed to process images");
            ApiResponse::error(ErrorCode::InternalError, "failed to process images")
        }
    }
}
