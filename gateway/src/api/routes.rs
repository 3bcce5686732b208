use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::v1;
use super::AppState;

/// Multipart framing and form fields on top of the images themselves.
const BODY_LIMIT_SLACK_BYTES: usize = 1024 * 1024;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let v1 = v1::router::v1_router(state.clone());

    Router::new()
        .nest("/api/v1", v1)
        .layer(DefaultBodyLimit::max(body_limit(&state)))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn body_limit(state: &AppState) -> usize {
    let ocr = &state.config.ocr;
    let images = ocr.max_images_per_request;
    let per_image = usize::try_from(ocr.max_image_size_bytes()).unwrap_or(usize::MAX);
    images
        .saturating_mul(per_image)
        .saturating_add(BODY_LIMIT_SLACK_BYTES)
}
