//! # V1 Middleware
//!
//! Two layers guard every protected v1 route:
//!
//! - [`v1_auth_middleware`] checks the `Authorization: Bearer <token>` header
//!   against `OCR_API_KEYS`. With no keys configured authentication is off.
//! - [`concurrency_limit_middleware`] caps the requests in flight at
//!   `OCR_MAX_CONCURRENT_REQUESTS`. It never queues: a request that finds no
//!   free slot is answered with 429 immediately.
//!
//! Both reply with the v1 `ApiResponse` JSON envelope.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::api::state::AppState;

use super::response::{ApiResponse, ErrorCode};

/// Bearer-token check for protected routes. Passes everything through when
/// no keys are configured; otherwise a missing, malformed or unknown token
/// gets a 401 envelope.
pub async fn v1_auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let api_keys = &state.config.server.api_keys;
    if api_keys.is_empty() {
        return next.run(request).await;
    }

    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok());

    let token = match auth_header {
        Some(h) => match h.strip_prefix("Bearer ") {
            Some(token) => token,
            None => {
                return ApiResponse::<()>::error(
                    ErrorCode::Unauthorized,
                    "Invalid authorization header format. Expected: Bearer <token>",
                )
                .into_response();
            }
        },
        None => {
            return ApiResponse::<()>::error(
                ErrorCode::Unauthorized,
                "Missing authorization header",
            )
            .into_response();
        }
    };

    if api_keys.iter().any(|key| key == token) {
        next.run(request).await
    } else {
        ApiResponse::<()>::error(ErrorCode::Unauthorized, "Invalid API key").into_response()
    }
}

/// Axum middleware that rejects requests beyond the concurrent-request limit.
///
/// The slot is held until the inner handler has produced its response.
pub async fn concurrency_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Ok(_slot) = Arc::clone(&state.request_slots).try_acquire_owned() else {
        tracing::warn!(
            limit = state.config.server.max_concurrent_requests,
            "Rejecting request: too many concurrent requests"
        );
        return ApiResponse::<()>::error(
            ErrorCode::TooManyRequests,
            "Too many concurrent requests, please try again later",
        )
        .into_response();
    };

    next.run(request).await
}
