//! Response envelope shared by every v1 endpoint.
//!
//! ```json
//! { "data": { ... } }
//! { "error": { "code": "too_many_requests", "message": "..." } }
//! ```
//!
//! Exactly one of `data` and `error` is present. Per-image recognition
//! failures are not envelope errors: they travel inside a successful batch
//! result, one `error` string per failed image.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

const INTERNAL_MESSAGE: &str = "An internal error occurred";

/// Error classification sent as `error.code`, snake_case on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// 400: no images, too many images, bad form or JSON, missing `X-Client-ID`.
    InvalidRequest,
    /// 401
    Unauthorized,
    /// 404
    NotFound,
    /// 429: every inbound request slot is taken.
    TooManyRequests,
    /// 500. The message is always generic.
    InternalError,
    /// 503: the OCR backend is not configured or failed to start.
    ServiceUnavailable,
}

impl ErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            Self::InvalidRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not_found",
            Self::TooManyRequests => "too_many_requests",
            Self::InternalError => "internal_error",
            Self::ServiceUnavailable => "service_unavailable",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ApiError {
    pub code: ErrorCode,
    /// Safe to show to end users.
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,

    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self::with_status(data, StatusCode::OK)
    }

    /// `data` sent with a status other than 200, as `/ready` does with 503.
    pub fn with_status(data: T, status: StatusCode) -> Self {
        Self {
            data: Some(data),
            error: None,
            status,
        }
    }

    /// The HTTP status follows from `code`.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
            status: code.status(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match serde_json::to_value(&self) {
            Ok(body) => (self.status, Json(body)).into_response(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize v1 response");
                let fallback = serde_json::json!({
                    "error": {
                        "code": ErrorCode::InternalError.as_str(),
                        "message": INTERNAL_MESSAGE,
                    }
                });
                (StatusCode::INTERNAL_SERVER_ERROR, Json(fallback)).into_response()
            }
        }
    }
}

/// Client-facing errors keep their message; faults inside the gateway or a
/// backend are logged and replaced by a generic `internal_error`.
impl<T: Serialize> From<GatewayError> for ApiResponse<T> {
    fn from(err: GatewayError) -> Self {
        let code = match &err {
            GatewayError::NotFound(_) => ErrorCode::NotFound,
            GatewayError::Validation(_) | GatewayError::Json(_) => ErrorCode::InvalidRequest,
            GatewayError::ApiAuth(_) => ErrorCode::Unauthorized,
            GatewayError::TooManyRequests(_) => ErrorCode::TooManyRequests,
            GatewayError::OcrUnavailable(_) => ErrorCode::ServiceUnavailable,
            GatewayError::Http(_)
            | GatewayError::Io(_)
            | GatewayError::Internal(_)
            | GatewayError::Ocr(_)
            | GatewayError::RateLimiterTimeout(_) => {
                tracing::error!(error = %err, "Request failed with an internal error");
                return Self::error(ErrorCode::InternalError, INTERNAL_MESSAGE);
            }
        };

        let message = match err {
            GatewayError::NotFound(msg)
            | GatewayError::Validation(msg)
            | GatewayError::TooManyRequests(msg)
            | GatewayError::OcrUnavailable(msg) => msg,
            GatewayError::Json(e) => format!("Invalid JSON: {e}"),
            _ => "Authentication required".to_string(),
        };
        Self::error(code, message)
    }
}
