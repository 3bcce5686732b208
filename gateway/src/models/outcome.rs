use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::value::RawValue;

/// Result of recognizing one image.
///
/// `text` is always a valid JSON value: the backend's JSON document, or its
/// plain text as a JSON string. Failed images carry an empty string there and
/// the reason in `error`.
#[derive(Debug, Clone, Serialize)]
pub struct OcrOutcome {
    pub filename: String,
    pub text: Box<RawValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OcrOutcome {
    pub fn success(filename: impl Into<String>, text: Box<RawValue>) -> Self {
        Self {
            filename: filename.into(),
            text,
            error: None,
        }
    }

    pub fn failure(filename: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            filename: filename.into(),
            text: empty_text(),
            // An empty message still marks the image as failed.
            error: Some(if error.is_empty() {
                "unknown error".to_string()
            } else {
                error
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

fn empty_text() -> Box<RawValue> {
    RawValue::from_string("\"\"".to_string()).expect("empty string literal is valid JSON")
}

/// Outcomes of one batch, in submission order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub results: Vec<OcrOutcome>,
    pub total_images: usize,
    pub successful: usize,
    pub failed: usize,
    pub processed_at: DateTime<Utc>,
}

impl BatchResult {
    /// Count successes and stamp the completion time.
    pub fn from_outcomes(results: Vec<OcrOutcome>) -> Self {
        let total_images = results.len();
        let successful = results.iter().filter(|r| r.is_success()).count();
        Self {
            results,
            total_images,
            successful,
            failed: total_images - successful,
            processed_at: Utc::now(),
        }
    }
}
