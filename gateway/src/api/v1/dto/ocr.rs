use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::value::RawValue;

use crate::models::{BatchResult, OcrOutcome};

/// Recognition result for one uploaded image.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct OcrImageResult {
    /// Name of the uploaded file.
    pub filename: String,
    /// Backend output: a JSON document, or plain text as a JSON string.
    /// Empty string when the image failed.
    #[schema(value_type = Object)]
    pub text: Box<RawValue>,
    /// Why this image failed. Absent on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<OcrOutcome> for OcrImageResult {
    fn from(outcome: OcrOutcome) -> Self {
        Self {
            filename: outcome.filename,
            text: outcome.text,
            error: outcome.error,
        }
    }
}

/// Response of `POST /api/v1/ocr`. `results` follows upload order.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct OcrBatchResponse {
    pub results: Vec<OcrImageResult>,
    pub total_images: usize,
    pub successful: usize,
    pub failed: usize,
    pub processed_at: DateTime<Utc>,
}

impl From<BatchResult> for OcrBatchResponse {
    fn from(batch: BatchResult) -> Self {
        Self {
            results: batch.results.into_iter().map(Into::into).collect(),
            total_images: batch.total_images,
            successful: batch.successful,
            failed: batch.failed,
            processed_at: batch.processed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_response_wire_format() {
        let batch = BatchResult::from_outcomes(vec![
            OcrOutcome::success("a.png", serde_json::value::to_raw_value("hi").unwrap()),
            OcrOutcome::failure("b.gif", "unsupported format: gif"),
        ]);
        let json = serde_json::to_value(OcrBatchResponse::from(batch)).unwrap();

        assert_eq!(json["total_images"], 2);
        assert_eq!(json["successful"], 1);
        assert_eq!(json["failed"], 1);
        assert_eq!(json["results"][0]["text"], "hi");
        assert!(json["results"][0].get("error").is_none());
        assert_eq!(json["results"][1]["error"], "unsupported format: gif");
        assert!(json["processed_at"].is_string());
    }
}
