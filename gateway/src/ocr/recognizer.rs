use async_trait::async_trait;
use serde_json::value::RawValue;

use crate::error::{GatewayError, Result};

/// Text produced by a backend for one image.
///
/// Each backend decides which variant it returns: engines that emit plain
/// text use [`RecognizedText::Plain`], providers whose response is already a
/// JSON document use [`RecognizedText::Json`].
#[derive(Debug, Clone)]
pub enum RecognizedText {
    Plain(String),
    Json(Box<RawValue>),
}

impl RecognizedText {
    /// Wrap a backend response that must be a JSON document.
    pub fn json(document: String) -> Result<Self> {
        RawValue::from_string(document)
            .map(Self::Json)
            .map_err(|e| GatewayError::Ocr(format!("malformed backend response: {e}")))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Plain(text) => text.is_empty(),
            Self::Json(raw) => raw.get().trim().is_empty(),
        }
    }

    /// Convert into the JSON payload stored in an outcome.
    ///
    /// Plain text becomes a JSON string literal; JSON is kept verbatim.
    pub fn into_payload(self) -> Result<Box<RawValue>> {
        match self {
            Self::Json(raw) => Ok(raw),
            Self::Plain(text) => Ok(serde_json::value::to_raw_value(&text)?),
        }
    }
}

/// A single-image OCR backend.
///
/// Implementations are shared across the tasks of a batch and must be safe
/// to call concurrently. Quota-limited backends acquire their own rate
/// limiter inside `recognize`.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(&self, image: &[u8]) -> Result<RecognizedText>;

    /// Short backend name for logs and health output.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_quoted() {
        let payload = RecognizedText::Plain("hello".to_string())
            .into_payload()
            .unwrap();
        assert_eq!(payload.get(), "\"hello\"");
    }

    #[test]
    fn test_plain_text_escapes_quotes_and_newlines() {
        let payload = RecognizedText::Plain("say \"hi\"\nbye".to_string())
            .into_payload()
            .unwrap();
        assert_eq!(payload.get(), r#""say \"hi\"\nbye""#);
    }

    #[test]
    fn test_json_is_kept_verbatim() {
        let payload = RecognizedText::json(r#"{"a":1}"#.to_string())
            .unwrap()
            .into_payload()
            .unwrap();
        assert_eq!(payload.get(), r#"{"a":1}"#);
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        let err = RecognizedText::json("not json".to_string()).unwrap_err();
        assert!(err.to_string().contains("malformed backend response"));
    }

    #[test]
    fn test_empty_plain_text_is_a_valid_payload() {
        let text = RecognizedText::Plain(String::new());
        assert!(text.is_empty());
        assert_eq!(text.into_payload().unwrap().get(), "\"\"");
    }
}
