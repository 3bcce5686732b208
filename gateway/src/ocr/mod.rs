//! OCR (Optical Character Recognition) Module
//!
//! Single-image recognition backends behind the [`Recognizer`] trait.
//!
//! # Architecture
//!
//! - `Recognizer` trait defines the interface the batch processor calls
//! - `OcrProvider` picks a backend from `OcrConfig.model`:
//!   - `local/tesseract`: local engine via leptess
//!   - `yandex/<model>`: Yandex Vision OCR, throttled by a [`RateLimiter`]
//!   - `google/vision`: Google Cloud Vision `images:annotate`
//!   - `openai/<model>`, `gemini/<model>`: OpenAI-compatible vision chat
//! - `RecognizedText` carries either plain text or a JSON document, chosen
//!   by the backend
//!
//! # Usage
//!
//! ```rust,ignore
//! let ocr = OcrProvider::new(&config.ocr)?;
//! let text = ocr.recognize(image_bytes).await?;
//! ```

mod api;
mod provider;
pub mod rate_limiter;
mod recognizer;

pub use api::{GoogleVisionClient, VisionChatClient, VisionOutput, YandexOcrClient};
pub use provider::OcrProvider;
pub use rate_limiter::RateLimiter;
pub use recognizer::{RecognizedText, Recognizer};
