//! OCR gateway: fans batches of images out to a pluggable recognition
//! backend under a bounded worker pool, with provider-side rate limiting and
//! an in-memory per-client history.

pub mod api;
pub mod config;
pub mod error;
pub mod history;
pub mod models;
pub mod ocr;
pub mod services;
