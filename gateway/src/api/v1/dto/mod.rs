//! v1 API Data Transfer Objects.
//!
//! Wire types for the v1 REST API, kept apart from the domain types in
//! `src/models/` and `src/history/`.

pub mod history;
pub mod ocr;

pub use history::*;
pub use ocr::*;
