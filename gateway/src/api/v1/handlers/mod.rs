pub(crate) mod health;
pub mod history;
pub mod ocr;

pub use health::{health_check, readiness_check};
