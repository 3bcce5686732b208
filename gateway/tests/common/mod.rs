// Shared helpers for the gateway integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;

use ocr_gateway::error::{GatewayError, Result};
use ocr_gateway::ocr::{RecognizedText, Recognizer};

static INIT: Once = Once::new();

/// Initialize tracing subscriber once for tests
pub fn init_test_logger() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Stub backend driven by the image content:
///
/// - `sleep:<ms>:<text>` waits `ms` milliseconds, then returns `text`
/// - `fail:<message>` returns an OCR error
/// - anything else is echoed back as plain text
///
/// It records how many calls ran and the peak number running at once.
#[derive(Default)]
pub struct ScriptedRecognizer {
    pub calls: AtomicUsize,
    pub finished: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedRecognizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Recognizer for ScriptedRecognizer {
    async fn recognize(&self, image: &[u8]) -> Result<RecognizedText> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let script = String::from_utf8_lossy(image).into_owned();
        let result = if let Some(rest) = script.strip_prefix("sleep:") {
            let (ms, text) = rest.split_once(':').unwrap_or((rest, ""));
            tokio::time::sleep(Duration::from_millis(ms.parse().unwrap_or(0))).await;
            Ok(RecognizedText::Plain(text.to_string()))
        } else if let Some(message) = script.strip_prefix("fail:") {
            Err(GatewayError::Ocr(message.to_string()))
        } else {
            Ok(RecognizedText::Plain(script))
        };

        self.finished.fetch_add(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn formats() -> Vec<String> {
    ["jpg", "jpeg", "png", "webp", "bmp", "tiff"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub const TEN_MB: u64 = 10 * 1024 * 1024;
