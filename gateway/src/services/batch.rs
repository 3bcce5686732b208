use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::PoolScope;
use crate::error::Result;
use crate::models::{BatchResult, ImageContent, ImageTask, OcrOutcome};
use crate::ocr::Recognizer;

use super::worker_pool::WorkerPool;

/// Fans a batch of images out to a [`Recognizer`] and gathers the outcomes.
///
/// Every image runs as its own task under a worker permit. A failing image
/// only fails its own outcome; siblings keep running and the batch still
/// returns one outcome per input, in input order.
#[derive(Clone)]
pub struct BatchProcessor {
    recognizer: Arc<dyn Recognizer>,
    pool: WorkerPool,
    scope: PoolScope,
    deadline: Option<Duration>,
}

impl BatchProcessor {
    pub fn new(recognizer: Arc<dyn Recognizer>, pool: WorkerPool, scope: PoolScope) -> Self {
        Self {
            recognizer,
            pool,
            scope,
            deadline: None,
        }
    }

    /// Fail images still running once `deadline` has elapsed since the batch
    /// started. A zero deadline disables it.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = (!deadline.is_zero()).then_some(deadline);
        self
    }

    pub fn recognizer(&self) -> &Arc<dyn Recognizer> {
        &self.recognizer
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn scope(&self) -> PoolScope {
        self.scope
    }

    /// Recognize every image and return the outcomes aligned with `images`.
    ///
    /// Per-image problems (size, format, unreadable upload, backend error)
    /// become that image's error. Only an internal fault fails the call.
    /// Dropping the returned future cancels the images still in flight.
    pub async fn process_images(
        &self,
        images: Vec<ImageTask>,
        max_size_bytes: u64,
        supported_formats: &[String],
    ) -> Result<BatchResult> {
        let started = Instant::now();
        let total = images.len();

        let pool = match self.scope {
            PoolScope::Shared => self.pool.clone(),
            PoolScope::PerRequest => WorkerPool::new(self.pool.capacity())?,
        };
        let formats = Arc::new(normalize_formats(supported_formats));
        let deadline_at = self.deadline.map(|d| started + d);

        let cancel = CancellationToken::new();
        let _cancel_on_drop = cancel.clone().drop_guard();

        let filenames: Vec<String> = images.iter().map(|i| i.filename.clone()).collect();

        let handles = images.into_iter().map(|image| {
            let recognizer = Arc::clone(&self.recognizer);
            let pool = pool.clone();
            let formats = Arc::clone(&formats);
            let cancel = cancel.clone();

            tokio::spawn(async move {
                let filename = image.filename.clone();
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => OcrOutcome::failure(filename, "batch cancelled"),
                    _ = wait_until(deadline_at) => {
                        OcrOutcome::failure(filename, "batch deadline exceeded")
                    }
                    outcome = process_one(
                        recognizer.as_ref(),
                        &pool,
                        image,
                        max_size_bytes,
                        &formats,
                    ) => outcome,
                }
            })
        });

        // join_all yields in submission order, so slot i holds image i.
        let joined = join_all(handles).await;

        let results: Vec<OcrOutcome> = joined
            .into_iter()
            .zip(filenames)
            .map(|(joined, filename)| match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(filename = %filename, "OCR task failed: {}", e);
                    OcrOutcome::failure(filename, format!("processing task failed: {e}"))
                }
            })
            .collect();

        for outcome in results.iter().filter(|o| !o.is_success()) {
            debug!(
                filename = %outcome.filename,
                error = outcome.error.as_deref().unwrap_or_default(),
                "Image failed"
            );
        }

        let batch = BatchResult::from_outcomes(results);
        info!(
            total,
            successful = batch.successful,
            failed = batch.failed,
            backend = self.recognizer.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch processed"
        );

        Ok(batch)
    }
}

async fn process_one(
    recognizer: &dyn Recognizer,
    pool: &WorkerPool,
    image: ImageTask,
    max_size_bytes: u64,
    formats: &HashSet<String>,
) -> OcrOutcome {
    let _permit = match pool.acquire().await {
        Ok(permit) => permit,
        Err(e) => return OcrOutcome::failure(image.filename, e.to_string()),
    };

    if image.size_bytes > max_size_bytes {
        let message = format!(
            "file size {} bytes exceeds maximum allowed size of {} bytes",
            image.size_bytes, max_size_bytes
        );
        return OcrOutcome::failure(image.filename, message);
    }

    let extension = image.extension();
    if !formats.contains(&extension) {
        return OcrOutcome::failure(image.filename, format!("unsupported format: {extension}"));
    }

    let content = match image.content {
        ImageContent::Loaded(content) => content,
        ImageContent::Unreadable(reason) => {
            return OcrOutcome::failure(image.filename, format!("failed to read file: {reason}"));
        }
    };

    let recognized = match recognizer.recognize(&content).await {
        Ok(recognized) => recognized,
        Err(e) => return OcrOutcome::failure(image.filename, e.to_string()),
    };

    match recognized.into_payload() {
        Ok(payload) => OcrOutcome::success(image.filename, payload),
        Err(e) => OcrOutcome::failure(image.filename, e.to_string()),
    }
}

/// Extensions compared without a leading dot, case-insensitively.
fn normalize_formats(formats: &[String]) -> HashSet<String> {
    formats
        .iter()
        .map(|f| f.trim().trim_start_matches('.').to_lowercase())
        .filter(|f| !f.is_empty())
        .collect()
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
