use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::config::{parse_provider_model, Config};
use crate::error::Result;
use crate::history::HistoryStore;
use crate::ocr::{OcrProvider, Recognizer};
use crate::services::{BatchProcessor, WorkerPool};

/// One recognition backend reachable under `/api/v1/ocr/{name}`.
#[derive(Clone)]
pub struct Backend {
    /// Provider prefix of `model`, lowercased.
    pub name: String,
    pub model: String,
    pub batch: BatchProcessor,
    available: bool,
}

impl Backend {
    pub fn is_available(&self) -> bool {
        self.available
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    default_backend: Backend,
    /// Backends other than the default, keyed by name.
    extra_backends: Arc<HashMap<String, Backend>>,
    pub history: Arc<HistoryStore>,
    /// Inbound request gate; a request that finds no free slot gets 429.
    pub request_slots: Arc<Semaphore>,
}

impl AppState {
    pub fn new(config: Config, ocr: OcrProvider) -> Result<Self> {
        let available = ocr.is_available();
        Self::with_recognizer(config, Arc::new(ocr), available)
    }

    /// Build state around any recognizer, registered as the backend for
    /// `config.ocr.model`. `ocr_available` is what the health and
    /// readiness endpoints report.
    pub fn with_recognizer(
        config: Config,
        recognizer: Arc<dyn Recognizer>,
        ocr_available: bool,
    ) -> Result<Self> {
        let pool = WorkerPool::new(config.workers.max_workers)?;
        let history = Arc::new(HistoryStore::new(Duration::from_secs(
            config.history.ttl_secs,
        )));
        let request_slots = Arc::new(Semaphore::new(config.server.max_concurrent_requests));

        let default_backend =
            build_backend(&config, &config.ocr.model, recognizer, pool, ocr_available);

        Ok(Self {
            config: Arc::new(config),
            default_backend,
            extra_backends: Arc::new(HashMap::new()),
            history,
            request_slots,
        })
    }

    /// Register another backend. It shares the default backend's worker
    /// pool, so `max_workers` bounds recognition across all of them.
    pub fn with_backend(
        mut self,
        model: &str,
        recognizer: Arc<dyn Recognizer>,
        available: bool,
    ) -> Self {
        let pool = self.default_backend().batch.pool().clone();
        let backend = build_backend(&self.config, model, recognizer, pool, available);
        if backend.name == self.default_backend.name {
            self.default_backend = backend;
        } else {
            Arc::make_mut(&mut self.extra_backends).insert(backend.name.clone(), backend);
        }
        self
    }

    pub fn default_backend(&self) -> &Backend {
        &self.default_backend
    }

    /// Look a backend up by provider name, case-insensitively.
    pub fn backend(&self, name: &str) -> Option<&Backend> {
        let name = name.to_lowercase();
        if name == self.default_backend.name {
            return Some(&self.default_backend);
        }
        self.extra_backends.get(&name)
    }

    /// Every backend, default first and the rest by name.
    pub fn backends(&self) -> Vec<&Backend> {
        let mut others: Vec<&Backend> = self.extra_backends.values().collect();
        others.sort_by(|a, b| a.name.cmp(&b.name));
        std::iter::once(&self.default_backend).chain(others).collect()
    }

    pub fn ocr_available(&self) -> bool {
        self.default_backend().is_available()
    }

    pub fn ocr_provider(&self) -> &str {
        self.default_backend().batch.recognizer().name()
    }
}

fn build_backend(
    config: &Config,
    model: &str,
    recognizer: Arc<dyn Recognizer>,
    pool: WorkerPool,
    available: bool,
) -> Backend {
    let batch = BatchProcessor::new(recognizer, pool, config.workers.pool_scope)
        .with_deadline(Duration::from_secs(config.workers.batch_timeout_secs));
    Backend {
        name: parse_provider_model(model).0.to_lowercase(),
        model: model.to_string(),
        batch,
        available,
    }
}
