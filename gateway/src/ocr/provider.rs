use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use leptess::LepTess;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::{parse_provider_model, OcrConfig};
use crate::error::{GatewayError, Result};

use super::api::{GoogleVisionClient, VisionChatClient, YandexOcrClient};
use super::recognizer::{RecognizedText, Recognizer};

#[derive(Clone)]
enum OcrApiClient {
    Yandex(YandexOcrClient),
    Google(GoogleVisionClient),
    Vision(VisionChatClient),
}

impl OcrApiClient {
    async fn ocr(&self, image_bytes: &[u8]) -> Result<RecognizedText> {
        match self {
            OcrApiClient::Yandex(c) => c.ocr(image_bytes).await,
            OcrApiClient::Google(c) => c.ocr(image_bytes).await,
            OcrApiClient::Vision(c) => c.ocr(image_bytes).await,
        }
    }
}

#[derive(Clone)]
enum OcrBackend {
    Local { tesseract: Arc<Mutex<LepTess>> },
    Api { client: OcrApiClient },
    Unavailable { reason: String },
}

/// Recognizer selected from `OcrConfig.model`.
///
/// Backends that fail to initialize degrade to an unavailable backend so the
/// gateway still starts; every recognition then fails with
/// [`GatewayError::OcrUnavailable`].
#[derive(Clone)]
pub struct OcrProvider {
    backend: OcrBackend,
    provider: String,
    config: OcrConfig,
}

fn create_tesseract(languages: &str) -> std::result::Result<LepTess, String> {
    LepTess::new(None, languages).map_err(|e| e.to_string())
}

fn api_backend(label: &str, client: Result<OcrApiClient>) -> OcrBackend {
    match client {
        Ok(client) => {
            info!("{} OCR API backend initialized", label);
            OcrBackend::Api { client }
        }
        Err(e) => {
            let reason = format!("{label} OCR backend unavailable: {e}");
            warn!("{}", reason);
            OcrBackend::Unavailable { reason }
        }
    }
}

impl OcrProvider {
    /// Must be called from within a Tokio runtime: rate-limited backends
    /// start their refill task here.
    pub fn new(config: &OcrConfig) -> Result<Self> {
        let (provider, model) = parse_provider_model(&config.model);
        let provider = provider.to_lowercase();

        let backend = match provider.as_str() {
            "yandex" => api_backend(
                "Yandex",
                YandexOcrClient::new(config, model).map(OcrApiClient::Yandex),
            ),
            "google" => api_backend(
                "Google Vision",
                GoogleVisionClient::new(config).map(OcrApiClient::Google),
            ),
            "openai" => api_backend(
                "OpenAI Vision",
                VisionChatClient::openai(config, model).map(OcrApiClient::Vision),
            ),
            "gemini" => api_backend(
                "Gemini",
                VisionChatClient::gemini(config, model).map(OcrApiClient::Vision),
            ),
            _ => match create_tesseract(&config.languages) {
                Ok(lt) => {
                    info!(languages = %config.languages, "Tesseract OCR initialized");
                    OcrBackend::Local {
                        tesseract: Arc::new(Mutex::new(lt)),
                    }
                }
                Err(e) => {
                    let reason = format!("Tesseract not available: {e}");
                    warn!("{}", reason);
                    OcrBackend::Unavailable { reason }
                }
            },
        };

        Ok(Self {
            backend,
            provider,
            config: config.clone(),
        })
    }

    pub fn is_available(&self) -> bool {
        !matches!(self.backend, OcrBackend::Unavailable { .. })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Stop background work owned by the backend (the Yandex rate limiter).
    pub async fn shutdown(&self) {
        if let OcrBackend::Api {
            client: OcrApiClient::Yandex(client),
        } = &self.backend
        {
            client.rate_limiter().stop().await;
        }
    }

    pub async fn ocr(&self, image_bytes: &[u8]) -> Result<RecognizedText> {
        if image_bytes.is_empty() {
            let err = GatewayError::Ocr("empty data".to_string());
            error!("{}", err);
            return Err(err);
        }

        let timeout_duration = Duration::from_secs(self.config.timeout_secs);
        let result = tokio::time::timeout(timeout_duration, self.ocr_internal(image_bytes)).await;

        let result = match result {
            Ok(inner_result) => inner_result,
            Err(_) => Err(GatewayError::Ocr(format!(
                "OCR operation timed out after {} seconds",
                self.config.timeout_secs
            ))),
        };

        match &result {
            Ok(text) if text.is_empty() => {
                warn!(provider = %self.provider, "OCR backend returned an empty result");
            }
            Err(e) => error!(provider = %self.provider, "OCR failed: {}", e),
            _ => {}
        }

        result
    }

    async fn ocr_internal(&self, image_bytes: &[u8]) -> Result<RecognizedText> {
        match &self.backend {
            OcrBackend::Local { tesseract } => {
                let bytes = image_bytes.to_vec();
                let tesseract = Arc::clone(tesseract);

                let text = tokio::task::spawn_blocking(move || {
                    let mut lt = tesseract.blocking_lock();
                    lt.set_image_from_mem(&bytes)
                        .map_err(|e| GatewayError::Ocr(format!("failed to load image: {e}")))?;
                    lt.get_utf8_text()
                        .map_err(|e| GatewayError::Ocr(format!("failed to recognize text: {e}")))
                })
                .await
                .map_err(|e| GatewayError::Ocr(format!("OCR task panicked: {e}")))??;

                Ok(RecognizedText::Plain(text.trim().to_string()))
            }
            OcrBackend::Api { client } => client.ocr(image_bytes).await,
            OcrBackend::Unavailable { reason } => {
                Err(GatewayError::OcrUnavailable(reason.clone()))
            }
        }
    }
}

#[async_trait]
impl Recognizer for OcrProvider {
    async fn recognize(&self, image: &[u8]) -> Result<RecognizedText> {
        self.ocr(image).await
    }

    fn name(&self) -> &str {
        &self.provider
    }
}
