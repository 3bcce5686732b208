use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::OcrConfig;
use crate::error::{GatewayError, Result};

use super::rate_limiter::RateLimiter;
use super::recognizer::RecognizedText;

const YANDEX_DEFAULT_BASE_URL: &str = "https://ocr.api.cloud.yandex.net/ocr/v1";
const GOOGLE_DEFAULT_BASE_URL: &str = "https://vision.googleapis.com/v1";
const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const GEMINI_DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// How long a Yandex call may wait for a rate limiter token.
const YANDEX_TOKEN_WAIT: Duration = Duration::from_secs(120);

const CHAT_MAX_ATTEMPTS: u32 = 3;

const EXTRACT_PROMPT: &str = "Extract all text from this image. Return only the extracted text without any explanations or formatting.";

const TRANSCRIBE_JSON_PROMPT: &str = "You digitize archival documents. Extract every visible piece of text from the photo and answer with a single JSON object with the keys: \"summary\" (2-4 sentences describing only what was actually read), \"language\", \"document_title\" (empty string if none), \"text_markdown\" (the full text in Markdown, tables as Markdown tables, pages separated by ---), \"notes\" (doubtful readings, empty string if none) and \"warnings\" (array of short quality warnings). Never invent missing text; mark unreadable words as [illegible].";

fn build_http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| GatewayError::Ocr(format!("Failed to create HTTP client: {e}")))
}

/// Image MIME type sniffed from magic bytes, defaulting to JPEG.
fn sniff_mime(image_bytes: &[u8]) -> &'static str {
    infer::get(image_bytes)
        .map(|kind| kind.mime_type())
        .filter(|mime| mime.starts_with("image/"))
        .unwrap_or("image/jpeg")
}

// ---------------------------------------------------------------------------
// Yandex Vision OCR
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct YandexOcrClient {
    client: Client,
    api_key: String,
    folder_id: String,
    model: String,
    base_url: String,
    rate_limiter: Arc<RateLimiter>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct YandexRequest<'a> {
    mime_type: &'a str,
    language_codes: Vec<&'a str>,
    model: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YandexResponse {
    result: Option<YandexResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YandexResult {
    text_annotation: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct YandexError {
    message: Option<String>,
}

impl YandexOcrClient {
    pub fn new(config: &OcrConfig, model: &str) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| GatewayError::Ocr("API key required for Yandex OCR".to_string()))?;
        let folder_id = config
            .folder_id
            .clone()
            .ok_or_else(|| GatewayError::Ocr("Folder ID required for Yandex OCR".to_string()))?;

        let model = if model.is_empty() { "page" } else { model };

        Ok(Self {
            client: build_http_client(config.timeout_secs)?,
            api_key,
            folder_id,
            model: model.to_string(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| YANDEX_DEFAULT_BASE_URL.to_string()),
            rate_limiter: Arc::new(RateLimiter::new(config.requests_per_second)),
        })
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub async fn ocr(&self, image_bytes: &[u8]) -> Result<RecognizedText> {
        self.rate_limiter.acquire_timeout(YANDEX_TOKEN_WAIT).await?;

        // Yandex expects bare format names rather than MIME types.
        let mime_type = match sniff_mime(image_bytes) {
            "image/png" => "PNG",
            _ => "JPEG",
        };

        let request = YandexRequest {
            mime_type,
            language_codes: vec!["ru", "en"],
            model: &self.model,
            content: STANDARD.encode(image_bytes),
        };

        let resp = self
            .client
            .post(format!("{}/recognizeText", self.base_url))
            .bearer_auth(&self.api_key)
            .header("x-folder-id", &self.folder_id)
            .header("x-data-logging-enabled", "false")
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Ocr(format!("Failed to send request: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| GatewayError::Ocr(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<YandexError>(&body)
                .ok()
                .and_then(|e| e.message)
                .filter(|m| !m.is_empty());
            return Err(match message {
                Some(message) => GatewayError::Ocr(format!(
                    "Yandex API error (status {}): {message}",
                    status.as_u16()
                )),
                None => GatewayError::Ocr(format!(
                    "Yandex API returned status {}: {body}",
                    status.as_u16()
                )),
            });
        }

        let parsed: YandexResponse = serde_json::from_str(&body)
            .map_err(|e| GatewayError::Ocr(format!("Failed to parse response: {e}")))?;

        if parsed.result.and_then(|r| r.text_annotation).is_none() {
            warn!("Empty result from Yandex OCR API");
            return Ok(RecognizedText::Plain(String::new()));
        }

        RecognizedText::json(body)
    }
}

// ---------------------------------------------------------------------------
// Google Cloud Vision
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct GoogleVisionClient {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct VisionRequest {
    requests: Vec<VisionImageRequest>,
}

#[derive(Debug, Serialize)]
struct VisionImageRequest {
    image: VisionImage,
    features: Vec<VisionFeature>,
}

#[derive(Debug, Serialize)]
struct VisionImage {
    content: String,
}

#[derive(Debug, Serialize)]
struct VisionFeature {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct VisionResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    #[serde(default)]
    text_annotations: Vec<TextAnnotation>,
    full_text_annotation: Option<FullTextAnnotation>,
    error: Option<VisionError>,
}

#[derive(Debug, Deserialize)]
struct TextAnnotation {
    description: String,
}

#[derive(Debug, Default, Deserialize)]
struct FullTextAnnotation {
    #[serde(default)]
    pages: Vec<VisionPage>,
}

#[derive(Debug, Deserialize)]
struct VisionPage {
    #[serde(default)]
    blocks: Vec<VisionBlock>,
}

#[derive(Debug, Deserialize)]
struct VisionBlock {
    #[serde(default)]
    paragraphs: Vec<VisionParagraph>,
}

#[derive(Debug, Deserialize)]
struct VisionParagraph {
    #[serde(default)]
    words: Vec<VisionWord>,
}

#[derive(Debug, Deserialize)]
struct VisionWord {
    #[serde(default)]
    symbols: Vec<VisionSymbol>,
}

#[derive(Debug, Deserialize)]
struct VisionSymbol {
    text: String,
}

#[derive(Debug, Deserialize)]
struct VisionError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct VisionErrorEnvelope {
    error: VisionError,
}

impl GoogleVisionClient {
    pub fn new(config: &OcrConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| GatewayError::Ocr("API key required for Google Vision".to_string()))?;

        Ok(Self {
            client: build_http_client(config.timeout_secs)?,
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| GOOGLE_DEFAULT_BASE_URL.to_string()),
        })
    }

    pub async fn ocr(&self, image_bytes: &[u8]) -> Result<RecognizedText> {
        let request = VisionRequest {
            requests: vec![VisionImageRequest {
                image: VisionImage {
                    content: STANDARD.encode(image_bytes),
                },
                features: vec![VisionFeature {
                    kind: "TEXT_DETECTION",
                }],
            }],
        };

        let resp = self
            .client
            .post(format!("{}/images:annotate", self.base_url))
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Ocr(format!("Failed to send request: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| GatewayError::Ocr(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<VisionErrorEnvelope>(&body) {
                Ok(envelope) if !envelope.error.message.is_empty() => GatewayError::Ocr(format!(
                    "Google Vision API error (status {}): {}",
                    status.as_u16(),
                    envelope.error.message
                )),
                _ => GatewayError::Ocr(format!(
                    "Google Vision API returned status {}: {body}",
                    status.as_u16()
                )),
            });
        }

        let parsed: VisionResponse = serde_json::from_str(&body)
            .map_err(|e| GatewayError::Ocr(format!("Failed to parse response: {e}")))?;

        let Some(response) = parsed.responses.into_iter().next() else {
            warn!("Empty response from Google Vision API");
            return Ok(RecognizedText::Plain(String::new()));
        };

        if let Some(error) = response.error {
            return Err(GatewayError::Ocr(format!(
                "Google Vision API error: {}",
                error.message
            )));
        }

        Ok(RecognizedText::Plain(extract_vision_text(response)))
    }
}

/// The first text annotation holds the whole text; otherwise rebuild it
/// paragraph by paragraph from the symbols.
fn extract_vision_text(response: AnnotateImageResponse) -> String {
    if let Some(first) = response.text_annotations.into_iter().next() {
        return first.description;
    }

    let Some(full) = response.full_text_annotation else {
        return String::new();
    };

    full.pages
        .iter()
        .flat_map(|page| &page.blocks)
        .flat_map(|block| &block.paragraphs)
        .map(|paragraph| {
            paragraph
                .words
                .iter()
                .map(|word| word.symbols.iter().map(|s| s.text.as_str()).collect::<String>())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// OpenAI-compatible vision chat (OpenAI, Gemini)
// ---------------------------------------------------------------------------

/// Shape of the answer a vision chat model is asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisionOutput {
    PlainText,
    JsonDocument,
}

#[derive(Clone, Debug)]
pub struct VisionChatClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    output: VisionOutput,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

impl VisionChatClient {
    /// OpenAI vision models, answering with plain text.
    pub fn openai(config: &OcrConfig, model: &str) -> Result<Self> {
        Self::new(
            config,
            model,
            "gpt-4o",
            OPENAI_DEFAULT_BASE_URL,
            VisionOutput::PlainText,
            "OpenAI Vision",
        )
    }

    /// Gemini through its OpenAI-compatible endpoint, answering with a JSON transcription.
    pub fn gemini(config: &OcrConfig, model: &str) -> Result<Self> {
        Self::new(
            config,
            model,
            "gemini-2.5-pro",
            GEMINI_DEFAULT_BASE_URL,
            VisionOutput::JsonDocument,
            "Gemini",
        )
    }

    fn new(
        config: &OcrConfig,
        model: &str,
        default_model: &str,
        default_base_url: &str,
        output: VisionOutput,
        label: &str,
    ) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| GatewayError::Ocr(format!("API key required for {label}")))?;

        let model = if model.is_empty() { default_model } else { model };

        Ok(Self {
            client: build_http_client(config.timeout_secs)?,
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| default_base_url.to_string()),
            model: model.to_string(),
            output,
        })
    }

    pub async fn ocr(&self, image_bytes: &[u8]) -> Result<RecognizedText> {
        let data_url = format!(
            "data:{};base64,{}",
            sniff_mime(image_bytes),
            STANDARD.encode(image_bytes)
        );

        let (prompt, response_format) = match self.output {
            VisionOutput::PlainText => (EXTRACT_PROMPT, None),
            VisionOutput::JsonDocument => (
                TRANSCRIBE_JSON_PROMPT,
                Some(ResponseFormat {
                    kind: "json_object",
                }),
            ),
        };

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text {
                        text: prompt.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ],
            }],
            max_tokens: 8192,
            temperature: 0.3,
            response_format,
        };

        let content = self.make_request(&request).await?;
        if content.trim().is_empty() {
            warn!(model = %self.model, "Empty result from vision chat API");
            return Ok(RecognizedText::Plain(String::new()));
        }

        match self.output {
            VisionOutput::PlainText => Ok(RecognizedText::Plain(content)),
            VisionOutput::JsonDocument => RecognizedText::json(content),
        }
    }

    /// POST the chat request, retrying throttling and server errors with
    /// exponential backoff (200ms, 400ms) before giving up on the third try.
    async fn make_request(&self, request: &ChatRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let failure = match self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(request)
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    let completion: ChatResponse = resp.json().await.map_err(|e| {
                        GatewayError::Ocr(format!("Failed to parse response: {e}"))
                    })?;
                    return completion
                        .choices
                        .into_iter()
                        .next()
                        .map(|choice| choice.message.content.unwrap_or_default())
                        .ok_or_else(|| GatewayError::Ocr("No response from API".to_string()));
                }
                Ok(resp) if is_retryable(resp.status()) => resp.status().to_string(),
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|e| format!("<body unreadable: {e}>"));
                    return Err(GatewayError::Ocr(format!(
                        "API request failed: {status} - {body}"
                    )));
                }
                Err(e) => e.to_string(),
            };

            if attempt >= CHAT_MAX_ATTEMPTS {
                return Err(GatewayError::Ocr(format!(
                    "API request failed after {CHAT_MAX_ATTEMPTS} attempts: {failure}"
                )));
            }
            warn!(model = %self.model, attempt, "Vision chat request failed, retrying: {}", failure);
            tokio::time::sleep(Duration::from_millis(100 << attempt)).await;
        }
    }
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}
