use serde::Deserialize;
use std::collections::HashMap;
use std::env;

use crate::error::{GatewayError, Result};

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

/// Parse a comma-separated env var into trimmed, non-empty entries.
fn parse_env_list(var: &str, default: &[&str]) -> Vec<String> {
    match env::var(var) {
        Ok(val) if !val.trim().is_empty() => val
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => default.iter().map(|s| s.to_string()).collect(),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub workers: WorkersConfig,
    pub ocr: OcrConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Bearer keys accepted on protected routes. Empty disables authentication.
    pub api_keys: Vec<String>,
    /// Inbound requests allowed in flight at once before answering 429.
    pub max_concurrent_requests: usize,
}

/// Whether batches share one worker pool or each gets its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PoolScope {
    #[default]
    Shared,
    PerRequest,
}

impl std::str::FromStr for PoolScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "shared" => Ok(Self::Shared),
            "per_request" | "per-request" => Ok(Self::PerRequest),
            other => Err(format!("unknown pool scope '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkersConfig {
    pub max_workers: usize,
    pub pool_scope: PoolScope,
    /// Deadline for a whole batch in seconds; 0 disables it.
    pub batch_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    /// Yandex Cloud folder the API key belongs to.
    pub folder_id: Option<String>,
    pub languages: String,
    pub timeout_secs: u64,
    pub max_images_per_request: usize,
    pub max_image_size_mb: u64,
    pub supported_formats: Vec<String>,
    pub requests_per_second: i64,
    /// Extra `provider/model` backends served next to `model` under
    /// `/api/v1/ocr/{provider}`.
    pub backends: Vec<String>,
    /// Per-provider credentials; a provider without an entry uses the
    /// shared `api_key`, `base_url` and `folder_id`.
    pub credentials: HashMap<String, ProviderCredentials>,
    /// Value expected in `X-Gemini-API-Key` on the gemini backend. Unset
    /// leaves that backend behind the bearer key only.
    pub gemini_auth_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProviderCredentials {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub folder_id: Option<String>,
}

impl ProviderCredentials {
    /// Read `OCR_<PROVIDER>_API_KEY`, `OCR_<PROVIDER>_BASE_URL` and
    /// `OCR_<PROVIDER>_FOLDER_ID`.
    fn from_env(provider: &str) -> Option<Self> {
        let prefix = format!("OCR_{}", provider.to_uppercase());
        let creds = Self {
            api_key: env::var(format!("{prefix}_API_KEY")).ok(),
            base_url: env::var(format!("{prefix}_BASE_URL")).ok(),
            folder_id: env::var(format!("{prefix}_FOLDER_ID")).ok(),
        };
        (creds != Self::default()).then_some(creds)
    }
}

impl OcrConfig {
    pub fn max_image_size_bytes(&self) -> u64 {
        self.max_image_size_mb.saturating_mul(1024 * 1024)
    }

    /// Settings for one backend: `model` swapped in and the provider's own
    /// credentials layered over the shared ones.
    pub fn for_model(&self, model: &str) -> OcrConfig {
        let mut config = self.clone();
        config.model = model.to_string();
        let provider = parse_provider_model(model).0.to_lowercase();
        if let Some(creds) = self.credentials.get(&provider) {
            if creds.api_key.is_some() {
                config.api_key = creds.api_key.clone();
            }
            if creds.base_url.is_some() {
                config.base_url = creds.base_url.clone();
            }
            if creds.folder_id.is_some() {
                config.folder_id = creds.folder_id.clone();
            }
        }
        config
    }

    /// Route name of every configured backend, default first.
    pub fn backend_names(&self) -> Vec<String> {
        std::iter::once(&self.model)
            .chain(self.backends.iter())
            .map(|model| parse_provider_model(model).0.to_lowercase())
            .collect()
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            model: "local/tesseract".to_string(),
            api_key: None,
            base_url: None,
            folder_id: None,
            languages: "rus+eng".to_string(),
            timeout_secs: 240,
            max_images_per_request: 10,
            max_image_size_mb: 10,
            supported_formats: DEFAULT_FORMATS.iter().map(|s| s.to_string()).collect(),
            requests_per_second: 10,
            backends: Vec::new(),
            credentials: HashMap::new(),
            gemini_auth_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    pub ttl_secs: u64,
    pub cleanup_interval_secs: u64,
}

const DEFAULT_FORMATS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "tiff"];

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: env::var("OCR_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_env_or("OCR_PORT", 8080),
                api_keys: parse_env_list("OCR_API_KEYS", &[]),
                max_concurrent_requests: parse_env_or("OCR_MAX_CONCURRENT_REQUESTS", 10),
            },
            workers: WorkersConfig {
                max_workers: parse_env_or("OCR_MAX_WORKERS", 4),
                pool_scope: parse_env_or("OCR_WORKER_POOL_SCOPE", PoolScope::Shared),
                batch_timeout_secs: parse_env_or("OCR_BATCH_TIMEOUT", 0),
            },
            ocr: OcrConfig {
                model: env::var("OCR_MODEL").unwrap_or_else(|_| "local/tesseract".to_string()),
                api_key: env::var("OCR_API_KEY").ok(),
                base_url: env::var("OCR_BASE_URL").ok(),
                folder_id: env::var("OCR_FOLDER_ID").ok(),
                languages: env::var("OCR_LANGUAGES").unwrap_or_else(|_| "rus+eng".to_string()),
                timeout_secs: parse_env_or("OCR_TIMEOUT", 240),
                max_images_per_request: parse_env_or("OCR_MAX_IMAGES_PER_REQUEST", 10),
                max_image_size_mb: parse_env_or("OCR_MAX_IMAGE_SIZE_MB", 10),
                supported_formats: parse_env_list("OCR_SUPPORTED_FORMATS", DEFAULT_FORMATS),
                requests_per_second: parse_env_or("OCR_REQUESTS_PER_SECOND", 10),
                backends: parse_env_list("OCR_BACKENDS", &[]),
                credentials: KNOWN_OCR_PROVIDERS
                    .iter()
                    .filter(|p| **p != "local")
                    .filter_map(|p| ProviderCredentials::from_env(p).map(|c| (p.to_string(), c)))
                    .collect(),
                gemini_auth_key: env::var("OCR_GEMINI_AUTH_KEY")
                    .ok()
                    .filter(|k| !k.is_empty()),
            },
            history: HistoryConfig {
                ttl_secs: parse_env_or("HISTORY_TTL_SECS", 86400),
                cleanup_interval_secs: parse_env_or("HISTORY_CLEANUP_INTERVAL_SECS", 600),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Reject settings that would deadlock or reject every request.
    pub fn validate(&self) -> Result<()> {
        if self.workers.max_workers == 0 {
            return Err(GatewayError::Validation(
                "OCR_MAX_WORKERS must be greater than zero".to_string(),
            ));
        }
        if self.server.max_concurrent_requests == 0 {
            return Err(GatewayError::Validation(
                "OCR_MAX_CONCURRENT_REQUESTS must be greater than zero".to_string(),
            ));
        }
        if self.ocr.max_images_per_request == 0 {
            return Err(GatewayError::Validation(
                "OCR_MAX_IMAGES_PER_REQUEST must be greater than zero".to_string(),
            ));
        }
        if self.history.cleanup_interval_secs == 0 {
            return Err(GatewayError::Validation(
                "HISTORY_CLEANUP_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }
        if self.ocr.supported_formats.is_empty() {
            return Err(GatewayError::Validation(
                "OCR_SUPPORTED_FORMATS must list at least one extension".to_string(),
            ));
        }
        let names = self.ocr.backend_names();
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(GatewayError::Validation(format!(
                    "OCR_BACKENDS lists provider '{name}' more than once (OCR_MODEL counts)"
                )));
            }
        }
        Ok(())
    }
}

/// Known OCR providers selectable through the `provider/model` prefix.
pub const KNOWN_OCR_PROVIDERS: &[&str] = &["local", "yandex", "google", "openai", "gemini"];

/// Parse an OCR model name into (provider, model) tuple.
pub fn parse_provider_model(model: &str) -> (&str, &str) {
    if let Some((prefix, rest)) = model.split_once('/') {
        let prefix_lower = prefix.to_lowercase();
        if KNOWN_OCR_PROVIDERS.contains(&prefix_lower.as_str()) {
            return (prefix, rest);
        }
    }
    // Default to local provider
    ("local", model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_defaults() {
        std::env::remove_var("OCR_MAX_WORKERS");
        std::env::remove_var("OCR_WORKER_POOL_SCOPE");
        std::env::remove_var("OCR_SUPPORTED_FORMATS");

        let config = Config::default();
        assert_eq!(config.workers.max_workers, 4);
        assert_eq!(config.workers.pool_scope, PoolScope::Shared);
        assert_eq!(config.ocr.max_image_size_bytes(), 10 * 1024 * 1024);
        assert!(config.ocr.supported_formats.contains(&"png".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        std::env::set_var("OCR_MAX_WORKERS", "8");
        std::env::set_var("OCR_WORKER_POOL_SCOPE", "per_request");
        std::env::set_var("OCR_SUPPORTED_FORMATS", " jpg , png ,");

        let config = Config::default();
        assert_eq!(config.workers.max_workers, 8);
        assert_eq!(config.workers.pool_scope, PoolScope::PerRequest);
        assert_eq!(config.ocr.supported_formats, vec!["jpg", "png"]);

        std::env::remove_var("OCR_MAX_WORKERS");
        std::env::remove_var("OCR_WORKER_POOL_SCOPE");
        std::env::remove_var("OCR_SUPPORTED_FORMATS");
    }

    #[test]
    #[serial]
    fn test_invalid_env_value_falls_back_to_default() {
        std::env::set_var("OCR_MAX_WORKERS", "many");

        let config = Config::default();
        assert_eq!(config.workers.max_workers, 4);

        std::env::remove_var("OCR_MAX_WORKERS");
    }

    #[test]
    #[serial]
    fn test_validate_rejects_zero_workers() {
        let mut config = Config::default();
        config.workers.max_workers = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("OCR_MAX_WORKERS"));
    }

    #[test]
    #[serial]
    fn test_validate_rejects_zero_cleanup_interval() {
        let mut config = Config::default();
        config.history.cleanup_interval_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("HISTORY_CLEANUP_INTERVAL_SECS"));
    }

    #[test]
    #[serial]
    fn test_validate_rejects_duplicate_backend_provider() {
        let mut config = Config::default();
        config.ocr.model = "yandex/page".to_string();
        config.ocr.backends = vec!["gemini/gemini-2.5-pro".to_string(), "yandex/table".to_string()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("'yandex'"));

        config.ocr.backends = vec!["gemini/gemini-2.5-pro".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_backends_and_credentials_from_env() {
        std::env::set_var("OCR_BACKENDS", "gemini/gemini-2.5-pro, yandex/page");
        std::env::set_var("OCR_GEMINI_API_KEY", "gemini-secret");
        std::env::set_var("OCR_YANDEX_FOLDER_ID", "folder-1");
        std::env::set_var("OCR_GEMINI_AUTH_KEY", "route-key");

        let config = Config::default();
        assert_eq!(config.ocr.backends, vec!["gemini/gemini-2.5-pro", "yandex/page"]);
        assert_eq!(
            config.ocr.credentials.get("gemini").and_then(|c| c.api_key.as_deref()),
            Some("gemini-secret")
        );
        assert_eq!(
            config.ocr.credentials.get("yandex").and_then(|c| c.folder_id.as_deref()),
            Some("folder-1")
        );
        assert!(!config.ocr.credentials.contains_key("openai"));
        assert_eq!(config.ocr.gemini_auth_key.as_deref(), Some("route-key"));

        for var in [
            "OCR_BACKENDS",
            "OCR_GEMINI_API_KEY",
            "OCR_YANDEX_FOLDER_ID",
            "OCR_GEMINI_AUTH_KEY",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_for_model_layers_provider_credentials() {
        let mut ocr = OcrConfig {
            api_key: Some("shared-key".to_string()),
            base_url: Some("https://shared.example".to_string()),
            ..OcrConfig::default()
        };
        ocr.credentials.insert(
            "gemini".to_string(),
            ProviderCredentials {
                api_key: Some("gemini-key".to_string()),
                ..ProviderCredentials::default()
            },
        );

        let gemini = ocr.for_model("gemini/gemini-2.5-pro");
        assert_eq!(gemini.model, "gemini/gemini-2.5-pro");
        assert_eq!(gemini.api_key.as_deref(), Some("gemini-key"));
        assert_eq!(gemini.base_url.as_deref(), Some("https://shared.example"));

        let openai = ocr.for_model("openai/gpt-4o");
        assert_eq!(openai.api_key.as_deref(), Some("shared-key"));
    }

    #[test]
    fn test_backend_names_put_default_first() {
        let ocr = OcrConfig {
            model: "Yandex/page".to_string(),
            backends: vec!["gemini/gemini-2.5-pro".to_string(), "tesseract".to_string()],
            ..OcrConfig::default()
        };
        assert_eq!(ocr.backend_names(), vec!["yandex", "gemini", "local"]);
    }

    #[test]
    fn test_pool_scope_parsing() {
        assert_eq!("shared".parse::<PoolScope>().unwrap(), PoolScope::Shared);
        assert_eq!("Per-Request".parse::<PoolScope>().unwrap(), PoolScope::PerRequest);
        assert!("global".parse::<PoolScope>().is_err());
    }

    #[test]
    fn test_parse_provider_model() {
        assert_eq!(parse_provider_model("yandex/page"), ("yandex", "page"));
        assert_eq!(
            parse_provider_model("gemini/gemini-2.5-pro"),
            ("gemini", "gemini-2.5-pro")
        );
        assert_eq!(parse_provider_model("tesseract"), ("local", "tesseract"));
        assert_eq!(parse_provider_model("acme/thing"), ("local", "acme/thing"));
    }
}
