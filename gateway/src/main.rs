use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ocr_gateway::api::{create_router, AppState};
use ocr_gateway::config::Config;
use ocr_gateway::ocr::OcrProvider;
use ocr_gateway::services::HistoryCleanupManager;

#[derive(Parser)]
#[command(name = "ocr-gateway")]
#[command(about = "HTTP gateway for batch OCR over pluggable recognition backends")]
struct Args {
    /// Override OCR_MODEL (e.g. local/tesseract, yandex/page, gemini/gemini-2.5-pro)
    #[arg(long)]
    model: Option<String>,

    /// Override OCR_PORT
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    init_tracing();

    let mut config = Config::from_env();
    if let Some(model) = args.model {
        config.ocr.model = model;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;

    if config.server.api_keys.is_empty() {
        tracing::warn!(
            "OCR_API_KEYS is not set, authentication is disabled. Set OCR_API_KEYS to protect /api/v1/ocr and /api/v1/history."
        );
    }

    tracing::info!("Initializing OCR provider: {}...", config.ocr.model);
    let ocr = OcrProvider::new(&config.ocr.for_model(&config.ocr.model))?;
    if !ocr.is_available() {
        tracing::warn!("OCR unavailable - every image will fail until the backend is configured");
    }

    let mut state = AppState::new(config.clone(), ocr.clone())?;
    let mut providers = vec![ocr];
    for model in &config.ocr.backends {
        tracing::info!("Initializing extra OCR backend: {}...", model);
        let provider = OcrProvider::new(&config.ocr.for_model(model))?;
        if !provider.is_available() {
            tracing::warn!(model = %model, "OCR backend unavailable - its route will fail every image");
        }
        state = state.with_backend(model, Arc::new(provider.clone()), provider.is_available());
        providers.push(provider);
    }
    if state.backend("gemini").is_some() && config.ocr.gemini_auth_key.is_none() {
        tracing::warn!(
            "OCR_GEMINI_AUTH_KEY is not set, /api/v1/ocr/gemini only checks the bearer key."
        );
    }

    tracing::info!(
        backends = ?config.ocr.backend_names(),
        max_workers = config.workers.max_workers,
        pool_scope = ?config.workers.pool_scope,
        batch_timeout_secs = config.workers.batch_timeout_secs,
        "Batch processor ready"
    );

    let cancel_token = CancellationToken::new();

    tracing::info!("Starting history cleanup manager...");
    let manager = HistoryCleanupManager::new(
        state.history.clone(),
        state.config.history.cleanup_interval_secs,
    );
    let token = cancel_token.child_token();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("History cleanup manager shutting down...");
                    break;
                }
                _ = tokio::time::sleep(tokio::time::Duration::from_secs(manager.interval_secs())) => {
                    manager.run_once();
                }
            }
        }
    });

    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("OCR gateway starting on http://{}", addr);
    tracing::info!("  Health check: http://{}/api/v1/health", addr);
    tracing::info!("  API docs:     http://{}/api/v1/docs", addr);
    tracing::info!("  OpenAPI spec: http://{}/api/v1/openapi.json", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel_token))
        .await?;

    for provider in &providers {
        provider.shutdown().await;
    }
    tracing::info!("Server exited");

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ocr_gateway=info,tower_http=debug".into());
    let json = std::env::var("OCR_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, cancelling background tasks...");
    cancel_token.cancel();
}
