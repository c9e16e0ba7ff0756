//! Entry point for the capture-server binary.

use std::sync::Arc;

use capture_engine::{CaptureEngine, EngineConfig, ExportWorker};
use capture_engine::capture_core::system_clock;
use capture_engine::capture_store::{JsonFileStore, StoreConfig};
use capture_server::{WebhookSink, config::ServerConfig, routes, state::AppState};
use http::HeaderValue;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = ServerConfig::from_env()?;
    let engine_config = EngineConfig::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    tracing::info!("Starting capture-server");
    tracing::info!(
        "Configuration: port={}, log_level={}, queue_budget={}",
        config.port,
        config.log_level,
        engine_config.max_queue_size
    );

    // Open the document store
    let store_config = StoreConfig::from_env();
    let store = JsonFileStore::from_config(&store_config).await?;
    tracing::info!("Opened store at {}", store.root().display());

    let engine = CaptureEngine::new(Arc::new(store), system_clock(), engine_config);

    // Deliver exports only when a destination is configured
    let mut worker = match &config.export_webhook_url {
        Some(url) => {
            let sink = WebhookSink::new(url.clone())?;
            let worker: ExportWorker = engine
                .worker(Arc::new(sink))
                .with_poll_interval(config.export_poll_interval);
            worker.start();
            tracing::info!("Export worker delivering to {}", url);
            Some(worker)
        }
        None => {
            tracing::info!("EXPORT_WEBHOOK_URL not set, export queue is passive");
            None
        }
    };

    // Build application state
    let state = AppState::new(engine, config.clone());

    // Build CORS layer
    let cors = build_cors_layer(&config.cors_allowed_origins)?;

    // Build router with middleware
    let app = routes::build_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Create listener
    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(worker) = worker.as_mut() {
        worker.shutdown();
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initialize the tracing subscriber. `RUST_LOG` wins over `LOG_LEVEL`.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build CORS layer from configuration.
fn build_cors_layer(allowed_origins: &str) -> Result<CorsLayer, http::header::InvalidHeaderValue> {
    if allowed_origins.trim() == "*" {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any));
    }

    // Parse comma-separated origins
    let origins = allowed_origins
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(HeaderValue::from_str)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any))
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
