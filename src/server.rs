//! Logging setup and the `/health` and `/metrics` HTTP surface.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use cataklism_config::ServerConfig;
use cataklism_engine::{Engine, MetricsEndpoint};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Get the .cataklism directory path.
pub(crate) fn cataklism_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".cataklism"))
        .unwrap_or_else(|| PathBuf::from(".cataklism"))
}

/// Initialize tracing with console and file output.
///
/// Log files are written to ~/.cataklism/logs/ with daily rotation.
pub(crate) fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = cataklism_dir().join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("cataklism-monitor")
        .filename_suffix("log")
        .max_log_files(30)
        .build(&log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // The guard flushes the file writer on drop and must live until exit.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_ansi(true))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(())
}

/// Router exposing `/health` and `/metrics` for `engine`.
pub(crate) fn monitor_router(engine: Arc<Engine>) -> Router {
    let health_engine = engine.clone();
    let metrics = Arc::new(MetricsEndpoint::new(engine.metrics()));

    Router::new()
        .route(
            "/health",
            get(move || {
                let engine = health_engine.clone();
                async move {
                    let tasks = engine.scheduler().stats();
                    engine
                        .health_endpoint()
                        .handler(&tasks, engine.pipeline().stats())
                        .await
                        .into_response()
                }
            }),
        )
        .route(
            "/metrics",
            get(move || {
                let metrics = metrics.clone();
                async move { metrics.handler().await.into_response() }
            }),
        )
}

/// Serve the monitor routes until `cancel` fires.
pub(crate) async fn serve(
    config: &ServerConfig,
    engine: Arc<Engine>,
    cancel: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>, Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);
    info!("  GET  /health   - task health");
    info!("  GET  /metrics  - Prometheus metrics");

    let app = monitor_router(engine);
    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
        {
            error!("HTTP server error: {}", e);
        }
    }))
}
