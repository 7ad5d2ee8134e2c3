//! The `run` command: the long-running monitor.

use std::sync::Arc;
use std::time::Duration;

use cataklism_config::{Config, ConfigLoader};
use cataklism_engine::{AlertLog, Engine, MemoryStore, MetricStore};
use cataklism_store_sqlite::SqliteStore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::server;
use crate::signal::SignalHandler;

/// Run the monitor in the foreground until a shutdown signal.
///
/// Exits the process with status 1 when work is still running after the
/// grace period.
pub(crate) async fn run_monitor(config: Config, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting Cataklism monitor v{}", env!("CARGO_PKG_VERSION"));

    let (store, alert_log): (Arc<dyn MetricStore>, Arc<dyn AlertLog>) = if dry_run {
        warn!("Dry run: snapshots and alerts are kept in memory only");
        let memory = Arc::new(MemoryStore::new());
        (memory.clone(), memory)
    } else {
        let path = ConfigLoader::expand_path(&config.storage.path);
        let sqlite = Arc::new(SqliteStore::open(&path).await?);
        info!("Metric store opened at {}", path.display());
        (sqlite.clone(), sqlite)
    };

    let cancel = CancellationToken::new();
    SignalHandler::new(cancel.clone()).install()?;

    let engine = Arc::new(Engine::build(&config, store, alert_log, cancel.clone())?);
    engine.start()?;
    info!(tasks = ?engine.task_names(), "Monitor started");

    let http = if config.server.enabled {
        Some(server::serve(&config.server, engine.clone(), cancel.clone()).await?)
    } else {
        None
    };

    cancel.cancelled().await;
    info!("Shutdown requested");

    let grace = Duration::from_secs(config.shutdown.grace_secs);
    let deadline = Instant::now() + grace;
    let report = engine.shutdown(grace).await;
    let http_clean = match http {
        Some(http) => drain_http(http, deadline).await,
        None => true,
    };

    if !report.clean || !http_clean {
        error!(stragglers = ?report.stragglers, http_clean, "Shutdown was not clean");
        std::process::exit(1);
    }
    info!("Monitor stopped");
    Ok(())
}

/// Wait for the HTTP server to finish by `deadline`, aborting it otherwise.
/// Returns whether it stopped in time.
async fn drain_http(http: JoinHandle<()>, deadline: Instant) -> bool {
    let abort = http.abort_handle();
    match tokio::time::timeout_at(deadline, http).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!("HTTP server task failed: {}", e);
            true
        }
        Err(_) => {
            warn!("HTTP server still busy at the end of the grace period");
            abort.abort();
            false
        }
    }
}
