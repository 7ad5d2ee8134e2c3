//! One-shot commands: `check`, `alerts` and `report`.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;

use cataklism_config::{Config, ConfigLoader, ConfigValidator};
use cataklism_engine::{AlertLevel, AlertLog, Engine, MemoryStore, ReportGenerator, ReportPeriod};
use cataklism_store_sqlite::SqliteStore;

async fn open_store(config: &Config) -> Result<Arc<SqliteStore>, Box<dyn std::error::Error>> {
    let path = ConfigLoader::expand_path(&config.storage.path);
    Ok(Arc::new(SqliteStore::open(&path).await?))
}

/// Print validation warnings and, with `probe`, run every task once.
pub(crate) async fn check(config: Config, probe: bool) -> Result<(), Box<dyn std::error::Error>> {
    let result = ConfigValidator::validate(&config);
    if result.warnings.is_empty() {
        println!("Configuration is valid");
    } else {
        println!("Configuration is valid with {} warning(s):", result.warnings.len());
        for warning in &result.warnings {
            println!("  {}: {}", warning.path, warning.message);
        }
    }

    if !probe {
        return Ok(());
    }

    // Probe alerts are printed, not sent.
    let mut config = config;
    config.notifiers = Default::default();
    let memory = Arc::new(MemoryStore::new());
    let engine = Engine::build(&config, memory.clone(), memory.clone(), CancellationToken::new())?;
    let mut failed = 0;
    for (name, result) in engine.run_once().await {
        match result {
            Ok(()) => println!("  ok    {}", name),
            Err(e) => {
                failed += 1;
                println!("  FAIL  {} ({})", name, e);
            }
        }
    }
    for alert in memory.alerts() {
        println!("{}\n", alert.event.format_text());
    }

    if failed > 0 {
        return Err(format!("{} task(s) failed", failed).into());
    }
    Ok(())
}

/// Start of a window reaching `hours` back from `now`.
fn lookback_start(now: DateTime<Utc>, hours: u32) -> Result<DateTime<Utc>, String> {
    Duration::try_hours(i64::from(hours))
        .and_then(|span| now.checked_sub_signed(span))
        .ok_or_else(|| format!("--hours {} reaches before the earliest representable time", hours))
}

/// Print alerts from the last `hours` at or above `level`.
pub(crate) async fn list_alerts(
    config: &Config,
    hours: u32,
    level: AlertLevel,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config).await?;
    let now = Utc::now();
    let alerts = store
        .alerts_between(lookback_start(now, hours)?, now, level)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&alerts)?);
        return Ok(());
    }

    if alerts.is_empty() {
        println!("No alerts at or above {} in the last {}h", level, hours);
        return Ok(());
    }
    for alert in &alerts {
        println!("#{} {}\n", alert.id, alert.event.format_text());
    }
    println!("{} alert(s)", alerts.len());
    Ok(())
}

/// Generate the report for the period ending now.
pub(crate) async fn generate_report(
    config: &Config,
    period: ReportPeriod,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config).await?;
    let generator = ReportGenerator::new(
        store.clone(),
        store,
        ConfigLoader::expand_path(&config.reports.dir),
    );
    let path = generator.run(period, Utc::now()).await?;
    println!("Report written to {}", path.display());
    Ok(())
}
