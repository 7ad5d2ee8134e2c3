//! Housekeeping tasks.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::error::MonitorError;
use crate::metrics::{names, MetricsRegistry};
use crate::pipeline::AlertPipeline;
use crate::scheduler::ScheduledTask;
use crate::store::MetricStore;

/// Prunes the alert window and reports its contents by level.
pub struct AlertWindowSweep {
    pipeline: Arc<AlertPipeline>,
    metrics: Arc<MetricsRegistry>,
}

impl AlertWindowSweep {
    pub fn new(pipeline: Arc<AlertPipeline>, metrics: Arc<MetricsRegistry>) -> Self {
        Self { pipeline, metrics }
    }
}

#[async_trait]
impl ScheduledTask for AlertWindowSweep {
    fn name(&self) -> &str {
        "alert_sweep"
    }

    async fn run(&self) -> Result<(), MonitorError> {
        let window = self.pipeline.window();
        let now = Utc::now();
        let pruned = window.prune(now);
        let forgotten = self.pipeline.prune_dedup(now);
        let counts = window.counts_by_level();

        for (level, count) in &counts {
            self.metrics.set_gauge(
                names::ALERT_WINDOW_SIZE,
                &[("level", level.as_str())],
                *count as f64,
            );
        }
        info!(
            pruned,
            forgotten,
            active = counts.values().sum::<usize>(),
            "Alert window: {}",
            counts
                .iter()
                .map(|(level, count)| format!("{}={}", level.as_str(), count))
                .collect::<Vec<_>>()
                .join(" ")
        );
        Ok(())
    }
}

/// Deletes snapshots older than the retention period.
pub struct RetentionSweep {
    store: Arc<dyn MetricStore>,
    retention: chrono::Duration,
}

impl RetentionSweep {
    pub fn new(store: Arc<dyn MetricStore>, retention: chrono::Duration) -> Self {
        Self { store, retention }
    }
}

#[async_trait]
impl ScheduledTask for RetentionSweep {
    fn name(&self) -> &str {
        "retention"
    }

    async fn run(&self) -> Result<(), MonitorError> {
        let cutoff = Utc::now() - self.retention;
        let removed = self.store.prune_snapshots(cutoff).await?;
        if removed > 0 {
            info!(removed, %cutoff, "Pruned old snapshots");
        }
        Ok(())
    }
}
