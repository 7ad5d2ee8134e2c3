//! Snapshot collection: fetch, store, compare, alert.

#[cfg(test)]
#[path = "collector_tests.rs"]
mod tests;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::alerts::{AlertEvent, AlertLevel};
use crate::cache::LatestCache;
use crate::error::{MonitorError, StoreError};
use crate::evaluator::ThresholdEvaluator;
use crate::metrics::{names, MetricsRegistry};
use crate::pipeline::AlertPipeline;
use crate::scheduler::ScheduledTask;
use crate::snapshot::Snapshot;
use crate::source::MetricSource;
use crate::store::MetricStore;

/// Shared dependencies of every snapshot collector.
#[derive(Clone)]
pub struct CollectorContext {
    pub store: Arc<dyn MetricStore>,
    pub cache: Arc<LatestCache>,
    pub evaluator: Arc<ThresholdEvaluator>,
    pub pipeline: Arc<AlertPipeline>,
    pub metrics: Arc<MetricsRegistry>,
    pub write_timeout: Duration,
    /// Consecutive store failures before a CRITICAL alert.
    pub failure_threshold: u32,
}

/// Periodic task that runs one [`MetricSource`] through the full
/// fetch, store, cache, evaluate and alert sequence.
pub struct SnapshotCollector {
    source: Arc<dyn MetricSource>,
    ctx: CollectorContext,
    store_failures: AtomicU32,
}

impl SnapshotCollector {
    /// Create a new collector.
    pub fn new(source: Arc<dyn MetricSource>, ctx: CollectorContext) -> Self {
        Self {
            source,
            ctx,
            store_failures: AtomicU32::new(0),
        }
    }

    /// Consecutive failed store writes so far.
    pub fn store_failures(&self) -> u32 {
        self.store_failures.load(Ordering::Relaxed)
    }

    /// Run one collection cycle.
    pub async fn collect(&self) -> Result<(), MonitorError> {
        let snapshot = self.source.fetch().await?;
        self.export_gauges(&snapshot);

        if let Err(e) = self.persist(&snapshot).await {
            self.on_store_failure(e).await;
            return Ok(());
        }
        self.store_failures.store(0, Ordering::Relaxed);

        let previous = self.ctx.cache.replace(&snapshot);
        let events = self.ctx.evaluator.evaluate(&snapshot, previous.as_ref());
        debug!(
            source = snapshot.source(),
            fields = snapshot.fields().len(),
            baseline = previous.is_some(),
            events = events.len(),
            "Collected snapshot"
        );

        for event in events {
            if let Err(e) = self.ctx.pipeline.submit(event).await {
                error!(source = snapshot.source(), "Failed to submit alert: {}", e);
            }
        }

        Ok(())
    }

    async fn persist(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        match tokio::time::timeout(self.ctx.write_timeout, self.ctx.store.append_snapshot(snapshot)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Unavailable(format!(
                "snapshot write timed out after {:?}",
                self.ctx.write_timeout
            ))),
        }
    }

    /// Evaluation is skipped for this tick. After `failure_threshold`
    /// consecutive failures a single CRITICAL event is raised.
    async fn on_store_failure(&self, e: StoreError) {
        let failures = self.store_failures.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            source = self.source.name(),
            consecutive = failures,
            "Failed to store snapshot, skipping evaluation: {}",
            e
        );
        self.ctx
            .metrics
            .inc_counter(names::STORE_FAILURES_TOTAL, &[("task", self.source.name())]);

        if failures == self.ctx.failure_threshold {
            let event = AlertEvent::new(
                AlertLevel::Critical,
                "Metric Store Unavailable",
                format!(
                    "{} consecutive snapshot writes failed for {}: {}",
                    failures,
                    self.source.name(),
                    e
                ),
                "store_failures",
                failures as f64,
                self.ctx.failure_threshold as f64,
            )
            .with_source(self.source.name());
            if let Err(e) = self.ctx.pipeline.submit(event).await {
                error!(source = self.source.name(), "Failed to submit store alert: {}", e);
            }
        }
    }

    fn export_gauges(&self, snapshot: &Snapshot) {
        for (name, value) in snapshot.fields() {
            self.ctx.metrics.set_gauge(
                names::METRIC_VALUE,
                &[("source", snapshot.source()), ("metric", name.as_str())],
                value.as_f64(),
            );
        }
    }
}

#[async_trait]
impl ScheduledTask for SnapshotCollector {
    fn name(&self) -> &str {
        self.source.name()
    }

    async fn run(&self) -> Result<(), MonitorError> {
        self.collect().await
    }
}
