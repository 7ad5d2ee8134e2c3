//! Alert pipeline: record, window, log, gate and dispatch.

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info, warn};

use cataklism_config::{AlertsConfig, StorageConfig};

use crate::alerts::{AlertEvent, AlertId, AlertLevel, Notifier};
use crate::error::{MonitorError, StoreError};
use crate::metrics::{names, MetricsRegistry};
use crate::store::AlertLog;
use crate::window::AlertWindow;

/// What happened to a submitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    /// Recorded and handed to every notifier.
    Dispatched,
    /// Recorded, but below the dispatch floor.
    DispatchSkipped,
    /// Recorded, but an identical event was dispatched inside the dedup window.
    Suppressed,
}

/// Outcome of [`AlertPipeline::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertOutcome {
    pub id: AlertId,
    pub state: AlertState,
    /// Notifiers whose send failed or timed out.
    pub failed_notifiers: Vec<String>,
}

/// Pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub min_dispatch_level: AlertLevel,
    pub window_horizon: chrono::Duration,
    pub dedup_window: Option<chrono::Duration>,
    pub notify_timeout: Duration,
    pub record_timeout: Duration,
}

impl PipelineConfig {
    pub fn from_config(alerts: &AlertsConfig, storage: &StorageConfig) -> Self {
        Self {
            min_dispatch_level: alerts.min_dispatch_level,
            window_horizon: chrono::Duration::hours(alerts.window_hours as i64),
            dedup_window: alerts
                .dedup_window_secs
                .map(|s| chrono::Duration::seconds(s as i64)),
            notify_timeout: Duration::from_secs(alerts.notify_timeout_secs),
            record_timeout: Duration::from_secs(storage.write_timeout_secs),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_config(&AlertsConfig::default(), &StorageConfig::default())
    }
}

/// Pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Every event submitted, recorded or not.
    pub raw: u64,
    pub dispatched: u64,
    pub skipped: u64,
    pub suppressed: u64,
    pub record_failures: u64,
}

type DedupKey = (String, String, AlertLevel);

/// Routes alert events to the durable log, the alert window and notifiers.
pub struct AlertPipeline {
    log: Arc<dyn AlertLog>,
    notifiers: Vec<Arc<dyn Notifier>>,
    window: AlertWindow,
    config: PipelineConfig,
    metrics: Option<Arc<MetricsRegistry>>,
    last_dispatch: Mutex<HashMap<DedupKey, DateTime<Utc>>>,
    raw: AtomicU64,
    dispatched: AtomicU64,
    skipped: AtomicU64,
    suppressed: AtomicU64,
    record_failures: AtomicU64,
}

impl AlertPipeline {
    /// Create a new pipeline without notifiers.
    pub fn new(log: Arc<dyn AlertLog>, config: PipelineConfig) -> Self {
        Self {
            log,
            notifiers: Vec::new(),
            window: AlertWindow::new(config.window_horizon),
            config,
            metrics: None,
            last_dispatch: Mutex::new(HashMap::new()),
            raw: AtomicU64::new(0),
            dispatched: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            record_failures: AtomicU64::new(0),
        }
    }

    /// Add a notifier.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    /// Add several notifiers.
    pub fn with_notifiers(mut self, notifiers: impl IntoIterator<Item = Arc<dyn Notifier>>) -> Self {
        self.notifiers.extend(notifiers);
        self
    }

    /// Export counters through `registry`.
    pub fn with_metrics(mut self, registry: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(registry);
        self
    }

    /// Get list of notifier names.
    pub fn notifier_names(&self) -> Vec<&str> {
        self.notifiers.iter().map(|n| n.name()).collect()
    }

    pub fn window(&self) -> &AlertWindow {
        &self.window
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            raw: self.raw.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            record_failures: self.record_failures.load(Ordering::Relaxed),
        }
    }

    /// Forget dedup entries that can no longer suppress anything at `now`.
    /// Returns the number removed.
    pub fn prune_dedup(&self, now: DateTime<Utc>) -> usize {
        let mut last = self.last_dispatch.lock();
        let before = last.len();
        match self.config.dedup_window {
            Some(window) => last.retain(|_, at| now - *at < window),
            None => last.clear(),
        }
        before - last.len()
    }

    /// Submit an event.
    ///
    /// The event is recorded in the durable log before anything else. When
    /// the write fails the event is neither windowed nor dispatched and the
    /// store error is returned. Notifier failures never fail the call.
    pub async fn submit(&self, event: AlertEvent) -> Result<AlertOutcome, MonitorError> {
        self.raw.fetch_add(1, Ordering::Relaxed);

        let id = match tokio::time::timeout(self.config.record_timeout, self.log.append_alert(&event)).await {
            Ok(Ok(id)) => id,
            Ok(Err(e)) => return Err(self.record_failed(&event, e)),
            Err(_) => {
                let e = StoreError::Unavailable("alert log write timed out".to_string());
                return Err(self.record_failed(&event, e));
            }
        };

        warn!(
            alert_id = %id,
            source = %event.source,
            "ALERT [{}]: {} - {}",
            event.level,
            event.title,
            event.message
        );
        self.window.add(event.clone());
        if let Some(ref m) = self.metrics {
            m.inc_counter(names::ALERTS_TOTAL, &[("level", event.level.as_str())]);
        }

        if event.level < self.config.min_dispatch_level {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(AlertOutcome {
                id,
                state: AlertState::DispatchSkipped,
                failed_notifiers: Vec::new(),
            });
        }

        if self.is_duplicate(&event) {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            if let Some(ref m) = self.metrics {
                m.inc_counter(names::ALERTS_SUPPRESSED_TOTAL, &[]);
            }
            info!(alert_id = %id, metric = %event.metric, "Suppressed duplicate alert");
            return Ok(AlertOutcome {
                id,
                state: AlertState::Suppressed,
                failed_notifiers: Vec::new(),
            });
        }

        let failed_notifiers = self.dispatch(id, &event).await;
        self.dispatched.fetch_add(1, Ordering::Relaxed);

        Ok(AlertOutcome {
            id,
            state: AlertState::Dispatched,
            failed_notifiers,
        })
    }

    fn record_failed(&self, event: &AlertEvent, e: StoreError) -> MonitorError {
        self.record_failures.fetch_add(1, Ordering::Relaxed);
        error!(
            level = %event.level,
            metric = %event.metric,
            "Failed to record alert '{}': {}",
            event.title,
            e
        );
        MonitorError::Store(e)
    }

    /// Check and update the dedup table.
    fn is_duplicate(&self, event: &AlertEvent) -> bool {
        let Some(window) = self.config.dedup_window else {
            return false;
        };
        let mut last = self.last_dispatch.lock();
        let key = event.dedup_key();
        match last.get(&key) {
            Some(at) if event.timestamp - *at < window => true,
            _ => {
                last.insert(key, event.timestamp);
                false
            }
        }
    }

    /// Send to all notifiers concurrently. Returns the names of failed ones.
    async fn dispatch(&self, id: AlertId, event: &AlertEvent) -> Vec<String> {
        let timeout = self.config.notify_timeout;
        let sends = self.notifiers.iter().map(|notifier| async move {
            let result = match tokio::time::timeout(timeout, notifier.send(event)).await {
                Ok(result) => result,
                Err(_) => Err(MonitorError::notifier(
                    notifier.name(),
                    format!("timed out after {:?}", timeout),
                )),
            };
            (notifier.name(), result)
        });

        let mut failed = Vec::new();
        for (name, result) in join_all(sends).await {
            if let Err(e) = result {
                error!(notifier = name, alert_id = %id, "Failed to send alert: {}", e);
                if let Some(ref m) = self.metrics {
                    m.inc_counter(names::NOTIFIER_FAILURES_TOTAL, &[("notifier", name)]);
                }
                failed.push(name.to_string());
            }
        }
        failed
    }
}
