//! Prometheus-style metrics registry and endpoint.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{http::StatusCode, response::IntoResponse};
use parking_lot::RwLock;

/// Names of the metrics the monitor exports.
pub mod names {
    pub const ALERTS_TOTAL: &str = "cataklism_alerts_total";
    pub const ALERTS_SUPPRESSED_TOTAL: &str = "cataklism_alerts_suppressed_total";
    pub const NOTIFIER_FAILURES_TOTAL: &str = "cataklism_notifier_failures_total";
    pub const METRIC_VALUE: &str = "cataklism_metric_value";
    pub const TASK_RUNS_TOTAL: &str = "cataklism_task_runs_total";
    pub const TASK_SKIPPED_TOTAL: &str = "cataklism_task_skipped_total";
    pub const TASK_DURATION_SECONDS: &str = "cataklism_task_duration_seconds";
    pub const STORE_FAILURES_TOTAL: &str = "cataklism_store_failures_total";
    pub const API_RESPONSE_SECONDS: &str = "cataklism_api_response_seconds";
    pub const ALERT_WINDOW_SIZE: &str = "cataklism_alert_window_size";
}

/// Metric type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    /// Counter (monotonically increasing).
    Counter,
    /// Gauge (can go up and down).
    Gauge,
}

#[derive(Debug, Clone)]
struct MetricDef {
    metric_type: MetricType,
    help: String,
}

/// Label set rendered in exposition order, e.g. `{level="critical"}`.
type SeriesKey = String;

/// Metrics registry.
///
/// Counters hold integers. Gauges hold `f64` bits.
pub struct MetricsRegistry {
    definitions: RwLock<BTreeMap<String, MetricDef>>,
    series: RwLock<BTreeMap<String, BTreeMap<SeriesKey, Arc<AtomicU64>>>>,
}

impl MetricsRegistry {
    /// Create a new metrics registry.
    pub fn new() -> Self {
        Self {
            definitions: RwLock::new(BTreeMap::new()),
            series: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create a registry with the monitor's metrics registered.
    pub fn with_defaults() -> Self {
        use names::*;

        let registry = Self::new();
        registry.register_counter(ALERTS_TOTAL, "Alert events raised, by level");
        registry.register_counter(ALERTS_SUPPRESSED_TOTAL, "Alert events suppressed by dedup");
        registry.register_counter(NOTIFIER_FAILURES_TOTAL, "Failed notifier sends, by notifier");
        registry.register_gauge(METRIC_VALUE, "Latest collected value, by source and metric");
        registry.register_counter(TASK_RUNS_TOTAL, "Task invocations, by task and outcome");
        registry.register_counter(TASK_SKIPPED_TOTAL, "Ticks skipped because the task was still running");
        registry.register_gauge(TASK_DURATION_SECONDS, "Duration of the last task invocation");
        registry.register_counter(STORE_FAILURES_TOTAL, "Failed metric store writes, by task");
        registry.register_gauge(API_RESPONSE_SECONDS, "Last API response time, by endpoint");
        registry.register_gauge(ALERT_WINDOW_SIZE, "Alerts in the in-memory window, by level");
        registry
    }

    /// Register a counter.
    pub fn register_counter(&self, name: impl Into<String>, help: impl Into<String>) {
        self.register(name.into(), MetricType::Counter, help.into());
    }

    /// Register a gauge.
    pub fn register_gauge(&self, name: impl Into<String>, help: impl Into<String>) {
        self.register(name.into(), MetricType::Gauge, help.into());
    }

    fn register(&self, name: String, metric_type: MetricType, help: String) {
        self.series.write().entry(name.clone()).or_default();
        self.definitions
            .write()
            .insert(name, MetricDef { metric_type, help });
    }

    /// Increment a counter.
    pub fn inc_counter(&self, name: &str, labels: &[(&str, &str)]) {
        self.add_counter(name, labels, 1);
    }

    /// Add to a counter.
    pub fn add_counter(&self, name: &str, labels: &[(&str, &str)], value: u64) {
        if let Some(cell) = self.cell(name, labels) {
            cell.fetch_add(value, Ordering::Relaxed);
        }
    }

    /// Set a gauge value.
    pub fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        if let Some(cell) = self.cell(name, labels) {
            cell.store(value.to_bits(), Ordering::Relaxed);
        }
    }

    /// Get a counter value.
    pub fn get_counter(&self, name: &str, labels: &[(&str, &str)]) -> Option<u64> {
        self.lookup(name, labels).map(|c| c.load(Ordering::Relaxed))
    }

    /// Get a gauge value.
    pub fn get_gauge(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        self.lookup(name, labels)
            .map(|g| f64::from_bits(g.load(Ordering::Relaxed)))
    }

    fn lookup(&self, name: &str, labels: &[(&str, &str)]) -> Option<Arc<AtomicU64>> {
        self.series
            .read()
            .get(name)?
            .get(&render_labels(labels))
            .cloned()
    }

    /// Series cell, created on first use. Unregistered names are ignored.
    fn cell(&self, name: &str, labels: &[(&str, &str)]) -> Option<Arc<AtomicU64>> {
        let key = render_labels(labels);
        if let Some(cell) = self.series.read().get(name)?.get(&key) {
            return Some(cell.clone());
        }

        let metric_type = self.definitions.read().get(name)?.metric_type;
        let initial = match metric_type {
            MetricType::Counter => 0,
            MetricType::Gauge => 0f64.to_bits(),
        };
        let mut series = self.series.write();
        let cell = series
            .get_mut(name)?
            .entry(key)
            .or_insert_with(|| Arc::new(AtomicU64::new(initial)));
        Some(cell.clone())
    }

    /// Export metrics in Prometheus format.
    pub fn export(&self) -> String {
        let defs = self.definitions.read();
        let series = self.series.read();

        let mut output = String::new();

        for (name, def) in defs.iter() {
            let type_str = match def.metric_type {
                MetricType::Counter => "counter",
                MetricType::Gauge => "gauge",
            };

            output.push_str(&format!("# HELP {} {}\n", name, def.help));
            output.push_str(&format!("# TYPE {} {}\n", name, type_str));

            for (labels, cell) in series.get(name).into_iter().flatten() {
                let raw = cell.load(Ordering::Relaxed);
                match def.metric_type {
                    MetricType::Counter => output.push_str(&format!("{}{} {}\n", name, labels, raw)),
                    MetricType::Gauge => {
                        output.push_str(&format!("{}{} {}\n", name, labels, f64::from_bits(raw)))
                    }
                }
            }
        }

        output
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn render_labels(labels: &[(&str, &str)]) -> SeriesKey {
    if labels.is_empty() {
        return String::new();
    }
    let body = labels
        .iter()
        .map(|(k, v)| {
            let escaped = v
                .replace('\\', "\\\\")
                .replace('"', "\\\"")
                .replace('\n', "\\n");
            format!("{}=\"{}\"", k, escaped)
        })
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{}}}", body)
}

/// Metrics endpoint handler.
pub struct MetricsEndpoint {
    registry: Arc<MetricsRegistry>,
}

impl MetricsEndpoint {
    /// Create a new metrics endpoint.
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        Self { registry }
    }

    /// Axum handler for metrics.
    pub async fn handler(&self) -> impl IntoResponse {
        let metrics = self.registry.export();
        (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            metrics,
        )
    }
}
