//! Alert types and the notifier trait.

#[cfg(test)]
#[path = "alerts_tests.rs"]
mod tests;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use cataklism_config::AlertLevel;

use crate::error::MonitorError;

/// Source name used for events raised by the monitor itself.
pub const MONITOR_SOURCE: &str = "monitor";

/// Get emoji for a level.
pub fn level_emoji(level: AlertLevel) -> &'static str {
    match level {
        AlertLevel::Info => "\u{2139}\u{fe0f}",
        AlertLevel::Warning => "\u{26a0}\u{fe0f}",
        AlertLevel::Critical => "\u{1f6a8}",
        AlertLevel::Emergency => "\u{1f525}",
    }
}

/// Embed color for Discord.
pub fn level_color(level: AlertLevel) -> u32 {
    match level {
        AlertLevel::Info => 0x36a64f,
        AlertLevel::Warning => 0xf0ad4e,
        AlertLevel::Critical => 0xd9534f,
        AlertLevel::Emergency => 0x800000,
    }
}

/// Identifier assigned by the durable alert log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AlertId(pub i64);

impl std::fmt::Display for AlertId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single alert occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub level: AlertLevel,
    pub title: String,
    pub message: String,
    /// Rule or check that raised the event.
    pub metric: String,
    /// Observed value, or the change magnitude for percent rules.
    pub value: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
    /// Origin of the event, a snapshot source or the monitor itself.
    pub source: String,
}

impl AlertEvent {
    /// Create a new alert raised now by the monitor.
    pub fn new(
        level: AlertLevel,
        title: impl Into<String>,
        message: impl Into<String>,
        metric: impl Into<String>,
        value: f64,
        threshold: f64,
    ) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
            metric: metric.into(),
            value,
            threshold,
            timestamp: Utc::now(),
            source: MONITOR_SOURCE.to_string(),
        }
    }

    /// Set source.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Set timestamp.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Warning raised when a scheduled task invocation fails.
    pub fn collection_failed(task: &str, error: &MonitorError) -> Self {
        Self::new(
            AlertLevel::Warning,
            "Metrics Collection Failed",
            format!("Failed to run {}: {}", task, error),
            format!("collection_{}", task),
            0.0,
            1.0,
        )
    }

    /// Dedup identity: events with the same key describe the same condition.
    pub fn dedup_key(&self) -> (String, String, AlertLevel) {
        (self.source.clone(), self.metric.clone(), self.level)
    }

    /// Format for text output.
    pub fn format_text(&self) -> String {
        format!(
            "[{}] {} - {}\n{}\nMetric: {} = {:.2} (threshold {:.2})\nSource: {}",
            self.level,
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.title,
            self.message,
            self.metric,
            self.value,
            self.threshold,
            self.source
        )
    }

    /// Format for Markdown output.
    pub fn format_markdown(&self) -> String {
        format!(
            "{} **{}** - {}\n\n{}\n\n`{}` = {:.2} (threshold {:.2})\n_Source: {}_",
            level_emoji(self.level),
            self.title,
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.message,
            self.metric,
            self.value,
            self.threshold,
            self.source
        )
    }
}

/// Delivery channel for dispatched alerts.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Notifier name.
    fn name(&self) -> &str;

    /// Deliver an alert.
    async fn send(&self, event: &AlertEvent) -> Result<(), MonitorError>;
}
