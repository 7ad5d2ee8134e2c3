//! Immutable metric snapshots.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single observed field value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Flag(bool),
    Number(f64),
}

impl MetricValue {
    /// Numeric view of the value. Flags read as `1.0` or `0.0`.
    pub fn as_f64(&self) -> f64 {
        match self {
            MetricValue::Flag(true) => 1.0,
            MetricValue::Flag(false) => 0.0,
            MetricValue::Number(n) => *n,
        }
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Number(v)
    }
}

impl From<bool> for MetricValue {
    fn from(v: bool) -> Self {
        MetricValue::Flag(v)
    }
}

/// Cache key under which the latest snapshot of `source` is kept.
pub fn cache_key(source: &str) -> String {
    format!("latest:{}", source)
}

/// A timestamped set of named metric values from one source.
///
/// Snapshots are never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    source: String,
    timestamp: DateTime<Utc>,
    fields: BTreeMap<String, MetricValue>,
}

impl Snapshot {
    /// Create a snapshot from a field map.
    pub fn new(
        source: impl Into<String>,
        timestamp: DateTime<Utc>,
        fields: BTreeMap<String, MetricValue>,
    ) -> Self {
        Self {
            source: source.into(),
            timestamp,
            fields,
        }
    }

    /// Start building a snapshot.
    pub fn builder(source: impl Into<String>, timestamp: DateTime<Utc>) -> SnapshotBuilder {
        SnapshotBuilder {
            source: source.into(),
            timestamp,
            fields: BTreeMap::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn fields(&self) -> &BTreeMap<String, MetricValue> {
        &self.fields
    }

    /// Raw value of a field.
    pub fn value(&self, name: &str) -> Option<MetricValue> {
        self.fields.get(name).copied()
    }

    /// Numeric value of a field.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.value(name).map(|v| v.as_f64())
    }

    pub fn cache_key(&self) -> String {
        cache_key(&self.source)
    }
}

/// Builder for [`Snapshot`].
pub struct SnapshotBuilder {
    source: String,
    timestamp: DateTime<Utc>,
    fields: BTreeMap<String, MetricValue>,
}

impl SnapshotBuilder {
    /// Add a field.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> Snapshot {
        Snapshot::new(self.source, self.timestamp, self.fields)
    }
}
