//! Durable storage traits and an in-memory implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::alerts::{AlertEvent, AlertId, AlertLevel};
use crate::error::StoreError;
use crate::snapshot::Snapshot;

/// Append-only time series of snapshots.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Append a snapshot.
    async fn append_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Snapshots with `from <= timestamp < to`, ordered by timestamp.
    async fn snapshots_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Snapshot>, StoreError>;

    /// Delete snapshots older than `before`. Returns the number removed.
    async fn prune_snapshots(&self, before: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// Append-only record of every alert event.
#[async_trait]
pub trait AlertLog: Send + Sync {
    /// Record an event and return its id.
    async fn append_alert(&self, event: &AlertEvent) -> Result<AlertId, StoreError>;

    /// Events with `from <= timestamp < to` at or above `min_level`, ordered by timestamp.
    async fn alerts_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        min_level: AlertLevel,
    ) -> Result<Vec<StoredAlert>, StoreError>;
}

/// An alert event together with its log id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAlert {
    pub id: AlertId,
    #[serde(flatten)]
    pub event: AlertEvent,
}

/// In-memory store, used for dry runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    snapshots: RwLock<Vec<Snapshot>>,
    alerts: RwLock<Vec<StoredAlert>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.read().len()
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.read().len()
    }

    /// All recorded alerts in insertion order.
    pub fn alerts(&self) -> Vec<StoredAlert> {
        self.alerts.read().clone()
    }
}

#[async_trait]
impl MetricStore for MemoryStore {
    async fn append_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.snapshots.write().push(snapshot.clone());
        Ok(())
    }

    async fn snapshots_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Snapshot>, StoreError> {
        let mut found: Vec<_> = self
            .snapshots
            .read()
            .iter()
            .filter(|s| s.timestamp() >= from && s.timestamp() < to)
            .cloned()
            .collect();
        found.sort_by_key(|s| s.timestamp());
        Ok(found)
    }

    async fn prune_snapshots(&self, before: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut snapshots = self.snapshots.write();
        let len = snapshots.len();
        snapshots.retain(|s| s.timestamp() >= before);
        Ok(len - snapshots.len())
    }
}

#[async_trait]
impl AlertLog for MemoryStore {
    async fn append_alert(&self, event: &AlertEvent) -> Result<AlertId, StoreError> {
        let mut alerts = self.alerts.write();
        let id = AlertId(alerts.len() as i64 + 1);
        alerts.push(StoredAlert {
            id,
            event: event.clone(),
        });
        Ok(id)
    }

    async fn alerts_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        min_level: AlertLevel,
    ) -> Result<Vec<StoredAlert>, StoreError> {
        let mut found: Vec<_> = self
            .alerts
            .read()
            .iter()
            .filter(|a| {
                a.event.timestamp >= from && a.event.timestamp < to && a.event.level >= min_level
            })
            .cloned()
            .collect();
        found.sort_by_key(|a| (a.event.timestamp, a.id));
        Ok(found)
    }
}
