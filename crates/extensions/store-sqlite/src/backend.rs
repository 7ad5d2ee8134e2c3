//! SQLite metric store and alert log.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;
use tokio_rusqlite::Connection;
use tracing::debug;

use cataklism_engine::{
    AlertEvent, AlertId, AlertLevel, AlertLog, MetricStore, MetricValue, Snapshot, StoreError,
    StoredAlert,
};

use crate::schema::init_schema;

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;

fn unavailable(e: tokio_rusqlite::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn to_us(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

fn from_us(us: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_micros(us)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {}", us)))
}

/// Snapshot row before conversion.
struct SnapshotRow {
    id: i64,
    source: String,
    ts_us: i64,
}

/// Field row before conversion.
struct FieldRow {
    snapshot_id: i64,
    name: String,
    value: Option<f64>,
    is_flag: bool,
}

/// Alert row before conversion.
struct AlertRow {
    id: i64,
    level: String,
    title: String,
    message: String,
    metric: String,
    value: Option<f64>,
    threshold: Option<f64>,
    source: String,
    ts_us: i64,
}

impl AlertRow {
    fn into_stored(self) -> Result<StoredAlert, StoreError> {
        let level: AlertLevel = self.level.parse().map_err(StoreError::Corrupt)?;
        Ok(StoredAlert {
            id: AlertId(self.id),
            event: AlertEvent::new(
                level,
                self.title,
                self.message,
                self.metric,
                self.value.unwrap_or(f64::NAN),
                self.threshold.unwrap_or(f64::NAN),
            )
            .with_source(self.source)
            .at(from_us(self.ts_us)?),
        })
    }
}

/// SQLite-backed [`MetricStore`] and [`AlertLog`].
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Create a new in-memory database.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(unavailable)?;
        Self::init(conn).await
    }

    /// Open or create a file-backed database.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Unavailable(format!("failed to create {}: {}", parent.display(), e)))?;
        }
        let conn = Connection::open(&path).await.map_err(unavailable)?;
        debug!("Opened metric store at {}", path.display());
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| Ok(init_schema(conn)?))
            .await
            .map_err(unavailable)?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl MetricStore for SqliteStore {
    async fn append_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let source = snapshot.source().to_string();
        let ts_us = to_us(snapshot.timestamp());
        let fields: Vec<(String, MetricValue)> = snapshot
            .fields()
            .iter()
            .map(|(name, value)| (name.clone(), *value))
            .collect();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO snapshots (source, ts_us) VALUES (?1, ?2)",
                    params![source, ts_us],
                )?;
                let snapshot_id = tx.last_insert_rowid();

                for (name, value) in fields {
                    let is_flag = matches!(value, MetricValue::Flag(_));
                    tx.execute(
                        "INSERT INTO snapshot_fields (snapshot_id, name, value, is_flag)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![snapshot_id, name, value.as_f64(), is_flag],
                    )?;
                }

                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(unavailable)
    }

    async fn snapshots_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Snapshot>, StoreError> {
        let (lo, hi) = (to_us(from), to_us(to));
        let (rows, fields) = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, source, ts_us FROM snapshots
                     WHERE ts_us >= ?1 AND ts_us < ?2
                     ORDER BY ts_us, id",
                )?;
                let rows = stmt
                    .query_map(params![lo, hi], |row| {
                        Ok(SnapshotRow {
                            id: row.get(0)?,
                            source: row.get(1)?,
                            ts_us: row.get(2)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                let mut stmt = conn.prepare(
                    "SELECT f.snapshot_id, f.name, f.value, f.is_flag
                     FROM snapshot_fields f JOIN snapshots s ON s.id = f.snapshot_id
                     WHERE s.ts_us >= ?1 AND s.ts_us < ?2",
                )?;
                let fields = stmt
                    .query_map(params![lo, hi], |row| {
                        Ok(FieldRow {
                            snapshot_id: row.get(0)?,
                            name: row.get(1)?,
                            value: row.get(2)?,
                            is_flag: row.get(3)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                Ok((rows, fields))
            })
            .await
            .map_err(unavailable)?;

        let mut by_snapshot: BTreeMap<i64, BTreeMap<String, MetricValue>> = BTreeMap::new();
        for field in fields {
            // SQLite stores NaN as NULL.
            let value = match (field.is_flag, field.value) {
                (true, Some(v)) => MetricValue::Flag(v != 0.0),
                (true, None) => {
                    return Err(StoreError::Corrupt(format!(
                        "flag '{}' of snapshot {} has no value",
                        field.name, field.snapshot_id
                    )));
                }
                (false, v) => MetricValue::Number(v.unwrap_or(f64::NAN)),
            };
            by_snapshot
                .entry(field.snapshot_id)
                .or_default()
                .insert(field.name, value);
        }

        rows.into_iter()
            .map(|row| {
                let fields = by_snapshot.remove(&row.id).unwrap_or_default();
                Ok(Snapshot::new(row.source, from_us(row.ts_us)?, fields))
            })
            .collect()
    }

    async fn prune_snapshots(&self, before: DateTime<Utc>) -> Result<usize, StoreError> {
        let before_us = to_us(before);
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM snapshot_fields WHERE snapshot_id IN
                     (SELECT id FROM snapshots WHERE ts_us < ?1)",
                    [before_us],
                )?;
                let removed = tx.execute("DELETE FROM snapshots WHERE ts_us < ?1", [before_us])?;
                tx.commit()?;
                Ok(removed)
            })
            .await
            .map_err(unavailable)
    }
}

#[async_trait]
impl AlertLog for SqliteStore {
    async fn append_alert(&self, event: &AlertEvent) -> Result<AlertId, StoreError> {
        let event = event.clone();
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO alerts (level, level_rank, title, message, metric, value, threshold, source, ts_us)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        event.level.as_str(),
                        event.level.rank(),
                        event.title,
                        event.message,
                        event.metric,
                        event.value,
                        event.threshold,
                        event.source,
                        to_us(event.timestamp),
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(unavailable)?;
        Ok(AlertId(id))
    }

    async fn alerts_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        min_level: AlertLevel,
    ) -> Result<Vec<StoredAlert>, StoreError> {
        let (lo, hi) = (to_us(from), to_us(to));
        let min_rank = min_level.rank();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, level, title, message, metric, value, threshold, source, ts_us
                     FROM alerts
                     WHERE ts_us >= ?1 AND ts_us < ?2 AND level_rank >= ?3
                     ORDER BY ts_us, id",
                )?;
                let rows = stmt
                    .query_map(params![lo, hi, min_rank], |row| {
                        Ok(AlertRow {
                            id: row.get(0)?,
                            level: row.get(1)?,
                            title: row.get(2)?,
                            message: row.get(3)?,
                            metric: row.get(4)?,
                            value: row.get(5)?,
                            threshold: row.get(6)?,
                            source: row.get(7)?,
                            ts_us: row.get(8)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(unavailable)?;

        rows.into_iter().map(AlertRow::into_stored).collect()
    }
}
