//! Database schema management.

use rusqlite::Connection;
use tokio_rusqlite::Error;

/// Initialize the database schema.
pub fn init_schema(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- One row per collected snapshot
CREATE TABLE IF NOT EXISTS snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    ts_us INTEGER NOT NULL
);

-- Field values; flags are stored as 0/1 with is_flag set
CREATE TABLE IF NOT EXISTS snapshot_fields (
    snapshot_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    value REAL,
    is_flag INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (snapshot_id, name),
    FOREIGN KEY (snapshot_id) REFERENCES snapshots(id) ON DELETE CASCADE
);

-- Append-only alert log
CREATE TABLE IF NOT EXISTS alerts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    level TEXT NOT NULL,
    level_rank INTEGER NOT NULL,
    title TEXT NOT NULL,
    message TEXT NOT NULL,
    metric TEXT NOT NULL,
    value REAL,
    threshold REAL,
    source TEXT NOT NULL,
    ts_us INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_snapshots_ts ON snapshots(ts_us);
CREATE INDEX IF NOT EXISTS idx_alerts_ts ON alerts(ts_us);
CREATE INDEX IF NOT EXISTS idx_alerts_rank ON alerts(level_rank);
"#;
