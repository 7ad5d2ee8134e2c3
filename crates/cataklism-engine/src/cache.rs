//! Latest-snapshot cache.

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::snapshot::{cache_key, Snapshot};

/// Holds the most recent snapshot per source, with a TTL.
///
/// Freshness is measured between snapshot timestamps, so an entry older than
/// the TTL is never returned as a baseline.
pub struct LatestCache {
    ttl: Duration,
    entries: DashMap<String, Snapshot>,
}

impl LatestCache {
    /// Create a new cache.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store `snapshot` as the latest for its source and return the entry it
    /// replaced, if that entry is still fresh.
    ///
    /// Read and write happen under the key's shard lock, so concurrent
    /// writers for one source never observe each other's half-updates. A
    /// snapshot that is not newer than the cached one is ignored.
    pub fn replace(&self, snapshot: &Snapshot) -> Option<Snapshot> {
        match self.entries.entry(snapshot.cache_key()) {
            Entry::Vacant(slot) => {
                slot.insert(snapshot.clone());
                None
            }
            Entry::Occupied(mut slot) => {
                if slot.get().timestamp() >= snapshot.timestamp() {
                    debug!(
                        source = snapshot.source(),
                        "Ignoring snapshot not newer than cached entry"
                    );
                    return None;
                }
                let previous = slot.insert(snapshot.clone());
                self.is_fresh(&previous, snapshot.timestamp())
                    .then_some(previous)
            }
        }
    }

    /// Latest snapshot for `source`, if still fresh at `now`.
    pub fn get(&self, source: &str, now: DateTime<Utc>) -> Option<Snapshot> {
        self.entries
            .get(&cache_key(source))
            .filter(|entry| self.is_fresh(entry.value(), now))
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_fresh(&self, snapshot: &Snapshot, now: DateTime<Utc>) -> bool {
        now - snapshot.timestamp() < self.ttl
    }
}
