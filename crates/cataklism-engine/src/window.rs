//! Bounded in-memory window of recent alerts.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::alerts::{AlertEvent, AlertLevel};

/// Recent alerts within a time horizon.
pub struct AlertWindow {
    horizon: Duration,
    entries: Mutex<VecDeque<AlertEvent>>,
}

impl AlertWindow {
    /// Create a new window.
    pub fn new(horizon: Duration) -> Self {
        Self {
            horizon,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub fn horizon(&self) -> Duration {
        self.horizon
    }

    pub fn add(&self, event: AlertEvent) {
        self.entries.lock().push_back(event);
    }

    /// Drop entries at or before `now - horizon`. Returns how many were removed.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.horizon;
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e.timestamp > cutoff);
        before - entries.len()
    }

    /// Count of entries per level. Every level is present.
    pub fn counts_by_level(&self) -> BTreeMap<AlertLevel, usize> {
        let mut counts: BTreeMap<AlertLevel, usize> =
            AlertLevel::ALL.iter().map(|l| (*l, 0)).collect();
        for event in self.entries.lock().iter() {
            *counts.entry(event.level).or_default() += 1;
        }
        counts
    }

    /// Copy of the current entries, oldest first.
    pub fn entries(&self) -> Vec<AlertEvent> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
