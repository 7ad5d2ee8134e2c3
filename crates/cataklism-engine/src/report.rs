//! Daily and weekly summary reports.

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::alerts::AlertLevel;
use crate::error::MonitorError;
use crate::snapshot::Snapshot;
use crate::store::{AlertLog, MetricStore};

/// Report period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportPeriod {
    Daily,
    Weekly,
}

impl ReportPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportPeriod::Daily => "daily",
            ReportPeriod::Weekly => "weekly",
        }
    }

    /// Length of the covered range.
    pub fn span(&self) -> Duration {
        match self {
            ReportPeriod::Daily => Duration::days(1),
            ReportPeriod::Weekly => Duration::days(7),
        }
    }

    /// Width of one aggregation bucket.
    pub fn bucket(&self) -> Duration {
        match self {
            ReportPeriod::Daily => Duration::hours(1),
            ReportPeriod::Weekly => Duration::days(1),
        }
    }

    /// Cron expression firing at the period boundary, midnight UTC.
    pub fn cron_expr(&self, weekly_day: &str) -> String {
        match self {
            ReportPeriod::Daily => "0 0 0 * * *".to_string(),
            ReportPeriod::Weekly => format!("0 0 0 * * {}", weekday_abbrev(weekly_day)),
        }
    }
}

impl std::fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReportPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Ok(ReportPeriod::Daily),
            "weekly" => Ok(ReportPeriod::Weekly),
            other => Err(format!("unknown report period '{}'", other)),
        }
    }
}

/// `sunday` or `SUN` to `Sun`.
fn weekday_abbrev(day: &str) -> String {
    let lower = day.trim().to_ascii_lowercase();
    let short: String = lower.chars().take(3).collect();
    let mut chars = short.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Aggregates of one metric inside one bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketStats {
    pub start: DateTime<Utc>,
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub first: f64,
    pub last: f64,
}

impl BucketStats {
    fn new(start: DateTime<Utc>, value: f64) -> Self {
        Self {
            start,
            count: 1,
            min: value,
            max: value,
            mean: value,
            first: value,
            last: value,
        }
    }

    fn push(&mut self, value: f64) {
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.mean += (value - self.mean) / self.count as f64;
        self.last = value;
    }
}

/// Summary of one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub period: ReportPeriod,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub snapshot_count: usize,
    /// Source, then metric, then buckets in time order.
    pub series: BTreeMap<String, BTreeMap<String, Vec<BucketStats>>>,
    pub alert_count: usize,
    pub alerts_by_level: BTreeMap<AlertLevel, usize>,
}

/// Bucket snapshots in `[from, to)` per source and metric.
///
/// Empty buckets are omitted. Non-finite values are ignored.
pub fn summarize(
    snapshots: &[Snapshot],
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    bucket: Duration,
) -> BTreeMap<String, BTreeMap<String, Vec<BucketStats>>> {
    let width = bucket.num_milliseconds().max(1);
    let mut series: BTreeMap<String, BTreeMap<String, BTreeMap<i64, BucketStats>>> = BTreeMap::new();

    for snapshot in snapshots {
        let ts = snapshot.timestamp();
        if ts < from || ts >= to {
            continue;
        }
        let index = (ts - from).num_milliseconds() / width;
        let start = from + Duration::milliseconds(index * width);

        let metrics = series.entry(snapshot.source().to_string()).or_default();
        for (name, value) in snapshot.fields() {
            let value = value.as_f64();
            if !value.is_finite() {
                continue;
            }
            metrics
                .entry(name.clone())
                .or_default()
                .entry(index)
                .and_modify(|b| b.push(value))
                .or_insert_with(|| BucketStats::new(start, value));
        }
    }

    series
        .into_iter()
        .map(|(source, metrics)| {
            let metrics = metrics
                .into_iter()
                .map(|(name, buckets)| (name, buckets.into_values().collect()))
                .collect();
            (source, metrics)
        })
        .collect()
}

/// Builds reports from the metric store and alert log.
pub struct ReportGenerator {
    store: Arc<dyn MetricStore>,
    alerts: Arc<dyn AlertLog>,
    output_dir: PathBuf,
}

impl ReportGenerator {
    /// Create a new generator writing into `output_dir`.
    pub fn new(store: Arc<dyn MetricStore>, alerts: Arc<dyn AlertLog>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            alerts,
            output_dir: output_dir.into(),
        }
    }

    /// Report for the period ending at `end`.
    pub async fn generate(&self, period: ReportPeriod, end: DateTime<Utc>) -> Result<Report, MonitorError> {
        let from = end - period.span();
        let snapshots = self.store.snapshots_between(from, end).await?;
        let alerts = self.alerts.alerts_between(from, end, AlertLevel::Info).await?;

        let mut alerts_by_level: BTreeMap<AlertLevel, usize> =
            AlertLevel::ALL.iter().map(|l| (*l, 0)).collect();
        for alert in &alerts {
            *alerts_by_level.entry(alert.event.level).or_default() += 1;
        }

        Ok(Report {
            period,
            from,
            to: end,
            generated_at: Utc::now(),
            snapshot_count: snapshots.len(),
            series: summarize(&snapshots, from, end, period.bucket()),
            alert_count: alerts.len(),
            alerts_by_level,
        })
    }

    /// Output path, e.g. `reports/daily_report_20240502.json`.
    pub fn path_for(&self, report: &Report) -> PathBuf {
        self.output_dir.join(format!(
            "{}_report_{}.json",
            report.period,
            report.to.format("%Y%m%d")
        ))
    }

    /// Write `report` as pretty JSON.
    pub async fn write(&self, report: &Report) -> Result<PathBuf, MonitorError> {
        let path = self.path_for(report);
        let body = serde_json::to_vec_pretty(report)
            .map_err(|e| MonitorError::Report(format!("failed to serialize report: {}", e)))?;
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| MonitorError::Report(format!("failed to create {}: {}", self.output_dir.display(), e)))?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| MonitorError::Report(format!("failed to write {}: {}", path.display(), e)))?;
        Ok(path)
    }

    /// Generate and write the report ending at `end`.
    pub async fn run(&self, period: ReportPeriod, end: DateTime<Utc>) -> Result<PathBuf, MonitorError> {
        let report = self.generate(period, end).await?;
        let path = self.write(&report).await?;
        info!(
            period = %period,
            snapshots = report.snapshot_count,
            alerts = report.alert_count,
            "Report written to {}",
            path.display()
        );
        Ok(path)
    }
}

/// Calendar schedule for one report period.
pub struct ReportSchedule {
    period: ReportPeriod,
    schedule: Schedule,
    late_tolerance: Duration,
}

impl ReportSchedule {
    /// Create a new schedule.
    pub fn new(period: ReportPeriod, weekly_day: &str, late_tolerance: Duration) -> Result<Self, MonitorError> {
        let expr = period.cron_expr(weekly_day);
        let schedule = Schedule::from_str(&expr)
            .map_err(|e| MonitorError::ConfigInvalid(format!("invalid report schedule '{}': {}", expr, e)))?;
        Ok(Self {
            period,
            schedule,
            late_tolerance,
        })
    }

    pub fn period(&self) -> ReportPeriod {
        self.period
    }

    /// First boundary strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// Whether waking at `now` for `boundary` is too late to count.
    pub fn is_late(&self, boundary: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - boundary > self.late_tolerance
    }
}

/// Generate reports at each boundary until `cancel` fires.
///
/// Boundaries reached after the late tolerance are logged as missed and
/// skipped. Nothing is backfilled.
pub async fn run_report_loop(
    generator: Arc<ReportGenerator>,
    schedule: ReportSchedule,
    cancel: CancellationToken,
) {
    let period = schedule.period();
    let mut last_boundary: Option<DateTime<Utc>> = None;

    loop {
        let now = Utc::now();
        let after = last_boundary.map_or(now, |b| b.max(now));
        let Some(boundary) = schedule.next_after(after) else {
            warn!(period = %period, "Report schedule has no further boundaries");
            return;
        };
        let wait = (boundary - now).to_std().unwrap_or_default();
        info!(period = %period, %boundary, "Next report scheduled");

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(wait) => {}
        }
        last_boundary = Some(boundary);

        let woke = Utc::now();
        if schedule.is_late(boundary, woke) {
            warn!(
                period = %period,
                %boundary,
                late_by_secs = (woke - boundary).num_seconds(),
                "Missed report boundary, skipping"
            );
            continue;
        }

        if let Err(e) = generator.run(period, boundary).await {
            error!(period = %period, "Report generation failed: {}", e);
        }
    }
}
