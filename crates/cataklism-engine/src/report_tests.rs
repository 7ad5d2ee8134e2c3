use super::*;
use crate::alerts::AlertEvent;
use crate::store::MemoryStore;
use chrono::{Datelike, TimeZone, Weekday};
use tempfile::TempDir;

fn day_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
}

fn tvl_at(minutes: i64, value: f64) -> Snapshot {
    Snapshot::builder("protocol", day_start() + Duration::minutes(minutes))
        .field("total_value_locked", value)
        .build()
}

#[test]
fn test_period_parse_and_display() {
    assert_eq!("Daily".parse::<ReportPeriod>(), Ok(ReportPeriod::Daily));
    assert_eq!("weekly".parse::<ReportPeriod>(), Ok(ReportPeriod::Weekly));
    assert!("monthly".parse::<ReportPeriod>().is_err());
    assert_eq!(ReportPeriod::Weekly.to_string(), "weekly");
}

#[test]
fn test_cron_expr() {
    assert_eq!(ReportPeriod::Daily.cron_expr("Sun"), "0 0 0 * * *");
    assert_eq!(ReportPeriod::Weekly.cron_expr("sunday"), "0 0 0 * * Sun");
    assert_eq!(ReportPeriod::Weekly.cron_expr("MON"), "0 0 0 * * Mon");
}

#[test]
fn test_summarize_buckets() {
    let snapshots = vec![
        tvl_at(0, 100.0),
        tvl_at(30, 300.0),
        tvl_at(59, 200.0),
        tvl_at(125, 50.0),
        tvl_at(24 * 60, 999.0),
    ];

    let series = summarize(&snapshots, day_start(), day_start() + Duration::days(1), Duration::hours(1));
    let buckets = &series["protocol"]["total_value_locked"];
    assert_eq!(buckets.len(), 2);

    let first = &buckets[0];
    assert_eq!(first.start, day_start());
    assert_eq!(first.count, 3);
    assert_eq!(first.min, 100.0);
    assert_eq!(first.max, 300.0);
    assert_eq!(first.mean, 200.0);
    assert_eq!(first.first, 100.0);
    assert_eq!(first.last, 200.0);

    assert_eq!(buckets[1].start, day_start() + Duration::hours(2));
    assert_eq!(buckets[1].count, 1);
}

#[test]
fn test_summarize_skips_non_finite() {
    let snapshots = vec![tvl_at(0, f64::NAN), tvl_at(1, 10.0)];
    let series = summarize(&snapshots, day_start(), day_start() + Duration::days(1), Duration::hours(1));
    let bucket = &series["protocol"]["total_value_locked"][0];
    assert_eq!(bucket.count, 1);
    assert_eq!(bucket.mean, 10.0);
}

#[tokio::test]
async fn test_generate_and_write_daily() {
    let store = Arc::new(MemoryStore::new());
    for s in [tvl_at(10, 1.0), tvl_at(70, 2.0), tvl_at(-10, 5.0)] {
        store.append_snapshot(&s).await.unwrap();
    }
    let alert = AlertEvent::new(AlertLevel::Critical, "t", "m", "tvl_drop", 21.0, 20.0)
        .at(day_start() + Duration::hours(3));
    store.append_alert(&alert).await.unwrap();

    let dir = TempDir::new().unwrap();
    let generator = ReportGenerator::new(store.clone(), store.clone(), dir.path().join("reports"));
    let end = day_start() + Duration::days(1);

    let report = generator.generate(ReportPeriod::Daily, end).await.unwrap();
    assert_eq!(report.from, day_start());
    assert_eq!(report.snapshot_count, 2);
    assert_eq!(report.alert_count, 1);
    assert_eq!(report.alerts_by_level[&AlertLevel::Critical], 1);
    assert_eq!(report.alerts_by_level[&AlertLevel::Warning], 0);

    let path = generator.write(&report).await.unwrap();
    assert!(path.ends_with("reports/daily_report_20240502.json"));

    let written: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(written["period"], "daily");
    assert_eq!(written["alerts_by_level"]["critical"], 1);
    assert_eq!(written["series"]["protocol"]["total_value_locked"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_weekly_buckets_by_day() {
    let store = Arc::new(MemoryStore::new());
    for day in 0..7 {
        store.append_snapshot(&tvl_at(day * 24 * 60 + 5, day as f64)).await.unwrap();
    }
    let generator = ReportGenerator::new(store.clone(), store.clone(), "unused");

    let report = generator
        .generate(ReportPeriod::Weekly, day_start() + Duration::days(7))
        .await
        .unwrap();
    assert_eq!(report.series["protocol"]["total_value_locked"].len(), 7);
}

#[test]
fn test_schedule_boundaries() {
    let daily = ReportSchedule::new(ReportPeriod::Daily, "Sun", Duration::seconds(60)).unwrap();
    let after = Utc.with_ymd_and_hms(2024, 5, 1, 13, 45, 0).unwrap();
    assert_eq!(
        daily.next_after(after),
        Some(Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap())
    );

    let weekly = ReportSchedule::new(ReportPeriod::Weekly, "Sun", Duration::seconds(60)).unwrap();
    let next = weekly.next_after(after).unwrap();
    assert_eq!(next.weekday(), Weekday::Sun);
    assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 5, 0, 0, 0).unwrap());
}

#[test]
fn test_boundary_not_repeated() {
    let daily = ReportSchedule::new(ReportPeriod::Daily, "Sun", Duration::seconds(60)).unwrap();
    let midnight = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
    assert_eq!(daily.next_after(midnight), Some(midnight + Duration::days(1)));
}

#[test]
fn test_late_wakeup() {
    let daily = ReportSchedule::new(ReportPeriod::Daily, "Sun", Duration::seconds(60)).unwrap();
    let boundary = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
    assert!(!daily.is_late(boundary, boundary + Duration::seconds(60)));
    assert!(daily.is_late(boundary, boundary + Duration::seconds(61)));
}
