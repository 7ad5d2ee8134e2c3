use super::*;
use chrono::{Duration, TimeZone};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn snapshot(minutes: i64, tvl: f64) -> Snapshot {
    Snapshot::builder("protocol", t0() + Duration::minutes(minutes))
        .field("total_value_locked", tvl)
        .field("network_health", true)
        .build()
}

fn alert(level: AlertLevel, minutes: i64) -> AlertEvent {
    AlertEvent::new(level, "Significant TVL Drop", "tvl dropped", "tvl_drop", 21.0, 20.0)
        .with_source("protocol")
        .at(t0() + Duration::minutes(minutes))
}

#[tokio::test]
async fn test_snapshot_roundtrip() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let original = snapshot(0, 1_000_000.0);
    store.append_snapshot(&original).await.unwrap();

    let found = store
        .snapshots_between(t0(), t0() + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(found, vec![original]);
    assert_eq!(found[0].value("network_health"), Some(MetricValue::Flag(true)));
}

#[tokio::test]
async fn test_snapshots_range_is_half_open_and_ordered() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    for (minutes, tvl) in [(30, 3.0), (0, 1.0), (60, 4.0), (10, 2.0)] {
        store.append_snapshot(&snapshot(minutes, tvl)).await.unwrap();
    }

    let found = store
        .snapshots_between(t0(), t0() + Duration::minutes(60))
        .await
        .unwrap();
    let values: Vec<f64> = found.iter().filter_map(|s| s.get("total_value_locked")).collect();
    assert_eq!(values, vec![1.0, 2.0, 3.0]);
}

#[tokio::test]
async fn test_nan_survives_as_nan() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    store.append_snapshot(&snapshot(0, f64::NAN)).await.unwrap();

    let found = store
        .snapshots_between(t0(), t0() + Duration::hours(1))
        .await
        .unwrap();
    assert!(found[0].get("total_value_locked").unwrap().is_nan());
}

#[tokio::test]
async fn test_prune_snapshots() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    for minutes in [0, 10, 20] {
        store.append_snapshot(&snapshot(minutes, 1.0)).await.unwrap();
    }

    let removed = store.prune_snapshots(t0() + Duration::minutes(10)).await.unwrap();
    assert_eq!(removed, 1);

    let remaining = store
        .snapshots_between(t0() - Duration::days(1), t0() + Duration::days(1))
        .await
        .unwrap();
    assert_eq!(remaining.len(), 2);
    assert_eq!(remaining[0].fields().len(), 2);
}

#[tokio::test]
async fn test_alert_ids_increase() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let first = store.append_alert(&alert(AlertLevel::Warning, 0)).await.unwrap();
    let second = store.append_alert(&alert(AlertLevel::Critical, 1)).await.unwrap();
    assert!(second > first);
}

#[tokio::test]
async fn test_alerts_between_filters_level() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    store.append_alert(&alert(AlertLevel::Info, 0)).await.unwrap();
    store.append_alert(&alert(AlertLevel::Warning, 1)).await.unwrap();
    store.append_alert(&alert(AlertLevel::Emergency, 2)).await.unwrap();
    store.append_alert(&alert(AlertLevel::Critical, 90)).await.unwrap();

    let found = store
        .alerts_between(t0(), t0() + Duration::hours(1), AlertLevel::Warning)
        .await
        .unwrap();
    let levels: Vec<AlertLevel> = found.iter().map(|a| a.event.level).collect();
    assert_eq!(levels, vec![AlertLevel::Warning, AlertLevel::Emergency]);

    let event = &found[0].event;
    assert_eq!(event.metric, "tvl_drop");
    assert_eq!(event.value, 21.0);
    assert_eq!(event.threshold, 20.0);
    assert_eq!(event.source, "protocol");
    assert_eq!(event.timestamp, t0() + Duration::minutes(1));
}

#[tokio::test]
async fn test_file_store_persists_across_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("nested").join("monitor.db");

    {
        let store = SqliteStore::open(&path).await.unwrap();
        store.append_snapshot(&snapshot(0, 5.0)).await.unwrap();
        store.append_alert(&alert(AlertLevel::Critical, 0)).await.unwrap();
    }

    let store = SqliteStore::open(&path).await.unwrap();
    let snapshots = store
        .snapshots_between(t0(), t0() + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(snapshots.len(), 1);
    let alerts = store
        .alerts_between(t0(), t0() + Duration::hours(1), AlertLevel::Info)
        .await
        .unwrap();
    assert_eq!(alerts.len(), 1);
}
