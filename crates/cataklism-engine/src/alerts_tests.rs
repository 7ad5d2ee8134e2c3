//! Tests for alert types.

use super::*;
use crate::error::FetchError;
use chrono::TimeZone;

fn sample() -> AlertEvent {
    AlertEvent::new(
        AlertLevel::Critical,
        "Significant TVL Drop",
        "total_value_locked dropped by 21.0%",
        "tvl_drop",
        21.0,
        20.0,
    )
    .with_source("protocol")
    .at(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
}

#[test]
fn test_alert_new() {
    let event = AlertEvent::new(AlertLevel::Warning, "Title", "Message", "gas_price", 120.0, 100.0);
    assert_eq!(event.level, AlertLevel::Warning);
    assert_eq!(event.source, MONITOR_SOURCE);
    assert_eq!(event.metric, "gas_price");
}

#[test]
fn test_alert_format_text() {
    let text = sample().format_text();
    assert!(text.starts_with("[CRITICAL] 2024-03-01 12:00:00 UTC - Significant TVL Drop"));
    assert!(text.contains("tvl_drop = 21.00 (threshold 20.00)"));
    assert!(text.contains("Source: protocol"));
}

#[test]
fn test_alert_format_markdown() {
    let md = sample().format_markdown();
    assert!(md.contains("\u{1f6a8}"));
    assert!(md.contains("**Significant TVL Drop**"));
    assert!(md.contains("_Source: protocol_"));
}

#[test]
fn test_level_emoji_and_color() {
    assert_eq!(level_emoji(AlertLevel::Warning), "\u{26a0}\u{fe0f}");
    assert_eq!(level_emoji(AlertLevel::Emergency), "\u{1f525}");
    assert_eq!(level_color(AlertLevel::Info), 0x36a64f);
    assert_eq!(level_color(AlertLevel::Emergency), 0x800000);
}

#[test]
fn test_collection_failed_event() {
    let err = MonitorError::from(FetchError::Timeout);
    let event = AlertEvent::collection_failed("protocol", &err);
    assert_eq!(event.level, AlertLevel::Warning);
    assert_eq!(event.metric, "collection_protocol");
    assert!(event.message.contains("timed out"));
}

#[test]
fn test_dedup_key() {
    let a = sample();
    let mut b = sample();
    b.value = 35.0;
    assert_eq!(a.dedup_key(), b.dedup_key());

    b.level = AlertLevel::Emergency;
    assert_ne!(a.dedup_key(), b.dedup_key());
}

#[test]
fn test_alert_serde() {
    let json = serde_json::to_value(sample()).unwrap();
    assert_eq!(json["level"], "critical");
    assert_eq!(json["metric"], "tvl_drop");
}
