use super::*;
use cataklism_config::ThresholdsConfig;
use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
}

fn protocol(ts: DateTime<Utc>, tvl: f64) -> Snapshot {
    Snapshot::builder("protocol", ts)
        .field("total_value_locked", tvl)
        .field("average_apy", 12.0)
        .field("token_price", 2.0)
        .build()
}

fn default_evaluator() -> ThresholdEvaluator {
    ThresholdEvaluator::new(ThresholdsConfig::default().rules)
}

#[test]
fn test_tvl_drop_fires_critical() {
    let evaluator = default_evaluator();
    let prev = protocol(t0(), 1_000_000.0);
    let curr = protocol(t0() + Duration::seconds(60), 790_000.0);

    let events = evaluator.evaluate(&curr, Some(&prev));
    assert_eq!(events.len(), 1);

    let event = &events[0];
    assert_eq!(event.level, AlertLevel::Critical);
    assert_eq!(event.metric, "tvl_drop");
    assert_eq!(event.title, "Significant TVL Drop");
    assert!((event.value - 21.0).abs() < 1e-9);
    assert_eq!(event.threshold, 20.0);
    assert_eq!(event.source, "protocol");
    assert_eq!(event.timestamp, curr.timestamp());
}

#[test]
fn test_drop_exactly_at_limit_does_not_fire() {
    let evaluator = default_evaluator();
    let prev = protocol(t0(), 1_000_000.0);

    let at_limit = protocol(t0() + Duration::seconds(60), 800_000.0);
    assert!(evaluator.evaluate(&at_limit, Some(&prev)).is_empty());

    let past_limit = protocol(t0() + Duration::seconds(60), 799_999.0);
    assert_eq!(evaluator.evaluate(&past_limit, Some(&prev)).len(), 1);
}

#[test]
fn test_delta_rules_need_baseline() {
    let evaluator = default_evaluator();
    let curr = protocol(t0(), 1.0);
    assert!(evaluator.evaluate(&curr, None).is_empty());
}

#[test]
fn test_baseline_from_other_source_ignored() {
    let evaluator = default_evaluator();
    let prev = Snapshot::builder("other", t0())
        .field("total_value_locked", 1_000_000.0)
        .build();
    let curr = protocol(t0() + Duration::seconds(60), 100.0);
    assert!(evaluator.evaluate(&curr, Some(&prev)).is_empty());
}

#[test]
fn test_baseline_not_older_ignored() {
    let evaluator = default_evaluator();
    let prev = protocol(t0(), 1_000_000.0);
    let curr = protocol(t0(), 100.0);
    assert!(evaluator.evaluate(&curr, Some(&prev)).is_empty());

    let newer = protocol(t0() + Duration::seconds(5), 1_000_000.0);
    assert!(evaluator.evaluate(&curr, Some(&newer)).is_empty());
}

#[test]
fn test_zero_baseline_skipped() {
    let evaluator = default_evaluator();
    let prev = protocol(t0(), 0.0);
    let curr = protocol(t0() + Duration::seconds(60), 0.0);
    assert!(evaluator.evaluate(&curr, Some(&prev)).is_empty());
}

#[test]
fn test_absolute_over_without_baseline() {
    let evaluator = default_evaluator();
    let snapshot = Snapshot::builder("gas:ethereum", t0())
        .field("gas_price_gwei", 120.0)
        .build();

    let events = evaluator.evaluate(&snapshot, None);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].level, AlertLevel::Warning);
    assert_eq!(events[0].title, "High Gas Prices");
    assert_eq!(events[0].value, 120.0);
    assert_eq!(events[0].threshold, 100.0);
    assert_eq!(events[0].source, "gas:ethereum");
    assert!(events[0].message.contains("gas:ethereum"));
}

#[test]
fn test_absolute_under() {
    let evaluator = ThresholdEvaluator::new(vec![ThresholdRule::absolute(
        "network_down",
        "network_health",
        Direction::Under,
        1.0,
        AlertLevel::Critical,
    )]);

    let down = Snapshot::builder("protocol", t0()).field("network_health", false).build();
    let up = Snapshot::builder("protocol", t0()).field("network_health", true).build();

    let events = evaluator.evaluate(&down, None);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].title, "Low network health");
    assert!(evaluator.evaluate(&up, None).is_empty());
}

#[test]
fn test_percent_rise() {
    let evaluator = ThresholdEvaluator::new(vec![ThresholdRule::percent_rise(
        "gas_spike",
        "gas_price_gwei",
        50.0,
        AlertLevel::Info,
    )]);
    let prev = Snapshot::builder("gas:ethereum", t0()).field("gas_price_gwei", 20.0).build();
    let curr = Snapshot::builder("gas:ethereum", t0() + Duration::seconds(180))
        .field("gas_price_gwei", 40.0)
        .build();

    let events = evaluator.evaluate(&curr, Some(&prev));
    assert_eq!(events.len(), 1);
    assert!((events[0].value - 100.0).abs() < 1e-9);
    assert!(events[0].message.contains("rose by 100.0%"));
}

#[test]
fn test_escalation_tiers() {
    let evaluator = ThresholdEvaluator::new(vec![
        ThresholdRule::percent_drop("tvl_drop", "total_value_locked", 20.0, AlertLevel::Warning)
            .with_escalation(40.0, AlertLevel::Critical)
            .with_escalation(60.0, AlertLevel::Emergency),
    ]);
    let prev = protocol(t0(), 1000.0);
    let level_at = |tvl: f64| {
        let curr = protocol(t0() + Duration::seconds(60), tvl);
        evaluator.evaluate(&curr, Some(&prev))[0].level
    };

    assert_eq!(level_at(750.0), AlertLevel::Warning);
    assert_eq!(level_at(600.0), AlertLevel::Critical);
    assert_eq!(level_at(300.0), AlertLevel::Emergency);
}

#[test]
fn test_under_escalation_descends() {
    let evaluator = ThresholdEvaluator::new(vec![
        ThresholdRule::absolute("low_stakers", "total_stakers", Direction::Under, 100.0, AlertLevel::Warning)
            .with_escalation(50.0, AlertLevel::Critical),
    ]);
    let level_at = |stakers: f64| {
        let s = Snapshot::builder("protocol", t0()).field("total_stakers", stakers).build();
        evaluator.evaluate(&s, None)[0].level
    };

    assert_eq!(level_at(80.0), AlertLevel::Warning);
    assert_eq!(level_at(50.0), AlertLevel::Critical);
}

#[test]
fn test_events_follow_rule_order() {
    let evaluator = default_evaluator();
    let prev = Snapshot::builder("protocol", t0())
        .field("total_value_locked", 1000.0)
        .field("average_apy", 10.0)
        .field("token_price", 4.0)
        .build();
    let curr = Snapshot::builder("protocol", t0() + Duration::seconds(60))
        .field("total_value_locked", 500.0)
        .field("average_apy", 2.0)
        .field("token_price", 1.0)
        .field("gas_price_gwei", 300.0)
        .build();

    let metrics: Vec<_> = evaluator
        .evaluate(&curr, Some(&prev))
        .into_iter()
        .map(|e| e.metric)
        .collect();
    assert_eq!(metrics, vec!["tvl_drop", "apy_drop", "token_price_drop", "gas_price"]);
}

#[test]
fn test_evaluation_is_deterministic() {
    let evaluator = default_evaluator();
    let prev = protocol(t0(), 1_000_000.0);
    let curr = protocol(t0() + Duration::seconds(60), 500_000.0);

    let first = evaluator.evaluate(&curr, Some(&prev));
    let second = evaluator.evaluate(&curr, Some(&prev));
    assert_eq!(first, second);
}

#[test]
fn test_nan_never_fires() {
    let evaluator = default_evaluator();
    let snapshot = Snapshot::builder("gas:ethereum", t0())
        .field("gas_price_gwei", f64::NAN)
        .build();
    assert!(evaluator.evaluate(&snapshot, None).is_empty());
}

/// Margin around the exact boundary, well above float rounding in the change.
const EPS: f64 = 1e-6;

fn fires(rule: ThresholdRule, prev: f64, curr: f64) -> bool {
    let evaluator = ThresholdEvaluator::new(vec![rule]);
    let before = protocol(t0(), prev);
    let after = protocol(t0() + Duration::seconds(60), curr);
    !evaluator.evaluate(&after, Some(&before)).is_empty()
}

#[test]
fn test_drop_boundary_table() {
    let cases = [
        (1_000_000.0, 20.0),
        (0.003_17, 12.5),
        (7.77, 0.5),
        (98_765_432_109.0, 33.333),
        (42.0, 99.0),
        (1.0e-3, 1.0),
    ];
    for (prev, p) in cases {
        let curr = prev * (1.0 - p / 100.0);
        assert!(
            fires(ThresholdRule::percent_drop("tvl_drop", "total_value_locked", p - EPS, AlertLevel::Critical), prev, curr),
            "drop of {}% from {} should exceed limit {}",
            p, prev, p - EPS
        );
        assert!(
            !fires(ThresholdRule::percent_drop("tvl_drop", "total_value_locked", p + EPS, AlertLevel::Critical), prev, curr),
            "drop of {}% from {} should stay under limit {}",
            p, prev, p + EPS
        );
    }
}

proptest! {
    #[test]
    fn percent_drop_boundary(prev in 1.0e-3f64..1.0e12, p in 0.5f64..95.0) {
        let curr = prev * (1.0 - p / 100.0);
        let below = ThresholdRule::percent_drop("tvl_drop", "total_value_locked", p - EPS, AlertLevel::Critical);
        let above = ThresholdRule::percent_drop("tvl_drop", "total_value_locked", p + EPS, AlertLevel::Critical);
        prop_assert!(fires(below, prev, curr));
        prop_assert!(!fires(above, prev, curr));
    }

    #[test]
    fn percent_rise_boundary(prev in 1.0e-3f64..1.0e12, p in 0.5f64..500.0) {
        let curr = prev * (1.0 + p / 100.0);
        let below = ThresholdRule::percent_rise("tvl_spike", "total_value_locked", p - EPS, AlertLevel::Warning);
        let above = ThresholdRule::percent_rise("tvl_spike", "total_value_locked", p + EPS, AlertLevel::Warning);
        prop_assert!(fires(below, prev, curr));
        prop_assert!(!fires(above, prev, curr));
    }
}
