//! Threshold evaluation.
//!
//! Evaluation is a pure function of the rule list and a pair of snapshots:
//! the same inputs always yield the same events in rule declaration order.

#[cfg(test)]
#[path = "evaluator_tests.rs"]
mod tests;

use tracing::debug;

use cataklism_config::{Direction, RuleKind, ThresholdRule};

use crate::alerts::{AlertEvent, AlertLevel};
use crate::snapshot::Snapshot;

/// A rule breach before it is turned into an event.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Breach {
    observed: f64,
    /// Observed value for absolute rules, absolute percent change otherwise.
    magnitude: f64,
}

/// Evaluates snapshots against an ordered rule list.
pub struct ThresholdEvaluator {
    rules: Vec<ThresholdRule>,
}

impl ThresholdEvaluator {
    /// Create a new evaluator.
    pub fn new(rules: Vec<ThresholdRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ThresholdRule] {
        &self.rules
    }

    /// Evaluate `current` against the rules.
    ///
    /// `previous` is ignored unless it comes from the same source and is
    /// strictly older than `current`. Delta rules are skipped without a
    /// usable baseline.
    pub fn evaluate(&self, current: &Snapshot, previous: Option<&Snapshot>) -> Vec<AlertEvent> {
        let previous = previous.filter(|p| {
            let usable = p.source() == current.source() && p.timestamp() < current.timestamp();
            if !usable {
                debug!(
                    source = current.source(),
                    "Ignoring baseline from {} at {}",
                    p.source(),
                    p.timestamp()
                );
            }
            usable
        });

        self.rules
            .iter()
            .filter_map(|rule| {
                let breach = Self::check(rule, current, previous)?;
                Some(Self::to_event(rule, breach, current))
            })
            .collect()
    }

    fn check(rule: &ThresholdRule, current: &Snapshot, previous: Option<&Snapshot>) -> Option<Breach> {
        let observed = current.get(&rule.metric)?;

        match rule.kind {
            RuleKind::Absolute => {
                let fires = match rule.direction? {
                    Direction::Over => observed > rule.limit,
                    Direction::Under => observed < rule.limit,
                };
                fires.then_some(Breach {
                    observed,
                    magnitude: observed,
                })
            }
            RuleKind::PercentDrop | RuleKind::PercentRise => {
                let baseline = previous?.get(&rule.metric)?;
                if baseline <= 0.0 {
                    return None;
                }
                let change = (observed - baseline) / baseline * 100.0;
                let fires = match rule.kind {
                    RuleKind::PercentDrop => change < -rule.limit,
                    _ => change > rule.limit,
                };
                fires.then_some(Breach {
                    observed,
                    magnitude: change.abs(),
                })
            }
        }
    }

    /// Highest severity among the base level and every reached tier.
    fn severity(rule: &ThresholdRule, magnitude: f64) -> AlertLevel {
        let downward = rule.kind == RuleKind::Absolute && rule.direction == Some(Direction::Under);
        rule.escalations
            .iter()
            .filter(|tier| {
                if downward {
                    magnitude <= tier.at
                } else {
                    magnitude >= tier.at
                }
            })
            .map(|tier| tier.severity)
            .fold(rule.severity, std::cmp::max)
    }

    fn to_event(rule: &ThresholdRule, breach: Breach, current: &Snapshot) -> AlertEvent {
        let metric_label = rule.metric.replace('_', " ");
        let (default_title, message) = match (rule.kind, rule.direction) {
            (RuleKind::PercentDrop, _) => (
                format!("{} Drop", metric_label),
                format!(
                    "{} dropped by {:.1}% to {:.2}",
                    rule.metric, breach.magnitude, breach.observed
                ),
            ),
            (RuleKind::PercentRise, _) => (
                format!("{} Rise", metric_label),
                format!(
                    "{} rose by {:.1}% to {:.2}",
                    rule.metric, breach.magnitude, breach.observed
                ),
            ),
            (RuleKind::Absolute, Some(Direction::Under)) => (
                format!("Low {}", metric_label),
                format!(
                    "{} is {:.2}, below {:.2} on {}",
                    rule.metric,
                    breach.observed,
                    rule.limit,
                    current.source()
                ),
            ),
            (RuleKind::Absolute, _) => (
                format!("High {}", metric_label),
                format!(
                    "{} is {:.2}, above {:.2} on {}",
                    rule.metric,
                    breach.observed,
                    rule.limit,
                    current.source()
                ),
            ),
        };

        AlertEvent::new(
            Self::severity(rule, breach.magnitude),
            rule.title.clone().unwrap_or(default_title),
            message,
            rule.name.clone(),
            breach.magnitude,
            rule.limit,
        )
        .with_source(current.source())
        .at(current.timestamp())
    }
}
