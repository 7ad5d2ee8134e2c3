//! Threshold rule configuration types.

use serde::{Deserialize, Serialize};

use super::AlertLevel;

/// How a rule compares a snapshot value against its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleKind {
    /// Compare the observed value directly.
    #[serde(rename = "absolute")]
    Absolute,
    /// Percent change against the previous snapshot, firing on decreases.
    #[serde(rename = "percent_drop", alias = "percent-drop")]
    PercentDrop,
    /// Percent change against the previous snapshot, firing on increases.
    #[serde(rename = "percent_rise", alias = "percent-rise")]
    PercentRise,
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleKind::Absolute => write!(f, "absolute"),
            RuleKind::PercentDrop => write!(f, "percent-drop"),
            RuleKind::PercentRise => write!(f, "percent-rise"),
        }
    }
}

/// Crossing direction for absolute rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Fires when the value is above the limit.
    Over,
    /// Fires when the value is below the limit.
    Under,
}

/// A severity tier reached once the breach magnitude hits `at`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    pub at: f64,
    pub severity: AlertLevel,
}

/// A single threshold rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    /// Rule name, used as the alert's metric name.
    pub name: String,
    /// Snapshot field the rule reads.
    pub metric: String,
    pub kind: RuleKind,
    /// Required for absolute rules.
    #[serde(default)]
    pub direction: Option<Direction>,
    pub limit: f64,
    #[serde(default = "default_rule_severity")]
    pub severity: AlertLevel,
    /// Alert title. Derived from the rule when unset.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub escalations: Vec<Escalation>,
}

fn default_rule_severity() -> AlertLevel {
    AlertLevel::Warning
}

impl ThresholdRule {
    /// Absolute rule crossing `limit` in `direction`.
    pub fn absolute(
        name: impl Into<String>,
        metric: impl Into<String>,
        direction: Direction,
        limit: f64,
        severity: AlertLevel,
    ) -> Self {
        Self {
            name: name.into(),
            metric: metric.into(),
            kind: RuleKind::Absolute,
            direction: Some(direction),
            limit,
            severity,
            title: None,
            escalations: Vec::new(),
        }
    }

    /// Rule firing when the value drops by more than `limit` percent.
    pub fn percent_drop(
        name: impl Into<String>,
        metric: impl Into<String>,
        limit: f64,
        severity: AlertLevel,
    ) -> Self {
        Self {
            name: name.into(),
            metric: metric.into(),
            kind: RuleKind::PercentDrop,
            direction: None,
            limit,
            severity,
            title: None,
            escalations: Vec::new(),
        }
    }

    /// Rule firing when the value rises by more than `limit` percent.
    pub fn percent_rise(
        name: impl Into<String>,
        metric: impl Into<String>,
        limit: f64,
        severity: AlertLevel,
    ) -> Self {
        Self {
            kind: RuleKind::PercentRise,
            ..Self::percent_drop(name, metric, limit, severity)
        }
    }

    /// Set the alert title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Add an escalation tier.
    pub fn with_escalation(mut self, at: f64, severity: AlertLevel) -> Self {
        self.escalations.push(Escalation { at, severity });
        self
    }

    /// Whether the rule compares against a previous snapshot.
    pub fn needs_baseline(&self) -> bool {
        !matches!(self.kind, RuleKind::Absolute)
    }
}

/// Threshold configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdsConfig {
    /// Rules in evaluation order.
    #[serde(default = "default_rules")]
    pub rules: Vec<ThresholdRule>,

    /// API responses slower than this raise a warning.
    #[serde(default = "default_response_time")]
    pub response_time_secs: f64,

    /// Latest blocks older than this raise a warning.
    #[serde(default = "default_block_age")]
    pub block_age_secs: u64,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            response_time_secs: default_response_time(),
            block_age_secs: default_block_age(),
        }
    }
}

fn default_rules() -> Vec<ThresholdRule> {
    vec![
        ThresholdRule::percent_drop("tvl_drop", "total_value_locked", 20.0, AlertLevel::Critical)
            .with_title("Significant TVL Drop"),
        ThresholdRule::percent_drop("apy_drop", "average_apy", 50.0, AlertLevel::Warning)
            .with_title("Significant APY Drop"),
        ThresholdRule::percent_drop("token_price_drop", "token_price", 30.0, AlertLevel::Warning)
            .with_title("Token Price Drop"),
        ThresholdRule::absolute(
            "gas_price",
            "gas_price_gwei",
            Direction::Over,
            100.0,
            AlertLevel::Warning,
        )
        .with_title("High Gas Prices"),
    ]
}

fn default_response_time() -> f64 {
    5.0
}

fn default_block_age() -> u64 {
    300
}
