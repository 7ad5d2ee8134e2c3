//! Configuration validation.

use std::collections::HashSet;

use crate::error::ConfigError;
use crate::schema::{Config, Direction, RuleKind, ThresholdRule};

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_server(config, &mut result);
        Self::validate_api(config, &mut result);
        Self::validate_networks(config, &mut result);
        Self::validate_intervals(config, &mut result);
        Self::validate_rules(config, &mut result);
        Self::validate_alerts(config, &mut result);
        Self::validate_notifiers(config, &mut result);
        Self::validate_reports(config, &mut result);

        result
    }

    /// Validate and turn any error into [`ConfigError::Invalid`].
    ///
    /// Warnings are returned to the caller for logging.
    pub fn ensure_valid(config: &Config) -> Result<Vec<ValidationWarning>, ConfigError> {
        let result = Self::validate(config);
        if result.is_valid() {
            return Ok(result.warnings);
        }
        let joined = result
            .errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Err(ConfigError::Invalid(joined))
    }

    fn validate_server(config: &Config, result: &mut ValidationResult) {
        if config.server.enabled && config.server.port == 0 {
            result.add_error(ValidationError::new("server.port", "Port cannot be 0"));
        }
        if config.server.host.is_empty() {
            result.add_error(ValidationError::new("server.host", "Host cannot be empty"));
        }
    }

    fn validate_api(config: &Config, result: &mut ValidationResult) {
        Self::check_url("api.base_url", &config.api.base_url, result);
        if config.api.timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "api.timeout_secs",
                "timeout must be greater than 0",
            ));
        }
        for (i, endpoint) in config.api.health_endpoints.iter().enumerate() {
            if !endpoint.starts_with('/') {
                result.add_error(ValidationError::new(
                    format!("api.health_endpoints[{}]", i),
                    "endpoint must start with '/'",
                ));
            }
        }
    }

    fn validate_networks(config: &Config, result: &mut ValidationResult) {
        if config.networks.is_empty() {
            result.add_warning(ValidationWarning::new(
                "networks",
                "no networks configured, chain collectors are disabled",
            ));
        }
        for (name, network) in &config.networks {
            Self::check_url(&format!("networks.{}.rpc_url", name), &network.rpc_url, result);
        }
        for network in config.contracts.keys() {
            if !config.networks.contains_key(network) {
                result.add_error(ValidationError::new(
                    format!("contracts.{}", network),
                    "contracts listed for an unknown network",
                ));
            }
        }
    }

    fn validate_intervals(config: &Config, result: &mut ValidationResult) {
        let i = &config.intervals;
        let intervals = [
            ("intervals.protocol_secs", i.protocol_secs),
            ("intervals.network_secs", i.network_secs),
            ("intervals.gas_secs", i.gas_secs),
            ("intervals.api_secs", i.api_secs),
            ("intervals.contracts_secs", i.contracts_secs),
            ("intervals.alert_sweep_secs", i.alert_sweep_secs),
            ("intervals.retention_secs", i.retention_secs),
        ];
        for (path, secs) in intervals {
            if secs == 0 {
                result.add_error(ValidationError::new(path, "interval must be greater than 0"));
            }
        }

        if config.cache.ttl_secs < i.protocol_secs {
            result.add_warning(ValidationWarning::new(
                "cache.ttl_secs",
                "cache TTL is shorter than the protocol interval, delta rules will never fire",
            ));
        }
        if config.storage.failure_threshold == 0 {
            result.add_error(ValidationError::new(
                "storage.failure_threshold",
                "failure threshold must be greater than 0",
            ));
        }
    }

    fn validate_rules(config: &Config, result: &mut ValidationResult) {
        let mut names = HashSet::new();
        for (i, rule) in config.thresholds.rules.iter().enumerate() {
            let path = format!("thresholds.rules[{}]", i);
            if rule.name.is_empty() {
                result.add_error(ValidationError::new(format!("{}.name", path), "name cannot be empty"));
            } else if !names.insert(rule.name.as_str()) {
                result.add_error(ValidationError::new(
                    format!("{}.name", path),
                    format!("duplicate rule name '{}'", rule.name),
                ));
            }
            if rule.metric.is_empty() {
                result.add_error(ValidationError::new(
                    format!("{}.metric", path),
                    "metric cannot be empty",
                ));
            }
            Self::validate_rule_limit(&path, rule, result);
            Self::validate_escalations(&path, rule, result);
        }

        if config.thresholds.response_time_secs <= 0.0 {
            result.add_error(ValidationError::new(
                "thresholds.response_time_secs",
                "response time threshold must be positive",
            ));
        }
    }

    fn validate_rule_limit(path: &str, rule: &ThresholdRule, result: &mut ValidationResult) {
        if !rule.limit.is_finite() {
            result.add_error(ValidationError::new(format!("{}.limit", path), "limit must be finite"));
            return;
        }
        match rule.kind {
            RuleKind::Absolute => {
                if rule.direction.is_none() {
                    result.add_error(ValidationError::new(
                        format!("{}.direction", path),
                        "absolute rules require a direction (over|under)",
                    ));
                }
            }
            RuleKind::PercentDrop | RuleKind::PercentRise => {
                if rule.limit <= 0.0 {
                    result.add_error(ValidationError::new(
                        format!("{}.limit", path),
                        "percent limit must be positive",
                    ));
                }
                if rule.kind == RuleKind::PercentDrop && rule.limit >= 100.0 {
                    result.add_warning(ValidationWarning::new(
                        format!("{}.limit", path),
                        "a drop of 100% or more only fires on negative values",
                    ));
                }
                if rule.direction.is_some() {
                    result.add_warning(ValidationWarning::new(
                        format!("{}.direction", path),
                        "direction is ignored for percent rules",
                    ));
                }
            }
        }
    }

    fn validate_escalations(path: &str, rule: &ThresholdRule, result: &mut ValidationResult) {
        let mut prev_at = None;
        let mut prev_severity = rule.severity;
        for (j, tier) in rule.escalations.iter().enumerate() {
            let tier_path = format!("{}.escalations[{}]", path, j);
            if !tier.at.is_finite() {
                result.add_error(ValidationError::new(tier_path, "tier must be finite"));
                continue;
            }
            if !Self::tier_beyond(rule, tier.at, rule.limit, true) {
                result.add_error(ValidationError::new(
                    tier_path.clone(),
                    "tier must not be inside the firing limit",
                ));
            }
            if prev_at.is_some_and(|p| !Self::tier_beyond(rule, tier.at, p, false)) {
                result.add_error(ValidationError::new(
                    tier_path.clone(),
                    "tiers must be ordered by increasing breach magnitude",
                ));
            }
            if tier.severity < prev_severity {
                result.add_error(ValidationError::new(
                    tier_path,
                    "tier severity must not decrease",
                ));
            }
            prev_at = Some(tier.at);
            prev_severity = tier.severity;
        }
    }

    /// Escalation magnitudes share the evaluator's orientation: percent rules
    /// and `over` rules grow upward, `under` rules grow downward.
    fn tier_beyond(rule: &ThresholdRule, at: f64, reference: f64, inclusive: bool) -> bool {
        let downward = rule.kind == RuleKind::Absolute && rule.direction == Some(Direction::Under);
        match (downward, inclusive) {
            (true, true) => at <= reference,
            (true, false) => at < reference,
            (false, true) => at >= reference,
            (false, false) => at > reference,
        }
    }

    fn validate_alerts(config: &Config, result: &mut ValidationResult) {
        if config.alerts.window_hours == 0 {
            result.add_error(ValidationError::new(
                "alerts.window_hours",
                "window must be greater than 0",
            ));
        }
        if config.alerts.notify_timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "alerts.notify_timeout_secs",
                "timeout must be greater than 0",
            ));
        }
        if config.alerts.dedup_window_secs == Some(0) {
            result.add_warning(ValidationWarning::new(
                "alerts.dedup_window_secs",
                "a zero dedup window suppresses nothing",
            ));
        }
    }

    fn validate_notifiers(config: &Config, result: &mut ValidationResult) {
        let n = &config.notifiers;
        if let Some(email) = n.email.as_ref().filter(|c| c.enabled) {
            Self::check_url("notifiers.email.relay_url", &email.relay_url, result);
            if email.from.is_empty() {
                result.add_error(ValidationError::new("notifiers.email.from", "from address is required"));
            }
            if email.to.is_empty() {
                result.add_error(ValidationError::new(
                    "notifiers.email.to",
                    "at least one recipient is required",
                ));
            }
        }
        if let Some(discord) = n.discord.as_ref().filter(|c| c.enabled) {
            Self::check_url("notifiers.discord.webhook_url", &discord.webhook_url, result);
        }
        if let Some(telegram) = n.telegram.as_ref().filter(|c| c.enabled) {
            if telegram.bot_token.is_empty() {
                result.add_error(ValidationError::new(
                    "notifiers.telegram.bot_token",
                    "bot token is required",
                ));
            }
            if telegram.chat_id.is_empty() {
                result.add_error(ValidationError::new(
                    "notifiers.telegram.chat_id",
                    "chat id is required",
                ));
            }
            Self::check_url("notifiers.telegram.api_base", &telegram.api_base, result);
        }
        if let Some(webhook) = n.webhook.as_ref().filter(|c| c.enabled) {
            Self::check_url("notifiers.webhook.url", &webhook.url, result);
        }
    }

    fn validate_reports(config: &Config, result: &mut ValidationResult) {
        const DAYS: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];
        let day = config.reports.weekly_day.to_ascii_lowercase();
        if !DAYS.iter().any(|d| day.starts_with(d)) {
            result.add_error(ValidationError::new(
                "reports.weekly_day",
                format!("unknown weekday '{}'", config.reports.weekly_day),
            ));
        }
    }

    fn check_url(path: &str, value: &str, result: &mut ValidationResult) {
        if let Err(e) = url::Url::parse(value) {
            result.add_error(ValidationError::new(path, format!("invalid URL '{}': {}", value, e)));
        }
    }
}
