//! Alert level, pipeline and notifier configuration types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Alert severity level, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    /// Informational.
    Info,
    /// Warning.
    Warning,
    /// Critical.
    Critical,
    /// Emergency.
    Emergency,
}

impl AlertLevel {
    /// All levels in ascending order.
    pub const ALL: [AlertLevel; 4] = [
        AlertLevel::Info,
        AlertLevel::Warning,
        AlertLevel::Critical,
        AlertLevel::Emergency,
    ];

    /// Lowercase name, as stored and exported.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Info => "info",
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
            AlertLevel::Emergency => "emergency",
        }
    }

    /// Numeric rank used for range queries.
    pub fn rank(&self) -> u8 {
        match self {
            AlertLevel::Info => 0,
            AlertLevel::Warning => 1,
            AlertLevel::Critical => 2,
            AlertLevel::Emergency => 3,
        }
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertLevel::Info => write!(f, "INFO"),
            AlertLevel::Warning => write!(f, "WARNING"),
            AlertLevel::Critical => write!(f, "CRITICAL"),
            AlertLevel::Emergency => write!(f, "EMERGENCY"),
        }
    }
}

impl FromStr for AlertLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(AlertLevel::Info),
            "warning" => Ok(AlertLevel::Warning),
            "critical" => Ok(AlertLevel::Critical),
            "emergency" => Ok(AlertLevel::Emergency),
            other => Err(format!("unknown alert level '{}'", other)),
        }
    }
}

/// Alert pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Events below this level are recorded but never dispatched.
    #[serde(default = "default_min_dispatch_level")]
    pub min_dispatch_level: AlertLevel,

    /// Horizon of the in-memory alert window.
    #[serde(default = "default_window_hours")]
    pub window_hours: u64,

    /// Suppress dispatch of identical events inside this window. Off when unset.
    #[serde(default)]
    pub dedup_window_secs: Option<u64>,

    /// Upper bound on a single notifier send.
    #[serde(default = "default_notify_timeout")]
    pub notify_timeout_secs: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            min_dispatch_level: default_min_dispatch_level(),
            window_hours: default_window_hours(),
            dedup_window_secs: None,
            notify_timeout_secs: default_notify_timeout(),
        }
    }
}

fn default_min_dispatch_level() -> AlertLevel {
    AlertLevel::Critical
}

fn default_window_hours() -> u64 {
    24
}

fn default_notify_timeout() -> u64 {
    10
}

/// Notifier channels. A channel is used only when present and enabled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifiersConfig {
    pub email: Option<EmailConfig>,
    pub discord: Option<DiscordConfig>,
    pub telegram: Option<TelegramConfig>,
    pub webhook: Option<WebhookConfig>,
}

/// Email delivered through an HTTP mail relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Relay endpoint accepting `{from, to, subject, text}` JSON.
    pub relay_url: String,
    /// From address.
    pub from: String,
    /// To addresses.
    #[serde(default)]
    pub to: Vec<String>,
    /// Bearer token for the relay.
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Discord webhook configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub enabled: bool,
    pub webhook_url: String,
}

/// Telegram bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    pub bot_token: String,
    pub chat_id: String,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".to_string()
}

/// Generic JSON webhook configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub enabled: bool,
    pub url: String,
    /// Extra request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}
