//! Notifier implementations (Email relay, Discord, Telegram, Webhook).

#[cfg(test)]
#[path = "alert_channels_tests.rs"]
mod tests;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use cataklism_config::{DiscordConfig, EmailConfig, NotifiersConfig, TelegramConfig, WebhookConfig};

use crate::alerts::{level_color, level_emoji, AlertEvent, Notifier};
use crate::error::MonitorError;

/// Build every configured and enabled notifier.
pub fn notifiers_from_config(config: &NotifiersConfig) -> Vec<Arc<dyn Notifier>> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();

    if let Some(email) = config.email.as_ref().filter(|c| c.enabled) {
        info!("Adding email notifier for {} recipients", email.to.len());
        notifiers.push(Arc::new(EmailNotifier::new(email.clone())));
    }
    if let Some(discord) = config.discord.as_ref().filter(|c| c.enabled) {
        info!("Adding Discord notifier");
        notifiers.push(Arc::new(DiscordNotifier::new(discord.clone())));
    }
    if let Some(telegram) = config.telegram.as_ref().filter(|c| c.enabled) {
        info!("Adding Telegram notifier");
        notifiers.push(Arc::new(TelegramNotifier::new(telegram.clone())));
    }
    if let Some(webhook) = config.webhook.as_ref().filter(|c| c.enabled) {
        info!("Adding webhook notifier");
        notifiers.push(Arc::new(WebhookNotifier::new(webhook.clone())));
    }

    notifiers
}

async fn ensure_success(notifier: &str, response: reqwest::Response) -> Result<(), MonitorError> {
    if response.status().is_success() {
        debug!("{} alert sent successfully", notifier);
        return Ok(());
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(MonitorError::notifier(
        notifier,
        format!("HTTP {}: {}", status, body),
    ))
}

fn request_failed(notifier: &str, e: reqwest::Error) -> MonitorError {
    MonitorError::notifier(notifier, format!("request failed: {}", e))
}

/// Email sent through an HTTP mail relay.
pub struct EmailNotifier {
    config: EmailConfig,
    client: reqwest::Client,
}

impl EmailNotifier {
    /// Create a new email notifier.
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Subject line for an alert.
    pub fn subject(event: &AlertEvent) -> String {
        format!("[Cataklism] {}: {}", event.level, event.title)
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, event: &AlertEvent) -> Result<(), MonitorError> {
        let payload = serde_json::json!({
            "from": self.config.from,
            "to": self.config.to,
            "subject": Self::subject(event),
            "text": event.format_text(),
        });

        let mut request = self.client.post(&self.config.relay_url).json(&payload);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| request_failed(self.name(), e))?;
        ensure_success(self.name(), response).await
    }
}

/// Discord webhook notifier.
pub struct DiscordNotifier {
    config: DiscordConfig,
    client: reqwest::Client,
}

impl DiscordNotifier {
    /// Create a new Discord notifier.
    pub fn new(config: DiscordConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn name(&self) -> &str {
        "discord"
    }

    async fn send(&self, event: &AlertEvent) -> Result<(), MonitorError> {
        let payload = serde_json::json!({
            "embeds": [{
                "title": format!("{} {}", level_emoji(event.level), event.title),
                "description": event.message,
                "color": level_color(event.level),
                "timestamp": event.timestamp.to_rfc3339(),
                "fields": [
                    { "name": "Level", "value": event.level.to_string(), "inline": true },
                    { "name": "Metric", "value": event.metric, "inline": true },
                    { "name": "Value", "value": format!("{:.2}", event.value), "inline": true },
                    { "name": "Threshold", "value": format!("{:.2}", event.threshold), "inline": true },
                ],
                "footer": { "text": event.source },
            }]
        });

        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| request_failed(self.name(), e))?;
        ensure_success(self.name(), response).await
    }
}

/// Telegram bot notifier.
pub struct TelegramNotifier {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramNotifier {
    /// Create a new Telegram notifier.
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, event: &AlertEvent) -> Result<(), MonitorError> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        );

        let payload = serde_json::json!({
            "chat_id": self.config.chat_id,
            "text": event.format_markdown(),
            "parse_mode": "Markdown"
        });

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| request_failed(self.name(), e))?;
        ensure_success(self.name(), response).await
    }
}

/// Generic JSON webhook notifier. Posts the event as-is.
pub struct WebhookNotifier {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Create a new webhook notifier.
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, event: &AlertEvent) -> Result<(), MonitorError> {
        let mut request = self.client.post(&self.config.url).json(event);
        for (key, value) in &self.config.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| request_failed(self.name(), e))?;
        ensure_success(self.name(), response).await
    }
}
