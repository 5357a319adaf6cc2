//! Notification fan-out: webhook, shell command, and chat-webhook channels.

use chrono::Utc;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::checker::{CheckOutcome, Status};
use crate::error::{Result, VigilError};
use crate::store::{Store, Target};

static HTTP: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("default client")
});

/// A status-change event delivered to notification channels.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub target: String,
    pub url: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub time: String,
    pub message: String,
}

impl Event {
    pub fn new(target: &str, url: &str, status: Status, error: Option<&str>) -> Self {
        let mut message = format!("[vigil] {target} ({url}) is {status}");
        if let Some(err) = error {
            message.push_str(": ");
            message.push_str(err);
        }
        Self {
            target: target.to_string(),
            url: url.to_string(),
            status,
            old_hash: None,
            new_hash: None,
            error: error.map(str::to_string),
            time: Utc::now().to_rfc3339(),
            message,
        }
    }

    pub fn from_check(target: &Target, outcome: &CheckOutcome) -> Self {
        Self::new(
            &target.name,
            &target.url,
            outcome.status,
            outcome.error.as_deref(),
        )
    }
}

#[derive(Debug, Deserialize)]
struct WebhookConfig {
    url: String,
}

#[derive(Debug, Deserialize)]
struct CommandConfig {
    command: String,
}

#[derive(Debug, Deserialize)]
struct ChatWebhookConfig {
    webhook_url: String,
}

#[derive(Debug, Deserialize)]
struct TelegramConfig {
    bot_token: String,
    chat_id: String,
}

/// One configured delivery mechanism. Tagged variants keep the dispatch
/// exhaustive; each variant owns the fields its sender needs.
#[derive(Debug, Clone)]
pub enum Channel {
    Webhook { url: String },
    Command { command: String },
    Slack { webhook_url: String },
    Telegram { bot_token: String, chat_id: String },
    Discord { webhook_url: String },
}

impl Channel {
    /// Build a channel from its stored type name and opaque JSON config.
    pub fn parse(kind: &str, config_json: &str) -> Result<Channel> {
        let channel = match kind {
            "webhook" => {
                let cfg: WebhookConfig = serde_json::from_str(config_json)?;
                Channel::Webhook { url: cfg.url }
            }
            "command" => {
                let cfg: CommandConfig = serde_json::from_str(config_json)?;
                Channel::Command {
                    command: cfg.command,
                }
            }
            "slack" => {
                let cfg: ChatWebhookConfig = serde_json::from_str(config_json)?;
                Channel::Slack {
                    webhook_url: cfg.webhook_url,
                }
            }
            "telegram" => {
                let cfg: TelegramConfig = serde_json::from_str(config_json)?;
                Channel::Telegram {
                    bot_token: cfg.bot_token,
                    chat_id: cfg.chat_id,
                }
            }
            "discord" => {
                let cfg: ChatWebhookConfig = serde_json::from_str(config_json)?;
                Channel::Discord {
                    webhook_url: cfg.webhook_url,
                }
            }
            other => {
                return Err(VigilError::notify(format!(
                    "unknown notification type: {other}"
                )));
            }
        };
        Ok(channel)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Channel::Webhook { .. } => "webhook",
            Channel::Command { .. } => "command",
            Channel::Slack { .. } => "slack",
            Channel::Telegram { .. } => "telegram",
            Channel::Discord { .. } => "discord",
        }
    }

    /// Deliver one event. Each variant reports its own failure; the caller
    /// decides whether to continue with other channels.
    pub async fn send(&self, event: &Event) -> Result<()> {
        match self {
            Channel::Webhook { url } => {
                let resp = HTTP.post(url).json(event).send().await?;
                let code = resp.status().as_u16();
                if code >= 400 {
                    return Err(VigilError::notify(format!("webhook returned {code}")));
                }
                Ok(())
            }
            Channel::Command { command } => {
                let rendered = render_command(command, event);
                let status = tokio::process::Command::new("sh")
                    .args(["-c", &rendered])
                    .status()
                    .await
                    .map_err(|e| VigilError::notify(format!("failed to run command: {e}")))?;
                if !status.success() {
                    return Err(VigilError::notify(format!("command exited with {status}")));
                }
                Ok(())
            }
            Channel::Slack { webhook_url } => {
                let payload = serde_json::json!({ "text": event.message });
                HTTP.post(webhook_url).json(&payload).send().await?;
                Ok(())
            }
            Channel::Telegram { bot_token, chat_id } => {
                let url = format!("https://api.telegram.org/bot{bot_token}/sendMessage");
                let payload = serde_json::json!({
                    "chat_id": chat_id,
                    "text": event.message,
                });
                HTTP.post(&url).json(&payload).send().await?;
                Ok(())
            }
            Channel::Discord { webhook_url } => {
                let payload = serde_json::json!({ "content": event.message });
                HTTP.post(webhook_url).json(&payload).send().await?;
                Ok(())
            }
        }
    }
}

/// Parse and deliver in one step: the boundary operation used by callers
/// that hold a raw (type, config) pair instead of a parsed channel.
pub async fn send(kind: &str, config_json: &str, event: &Event) -> Result<()> {
    Channel::parse(kind, config_json)?.send(event).await
}

/// Substitute event placeholders into a shell command template.
fn render_command(template: &str, event: &Event) -> String {
    template
        .replace("{target}", &event.target)
        .replace("{url}", &event.url)
        .replace("{status}", event.status.as_str())
        .replace("{message}", &event.message)
}

/// Send an event to every enabled channel. One channel's failure never
/// prevents delivery to the others; failures are logged and reported back.
/// Returns the number of channels that accepted the event.
pub async fn dispatch(store: &Store, event: &Event) -> usize {
    let configs = match store.list_notify_configs() {
        Ok(c) => c,
        Err(e) => {
            log::warn!("failed to load notification configs: {e}");
            return 0;
        }
    };

    let mut delivered = 0;
    for config in configs.iter().filter(|c| c.enabled) {
        let channel = match Channel::parse(&config.kind, &config.config) {
            Ok(ch) => ch,
            Err(e) => {
                log::warn!("notification '{}' has a bad config: {e}", config.name);
                continue;
            }
        };
        match channel.send(event).await {
            Ok(()) => delivered += 1,
            Err(e) => log::warn!("notification '{}' failed: {e}", config.name),
        }
    }
    delivered
}
