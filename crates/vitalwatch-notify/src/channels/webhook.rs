use crate::channels::{
    build_client, check_max_attempts, default_max_attempts, default_timeout_secs,
    post_json_with_retry,
};
use crate::plugin::ChannelPlugin;
use crate::utils::extract_message_id;
use crate::{NotificationChannel, SendReceipt};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use vitalwatch_common::id::next_id;

/// Generic JSON webhook. The destination address travels in the body as
/// `to`; the receiving service decides how to route it.
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    max_attempts: u32,
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn send(&self, message: &str, to: &str) -> Result<SendReceipt> {
        let payload = serde_json::json!({
            "to": to,
            "message": message,
            "sent_at": chrono::Utc::now().to_rfc3339(),
        });

        let body = post_json_with_retry(
            &self.client,
            "webhook",
            &self.url,
            self.token.as_deref(),
            &payload,
            self.max_attempts,
        )
        .await?;

        let id = extract_message_id(&body).unwrap_or_else(|| format!("webhook-{}", next_id()));
        Ok(SendReceipt { id })
    }

    fn channel_type(&self) -> &str {
        "webhook"
    }
}

// Plugin

#[derive(Debug, Clone, Deserialize)]
struct WebhookConfig {
    url: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
}

fn parse_config(config: &Value) -> Result<WebhookConfig> {
    let cfg: WebhookConfig = serde_json::from_value(config.clone())
        .map_err(|e| anyhow::anyhow!("Invalid webhook config: {e}"))?;
    if !(cfg.url.starts_with("http://") || cfg.url.starts_with("https://")) {
        anyhow::bail!("Invalid webhook config: url must be http(s)");
    }
    check_max_attempts("webhook", cfg.max_attempts)?;
    Ok(cfg)
}

pub struct WebhookPlugin;

impl ChannelPlugin for WebhookPlugin {
    fn name(&self) -> &str {
        "webhook"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        parse_config(config).map(|_| ())
    }

    fn create_channel(&self, config: &Value) -> Result<Box<dyn NotificationChannel>> {
        let cfg = parse_config(config)?;
        Ok(Box::new(WebhookChannel {
            client: build_client(cfg.timeout_secs)?,
            url: cfg.url,
            token: cfg.token,
            max_attempts: cfg.max_attempts,
        }))
    }
}
