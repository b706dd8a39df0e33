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

/// SMS delivery through an HTTP gateway.
///
/// Each message is POSTed as `{"to", "message"}` (plus `"from"` when a
/// sender is configured) with the API key as a bearer token.
pub struct SmsChannel {
    client: reqwest::Client,
    gateway_url: String,
    api_key: String,
    sender: Option<String>,
    max_attempts: u32,
}

impl SmsChannel {
    pub fn new(cfg: SmsConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(cfg.timeout_secs)?,
            gateway_url: cfg.gateway_url,
            api_key: cfg.api_key,
            sender: cfg.sender,
            max_attempts: cfg.max_attempts,
        })
    }
}

#[async_trait]
impl NotificationChannel for SmsChannel {
    async fn send(&self, message: &str, to: &str) -> Result<SendReceipt> {
        let mut payload = serde_json::json!({
            "to": to,
            "message": message,
        });
        if let Some(sender) = &self.sender {
            payload["from"] = Value::String(sender.clone());
        }

        let body = post_json_with_retry(
            &self.client,
            "sms",
            &self.gateway_url,
            Some(&self.api_key),
            &payload,
            self.max_attempts,
        )
        .await?;

        let id = extract_message_id(&body).unwrap_or_else(|| {
            tracing::debug!("SMS gateway response carried no message id, generating one");
            format!("sms-{}", next_id())
        });
        Ok(SendReceipt { id })
    }

    fn channel_type(&self) -> &str {
        "sms"
    }
}

// Plugin

#[derive(Debug, Clone, Deserialize)]
pub struct SmsConfig {
    pub gateway_url: String,
    pub api_key: String,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn parse_config(config: &Value) -> Result<SmsConfig> {
    let cfg: SmsConfig = serde_json::from_value(config.clone())
        .map_err(|e| anyhow::anyhow!("Invalid sms config: {e}"))?;
    if cfg.gateway_url.trim().is_empty() {
        anyhow::bail!("Invalid sms config: gateway_url is empty");
    }
    if cfg.api_key.trim().is_empty() {
        anyhow::bail!("Invalid sms config: api_key is empty");
    }
    check_max_attempts("sms", cfg.max_attempts)?;
    Ok(cfg)
}

pub struct SmsPlugin;

impl ChannelPlugin for SmsPlugin {
    fn name(&self) -> &str {
        "sms"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        parse_config(config).map(|_| ())
    }

    fn create_channel(&self, config: &Value) -> Result<Box<dyn NotificationChannel>> {
        let cfg = parse_config(config)?;
        Ok(Box::new(SmsChannel::new(cfg)?))
    }
}
