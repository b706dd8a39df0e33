//! Alert delivery with pluggable channel support.
//!
//! The [`dispatcher::AlertDispatcher`] resolves an alert, the configured
//! destination and channel credentials, then hands the formatted message to
//! a [`NotificationChannel`] created through the [`plugin::ChannelRegistry`].
//! Built-in channels are an SMS gateway and a generic JSON webhook.

pub mod channels;
pub mod dispatcher;
pub mod error;
pub mod plugin;
pub mod utils;


use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Acknowledgement returned by the external channel for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    /// Message id assigned by the channel.
    pub id: String,
}

/// A notification channel that delivers a text message to one address
/// (a phone number for SMS, a routing key for a webhook).
///
/// Implementations are created by the corresponding [`plugin::ChannelPlugin`]
/// from the stored channel credentials.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Delivers `message` to `to`.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails after the channel's own retries.
    async fn send(&self, message: &str, to: &str) -> Result<SendReceipt>;

    /// Returns the channel type name (e.g., `"sms"`, `"webhook"`).
    fn channel_type(&self) -> &str;
}
