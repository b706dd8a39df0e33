//! Persistence for telemetry batches, runtime settings and dispatch history.
//!
//! The default implementation ([`engine::SqliteTriageStore`]) keeps
//! everything in a single SQLite database in WAL mode.

pub mod engine;
pub mod error;
mod schema;


use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vitalwatch_common::types::{BatchContext, NewTelemetryRecord, Severity, TelemetryRecord};

/// Settings key holding the address alerts are delivered to.
pub const DESTINATION_ADDRESS_KEY: &str = "alert_destination_address";
/// Settings key holding the JSON-encoded [`ChannelCredentials`].
pub const CHANNEL_CREDENTIALS_KEY: &str = "channel_credentials";

/// Credentials for the external notification channel.
///
/// `channel_type` selects the channel plugin; `config` is handed to it
/// verbatim.
///
/// # Examples
///
/// ```
/// use vitalwatch_storage::ChannelCredentials;
///
/// let creds: ChannelCredentials = serde_json::from_str(
///     r#"{"channel_type":"sms","config":{"gateway_url":"https://sms.example.com","api_key":"k"}}"#,
/// ).unwrap();
/// assert_eq!(creds.channel_type, "sms");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelCredentials {
    pub channel_type: String,
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    Sent,
    Failed,
    Suppressed,
}

impl std::fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchStatus::Sent => write!(f, "sent"),
            DispatchStatus::Failed => write!(f, "failed"),
            DispatchStatus::Suppressed => write!(f, "suppressed"),
        }
    }
}

impl std::str::FromStr for DispatchStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "sent" => Ok(DispatchStatus::Sent),
            "failed" => Ok(DispatchStatus::Failed),
            "suppressed" => Ok(DispatchStatus::Suppressed),
            _ => Err(format!("unknown dispatch status: {s}")),
        }
    }
}

/// One dispatch attempt, keyed for lookup by `(patient_id, batch_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchLogRow {
    pub id: String,
    pub alert_id: String,
    pub patient_id: String,
    pub batch_id: String,
    pub severity: Severity,
    pub destination: String,
    pub channel_type: String,
    pub status: DispatchStatus,
    pub channel_message_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Persistence backend for the triage service.
///
/// Implementations must be `Send + Sync`: one store is shared by every
/// request handler.
#[async_trait]
pub trait TriageStore: Send + Sync {
    /// Creates an empty batch stamped with the current time.
    async fn create_batch(&self, name: &str) -> Result<BatchContext>;

    /// Appends validated rows to an existing batch. Returns the number stored.
    async fn insert_records(&self, batch_id: &str, records: &[NewTelemetryRecord])
        -> Result<usize>;

    /// Batches, newest first.
    async fn list_batches(&self, limit: usize, offset: usize) -> Result<Vec<BatchContext>>;

    async fn most_recent_batch_id(&self) -> Result<Option<String>>;

    /// Rows of one batch, or of every batch when `batch_id` is `None`, in
    /// insertion order.
    async fn list_telemetry_records(&self, batch_id: Option<&str>) -> Result<Vec<TelemetryRecord>>;

    /// The batch a stored telemetry row belongs to.
    async fn batch_id_for_record(&self, record_id: &str) -> Result<Option<String>>;

    async fn get_setting(&self, key: &str) -> Result<Option<String>>;

    async fn set_setting(&self, key: &str, value: &str) -> Result<()>;

    async fn record_dispatch(&self, row: &DispatchLogRow) -> Result<()>;

    /// Dispatch history, newest first, optionally filtered.
    async fn list_dispatches(
        &self,
        patient_id: Option<&str>,
        batch_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DispatchLogRow>>;

    /// The configured destination address, ignoring blank values.
    async fn configured_destination_address(&self) -> Result<Option<String>> {
        Ok(self
            .get_setting(DESTINATION_ADDRESS_KEY)
            .await?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()))
    }

    /// The configured channel credentials.
    ///
    /// # Errors
    ///
    /// Fails when the stored value is not valid credentials JSON.
    async fn channel_credentials(&self) -> Result<Option<ChannelCredentials>> {
        match self.get_setting(CHANNEL_CREDENTIALS_KEY).await? {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => {
                let creds = serde_json::from_str::<ChannelCredentials>(&raw)
                    .context("stored channel credentials are not valid JSON")?;
                Ok(Some(creds))
            }
        }
    }
}
