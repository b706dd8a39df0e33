use crate::error::DispatchError;
use crate::plugin::ChannelRegistry;
use crate::utils::mask_address;
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use vitalwatch_alert::service::TriageService;
use vitalwatch_common::cache::BoundedCache;
use vitalwatch_common::id::next_id;
use vitalwatch_common::types::{AlertRecord, Severity};
use vitalwatch_storage::{DispatchLogRow, DispatchStatus};

/// `(patient_id, batch_id, severity)` of a delivered alert.
type SendKey = (String, String, Severity);

/// Outcome of a successful [`AlertDispatcher::send_alert`].
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReceipt {
    pub alert_id: String,
    pub patient_name: String,
    pub message: String,
    pub channel_message_id: String,
    /// The alert was delivered recently and was not sent again.
    pub suppressed: bool,
}

/// Duplicate-send suppression settings.
#[derive(Debug, Clone, Copy)]
pub struct DispatchOptions {
    /// Window in which a repeat of the same alert is not re-sent. `0` disables it.
    pub silence_secs: u64,
    pub cache_capacity: usize,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            silence_secs: 0,
            cache_capacity: 1024,
        }
    }
}

/// Sends alerts to the configured destination through the configured channel.
///
/// The alert set is recomputed for every send; only the record of recent
/// deliveries (for suppression) is kept between calls.
pub struct AlertDispatcher {
    service: TriageService,
    registry: Arc<ChannelRegistry>,
    recent: Mutex<BoundedCache<SendKey, String>>,
    silence_secs: u64,
}

impl AlertDispatcher {
    pub fn new(
        service: TriageService,
        registry: Arc<ChannelRegistry>,
        options: DispatchOptions,
    ) -> Self {
        Self {
            service,
            registry,
            recent: Mutex::new(BoundedCache::new(options.cache_capacity, options.silence_secs)),
            silence_secs: options.silence_secs,
        }
    }

    /// Lock the recent-send cache, recovering from a poisoned Mutex if necessary.
    fn lock_recent(&self) -> MutexGuard<'_, BoundedCache<SendKey, String>> {
        self.recent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sends one alert.
    ///
    /// # Errors
    ///
    /// [`DispatchError::NotFound`] for an unknown or superseded alert id,
    /// [`DispatchError::Configuration`] when the destination or credentials
    /// are missing or unusable, [`DispatchError::Channel`] when the channel
    /// fails. Nothing is retried here; channels retry internally.
    pub async fn send_alert(&self, alert_id: &str) -> Result<DispatchReceipt, DispatchError> {
        let alert = self
            .service
            .find_alert(alert_id)
            .await
            .map_err(DispatchError::storage)?
            .ok_or_else(|| DispatchError::NotFound(alert_id.to_string()))?;

        let store = self.service.store();
        let destination = store
            .configured_destination_address()
            .await
            .map_err(DispatchError::storage)?
            .ok_or_else(|| {
                DispatchError::Configuration("no alert destination address configured".into())
            })?;
        let credentials = store
            .channel_credentials()
            .await
            .map_err(|e| DispatchError::Configuration(format!("{e:#}")))?
            .ok_or_else(|| {
                DispatchError::Configuration("no notification channel credentials configured".into())
            })?;

        let key: SendKey = (alert.patient_id.clone(), alert.batch_id.clone(), alert.severity);
        if self.silence_secs > 0 {
            let previous = self.lock_recent().get(&key, Utc::now());
            if let Some(message_id) = previous {
                tracing::info!(
                    alert_id = %alert.alert_id,
                    patient_id = %alert.patient_id,
                    silence_secs = self.silence_secs,
                    "Alert delivered recently, suppressing resend"
                );
                self.log_attempt(
                    &alert,
                    &destination,
                    &credentials.channel_type,
                    DispatchStatus::Suppressed,
                    Some(message_id.clone()),
                    None,
                )
                .await;
                return Ok(receipt(alert, message_id, true));
            }
        }

        let channel = self
            .registry
            .create_channel(&credentials.channel_type, &credentials.config)
            .map_err(|e| DispatchError::Configuration(format!("{e:#}")))?;

        match channel.send(&alert.message, &destination).await {
            Ok(sent) => {
                tracing::info!(
                    alert_id = %alert.alert_id,
                    patient_id = %alert.patient_id,
                    severity = %alert.severity,
                    channel = channel.channel_type(),
                    to = %mask_address(&destination),
                    message_id = %sent.id,
                    "Alert sent"
                );
                self.log_attempt(
                    &alert,
                    &destination,
                    channel.channel_type(),
                    DispatchStatus::Sent,
                    Some(sent.id.clone()),
                    None,
                )
                .await;
                if self.silence_secs > 0 {
                    let mut recent = self.lock_recent();
                    recent.insert(key, sent.id.clone(), Utc::now());
                    tracing::debug!(cached = recent.len(), "Recorded delivery for suppression");
                }
                Ok(receipt(alert, sent.id, false))
            }
            Err(e) => {
                let reason = format!("{e:#}");
                tracing::error!(
                    alert_id = %alert.alert_id,
                    channel = channel.channel_type(),
                    error = %reason,
                    "Alert send failed"
                );
                self.log_attempt(
                    &alert,
                    &destination,
                    channel.channel_type(),
                    DispatchStatus::Failed,
                    None,
                    Some(reason.clone()),
                )
                .await;
                Err(DispatchError::Channel(reason))
            }
        }
    }

    /// Sends each alert in order, one at a time. Failures are logged and
    /// skipped; returns how many were sent.
    pub async fn send_all_alerts(&self, alert_ids: &[String]) -> usize {
        let mut sent = 0;
        for alert_id in alert_ids {
            match self.send_alert(alert_id).await {
                Ok(_) => sent += 1,
                Err(e) => {
                    tracing::warn!(alert_id = %alert_id, error = %e, "Skipping alert in bulk send");
                }
            }
        }
        tracing::info!(requested = alert_ids.len(), sent, "Bulk alert send finished");
        sent
    }

    async fn log_attempt(
        &self,
        alert: &AlertRecord,
        destination: &str,
        channel_type: &str,
        status: DispatchStatus,
        channel_message_id: Option<String>,
        error: Option<String>,
    ) {
        let row = DispatchLogRow {
            id: next_id(),
            alert_id: alert.alert_id.clone(),
            patient_id: alert.patient_id.clone(),
            batch_id: alert.batch_id.clone(),
            severity: alert.severity,
            destination: destination.to_string(),
            channel_type: channel_type.to_string(),
            status,
            channel_message_id,
            error,
            created_at: Utc::now(),
        };
        if let Err(e) = self.service.store().record_dispatch(&row).await {
            tracing::warn!(alert_id = %alert.alert_id, error = %e, "Failed to record dispatch attempt");
        }
    }
}

fn receipt(alert: AlertRecord, channel_message_id: String, suppressed: bool) -> DispatchReceipt {
    DispatchReceipt {
        alert_id: alert.alert_id,
        patient_name: alert.patient_name,
        message: alert.message,
        channel_message_id,
        suppressed,
    }
}
