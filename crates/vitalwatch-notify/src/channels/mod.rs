pub mod sms;
pub mod webhook;

use crate::error::{NotifyError, Result};
use crate::utils::{truncate_string, MAX_BODY_LENGTH};
use serde_json::Value;
use std::time::Duration;

pub(crate) const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub(crate) const MAX_ATTEMPTS_LIMIT: u32 = 10;
const BASE_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_MS: u64 = 5_000;

pub(crate) fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

pub(crate) fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Rejects `max_attempts` outside `1..=MAX_ATTEMPTS_LIMIT`.
pub(crate) fn check_max_attempts(service: &str, max_attempts: u32) -> anyhow::Result<()> {
    if max_attempts == 0 || max_attempts > MAX_ATTEMPTS_LIMIT {
        anyhow::bail!(
            "Invalid {service} config: max_attempts must be between 1 and {MAX_ATTEMPTS_LIMIT}"
        );
    }
    Ok(())
}

/// Delay before retry number `attempt + 1`: 100ms doubling, capped at 5s.
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(BASE_BACKOFF_MS.saturating_mul(factor).min(MAX_BACKOFF_MS))
}

pub(crate) fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()?)
}

/// POSTs `payload` to `url`, retrying with exponential backoff until a 2xx
/// response or `max_attempts` tries. Returns the successful response body.
pub(crate) async fn post_json_with_retry(
    client: &reqwest::Client,
    service: &str,
    url: &str,
    bearer: Option<&str>,
    payload: &Value,
    max_attempts: u32,
) -> Result<String> {
    let max_attempts = max_attempts.clamp(1, MAX_ATTEMPTS_LIMIT);
    let mut last_err = None;

    for attempt in 0..max_attempts {
        let mut request = client.post(url).json(payload);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(resp) => {
                let status = resp.status();
                let body = match resp.text().await {
                    Ok(text) => truncate_string(&text, MAX_BODY_LENGTH),
                    Err(e) => format!("[Failed to read response body: {e}]"),
                };
                if status.is_success() {
                    return Ok(body);
                }
                tracing::warn!(
                    service,
                    attempt = attempt + 1,
                    status = %status,
                    "Channel returned non-success status"
                );
                last_err = Some(NotifyError::ApiError {
                    service: service.to_string(),
                    status: status.as_u16(),
                    body,
                });
            }
            Err(e) => {
                tracing::warn!(service, attempt = attempt + 1, error = %e, "Channel request failed");
                last_err = Some(NotifyError::HttpError(e));
            }
        }

        if attempt + 1 < max_attempts {
            tokio::time::sleep(backoff_delay(attempt)).await;
        }
    }

    let err = last_err.unwrap_or_else(|| NotifyError::InvalidConfig("max_attempts is zero".into()));
    tracing::error!(service, attempts = max_attempts, error = %err, "Channel send gave up");
    Err(err)
}
