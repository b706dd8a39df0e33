/// Errors raised by notification channels.
///
/// Channels surface these through `anyhow::Result`; the dispatcher only
/// needs the one-line message.
///
/// # Examples
///
/// ```rust
/// use vitalwatch_notify::error::NotifyError;
///
/// let err = NotifyError::InvalidConfig("missing gateway_url".to_string());
/// assert!(err.to_string().contains("gateway_url"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Channel configuration is missing a required field or contains an invalid value.
    #[error("Notify: invalid channel configuration: {0}")]
    InvalidConfig(String),

    /// The channel type is not registered in the plugin registry.
    #[error("Notify: unknown channel type '{0}'")]
    UnknownChannelType(String),

    /// An HTTP request to an external notification endpoint failed.
    #[error("Notify: HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Notify: JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The external API returned a non-success response.
    #[error("Notify: API error from {service}: status={status}, body={body}")]
    ApiError {
        service: String,
        status: u16,
        body: String,
    },
}

/// Convenience `Result` alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;

/// Failure of a single alert dispatch.
///
/// The `Display` text is what API callers see, so it stays to one line.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No current alert carries this id.
    #[error("Alert not found: {0}")]
    NotFound(String),

    /// Destination address or channel credentials are absent or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The external channel rejected or failed the send.
    #[error("Channel error: {0}")]
    Channel(String),

    /// The store could not be read.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl DispatchError {
    pub(crate) fn storage(err: anyhow::Error) -> Self {
        DispatchError::Storage(format!("{err:#}"))
    }
}
