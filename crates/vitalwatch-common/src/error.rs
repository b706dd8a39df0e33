/// Errors raised while validating loosely typed telemetry at the ingestion
/// boundary.
///
/// A `ParseError` never aborts a whole batch: callers log it and skip the
/// offending row or variable.
///
/// # Examples
///
/// ```rust
/// use vitalwatch_common::error::ParseError;
///
/// let err = ParseError::MissingField("patientId");
/// assert!(err.to_string().contains("patientId"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// A required field was absent or empty.
    #[error("Parse: missing required field '{0}'")]
    MissingField(&'static str),

    /// A field was present but its value could not be interpreted.
    #[error("Parse: invalid value for '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    /// An embedded JSON document (e.g. a string-encoded `rawData`) was malformed.
    #[error("Parse: malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl ParseError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience `Result` alias for ingestion parsing.
pub type Result<T> = std::result::Result<T, ParseError>;
