/// Errors raised by the triage store.
///
/// The [`crate::TriageStore`] trait returns `anyhow::Result`; these variants
/// are what ends up inside it, so callers can `downcast_ref` when they need
/// to tell a missing row from a database failure.
///
/// # Examples
///
/// ```rust
/// use vitalwatch_storage::error::StorageError;
///
/// let err = StorageError::NotFound {
///     entity: "batch",
///     id: "42".to_string(),
/// };
/// assert!(err.to_string().contains("batch"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A required record was not found in the database.
    #[error("Storage: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    /// An underlying SQLite error.
    #[error("Storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failure (payload and settings columns).
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
