//! Store error types.

use thiserror::Error;

/// Errors surfaced by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed record does not exist.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A does-not-exist precondition failed.
    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    /// A conditional write lost its condition (e.g. status changed).
    #[error("Condition failed for {key}: {message}")]
    ConditionFailed { key: String, message: String },

    /// An optimistic version check lost the race.
    #[error("Concurrency conflict for {key}: expected version {expected}, found {actual}")]
    ConcurrencyConflict { key: String, expected: u64, actual: u64 },

    /// Throttling or a transient outage; safe to retry with backoff.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Record (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Non-transient database error.
    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    /// Returns true if the operation may be retried with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::Unavailable(e.to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

/// Convenience alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;
