//! Error types for tally storage.

use tally_core::CreditError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Requested key.
        id: String,
    },

    /// A record with the same key already exists.
    #[error("{entity} already exists: {id}")]
    AlreadyExists {
        /// Kind of record.
        entity: &'static str,
        /// Conflicting key.
        id: String,
    },

    /// A spend would take the balance below zero.
    #[error("insufficient balance: balance={balance}, requested={requested}")]
    InsufficientBalance {
        /// Balance before the change.
        balance: i64,
        /// Signed amount that was requested.
        requested: i64,
    },

    /// A balance change that can never be applied.
    #[error("invalid credit change: {0}")]
    InvalidDelta(String),

    /// Duplicate event (idempotency check failed).
    #[error("duplicate event: {event_id}")]
    DuplicateEvent {
        /// The event ID that was duplicated.
        event_id: String,
    },
}

impl StoreError {
    /// Shorthand for a missing ledger.
    #[must_use]
    pub fn ledger_not_found(user_id: impl ToString) -> Self {
        Self::NotFound {
            entity: "ledger",
            id: user_id.to_string(),
        }
    }
}

impl From<CreditError> for StoreError {
    fn from(err: CreditError) -> Self {
        match err {
            CreditError::InsufficientBalance { balance, requested } => {
                Self::InsufficientBalance { balance, requested }
            }
            other => Self::InvalidDelta(other.to_string()),
        }
    }
}
