//! Error types for ledger storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying store failed or is unreachable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("not found")]
    NotFound,

    /// Conditional debit failed: the balance does not cover the amount.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Balance at the time of the attempted debit.
        balance: i64,
        /// Credits the debit required.
        required: i64,
    },

    /// An attempt id was submitted twice (idempotency guard).
    #[error("duplicate attempt: {attempt_id}")]
    DuplicateAttempt {
        /// The attempt id that was already applied.
        attempt_id: String,
    },
}
