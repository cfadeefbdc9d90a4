//! Client error types.

/// Errors that can occur when using the ledger client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an error response.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
        /// HTTP status code.
        status: u16,
    },

    /// Insufficient credits: the debit was refused.
    #[error("insufficient credits: current={current}, required={required}, deficit={deficit}")]
    InsufficientCredits {
        /// Current balance.
        current: i64,
        /// Required amount.
        required: i64,
        /// Missing credits.
        deficit: i64,
        /// Where the user can top up.
        top_up_url: Option<String>,
    },

    /// The attempt id was already settled (safe to treat the original
    /// outcome as authoritative).
    #[error("duplicate attempt: {attempt_id}")]
    DuplicateAttempt {
        /// The attempt ID.
        attempt_id: String,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
