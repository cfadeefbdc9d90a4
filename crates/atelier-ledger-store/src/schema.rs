//! Database schema definitions and column families.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Per-user balance records, keyed by `user_id`.
    pub const BALANCES: &str = "balances";

    /// Ledger transactions, keyed by `transaction_id` (ULID).
    pub const TRANSACTIONS: &str = "transactions";

    /// Index: transactions by user, keyed by `user_id || transaction_id`.
    /// Value is empty (index only).
    pub const TRANSACTIONS_BY_USER: &str = "transactions_by_user";

    /// Applied attempt markers for idempotency, keyed by
    /// `kind || attempt_id`.
    pub const ATTEMPTS: &str = "attempts";

    /// Open settlement records, keyed by `attempt_id` (ULID, so records
    /// iterate oldest first).
    pub const SETTLEMENTS: &str = "settlements";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::BALANCES,
        cf::TRANSACTIONS,
        cf::TRANSACTIONS_BY_USER,
        cf::ATTEMPTS,
        cf::SETTLEMENTS,
    ]
}
