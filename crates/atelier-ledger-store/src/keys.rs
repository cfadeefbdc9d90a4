//! Key encoding utilities for `RocksDB` column families.

use atelier_ledger_core::{AttemptId, TransactionId, UserId};

/// Create a balance key from a user ID.
#[must_use]
pub fn balance_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a transaction key from a transaction ID.
#[must_use]
pub fn transaction_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.to_bytes().to_vec()
}

/// Create a user-transaction index key.
///
/// Format: `user_id (16 bytes) || transaction_id (16 bytes)`.
///
/// ULIDs are time-ordered, so a user's transactions sort chronologically
/// under their prefix.
#[must_use]
pub fn user_transaction_key(user_id: &UserId, transaction_id: &TransactionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&transaction_id.to_bytes());
    key
}

/// Create a prefix for iterating all transactions of a user.
#[must_use]
pub fn user_transactions_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Extract the transaction ID from a user-transaction index key.
///
/// # Panics
///
/// Panics if the key is not at least 32 bytes.
#[must_use]
pub fn extract_transaction_id_from_user_key(key: &[u8]) -> TransactionId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    TransactionId::from_bytes(bytes).expect("valid ULID bytes")
}

/// Create an applied-attempt marker key.
///
/// Format: `kind byte || attempt_id (16 bytes)`, where kind is `b'd'` for
/// debits and `b'r'` for refunds. Separate kinds let the same attempt carry
/// one debit and one compensating refund, but never two of either.
#[must_use]
pub fn attempt_key(kind: AttemptKind, attempt_id: &AttemptId) -> Vec<u8> {
    let mut key = Vec::with_capacity(17);
    key.push(kind as u8);
    key.extend_from_slice(&attempt_id.to_bytes());
    key
}

/// Which side of an attempt a marker records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AttemptKind {
    /// The attempt's debit was applied.
    Debit = b'd',
    /// The attempt's refund was applied.
    Refund = b'r',
}

/// Create a settlement key from an attempt ID.
#[must_use]
pub fn settlement_key(attempt_id: &AttemptId) -> Vec<u8> {
    attempt_id.to_bytes().to_vec()
}
