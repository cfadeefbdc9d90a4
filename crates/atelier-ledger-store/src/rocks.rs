//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store`
//! trait. Balance mutations take a striped per-user lock for the whole
//! read-check-write section and commit every write of the mutation in a
//! single `WriteBatch`, which is what makes the conditional debit the
//! authoritative gate under concurrency.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use atelier_ledger_core::{
    AttemptId, Balance, LedgerTransaction, Operation, TransactionId, TransactionMetadata, UserId,
};

use crate::error::{Result, StoreError};
use crate::keys::{self, AttemptKind};
use crate::schema::{all_column_families, cf};
use crate::{Applied, PendingSettlement, Store};

/// Number of stripes for per-user serialization. Mutations for one user
/// always hash to the same stripe; collisions between users only cost
/// throughput, never correctness.
const LOCK_STRIPES: usize = 64;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    stripes: Vec<Mutex<()>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            stripes: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Unavailable(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Lock the stripe that serializes mutations for this user.
    fn user_guard(&self, user_id: &UserId) -> std::sync::MutexGuard<'_, ()> {
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&user_id.as_bytes()[..8]);
        let stripe = usize::try_from(u64::from_le_bytes(prefix) % LOCK_STRIPES as u64)
            .unwrap_or_default();
        self.stripes[stripe]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Read a balance record without provisioning. Callers that mutate must
    /// hold the user's stripe lock.
    fn read_balance(&self, user_id: &UserId) -> Result<Option<Balance>> {
        let cf = self.cf(cf::BALANCES)?;
        self.db
            .get_cf(&cf, keys::balance_key(user_id))
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Whether an attempt marker of the given kind already exists.
    fn attempt_applied(&self, kind: AttemptKind, attempt: &AttemptId) -> Result<bool> {
        let cf = self.cf(cf::ATTEMPTS)?;
        let exists = self
            .db
            .get_cf(&cf, keys::attempt_key(kind, attempt))
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .is_some();
        Ok(exists)
    }

    /// Commit a mutated balance plus its transaction row (and optional
    /// attempt marker) in one batch.
    fn commit_mutation(
        &self,
        balance: &Balance,
        transaction: &LedgerTransaction,
        attempt_marker: Option<(AttemptKind, &AttemptId)>,
    ) -> Result<()> {
        let cf_balances = self.cf(cf::BALANCES)?;
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_tx_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_balances,
            keys::balance_key(&balance.user_id),
            Self::serialize(balance)?,
        );
        batch.put_cf(
            &cf_tx,
            keys::transaction_key(&transaction.id),
            Self::serialize(transaction)?,
        );
        batch.put_cf(
            &cf_tx_by_user,
            keys::user_transaction_key(&transaction.user_id, &transaction.id),
            [], // Index entry (empty value)
        );
        if let Some((kind, attempt)) = attempt_marker {
            let cf_attempts = self.cf(cf::ATTEMPTS)?;
            batch.put_cf(&cf_attempts, keys::attempt_key(kind, attempt), []);
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Balance Operations
    // =========================================================================

    fn get_or_create_balance(&self, user_id: &UserId) -> Result<Balance> {
        if let Some(balance) = self.read_balance(user_id)? {
            return Ok(balance);
        }

        // Provision under the stripe lock so two first-touch requests
        // cannot both write a fresh record.
        let _guard = self.user_guard(user_id);
        if let Some(balance) = self.read_balance(user_id)? {
            return Ok(balance);
        }

        let balance = Balance::new(*user_id);
        let cf = self.cf(cf::BALANCES)?;
        self.db
            .put_cf(&cf, keys::balance_key(user_id), Self::serialize(&balance)?)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        tracing::debug!(user_id = %user_id, "Provisioned zero balance");
        Ok(balance)
    }

    fn get_balance(&self, user_id: &UserId) -> Result<Option<Balance>> {
        self.read_balance(user_id)
    }

    fn debit(
        &self,
        user_id: &UserId,
        operation: Operation,
        metadata: TransactionMetadata,
        attempt: Option<&AttemptId>,
    ) -> Result<Applied> {
        let amount = operation.cost();
        assert!(amount > 0, "free operations never reach the store");

        let _guard = self.user_guard(user_id);

        if let Some(attempt) = attempt {
            if self.attempt_applied(AttemptKind::Debit, attempt)? {
                return Err(StoreError::DuplicateAttempt {
                    attempt_id: attempt.to_string(),
                });
            }
        }

        let mut balance = match self.read_balance(user_id)? {
            Some(balance) => balance,
            None => Balance::new(*user_id),
        };

        if balance.credits < amount {
            return Err(StoreError::InsufficientCredits {
                balance: balance.credits,
                required: amount,
            });
        }

        let balance_before = balance.credits;
        balance.credits -= amount;
        balance.lifetime_spent += amount;
        balance.updated_at = Utc::now();

        let transaction = LedgerTransaction::debit(
            *user_id,
            operation,
            balance_before,
            balance.credits,
            metadata,
        );

        self.commit_mutation(
            &balance,
            &transaction,
            attempt.map(|a| (AttemptKind::Debit, a)),
        )?;

        Ok(Applied {
            balance_before,
            balance_after: balance.credits,
            transaction_id: transaction.id,
        })
    }

    fn refund(
        &self,
        user_id: &UserId,
        operation: Operation,
        metadata: TransactionMetadata,
        attempt: Option<&AttemptId>,
    ) -> Result<Applied> {
        let amount = operation.cost();
        assert!(amount > 0, "free operations never reach the store");

        let _guard = self.user_guard(user_id);

        if let Some(attempt) = attempt {
            if self.attempt_applied(AttemptKind::Refund, attempt)? {
                return Err(StoreError::DuplicateAttempt {
                    attempt_id: attempt.to_string(),
                });
            }
        }

        let mut balance = match self.read_balance(user_id)? {
            Some(balance) => balance,
            None => Balance::new(*user_id),
        };

        let balance_before = balance.credits;
        balance.credits += amount;
        balance.lifetime_refunded += amount;
        balance.updated_at = Utc::now();

        let transaction = LedgerTransaction::refund(
            *user_id,
            operation,
            balance_before,
            balance.credits,
            metadata,
        );

        self.commit_mutation(
            &balance,
            &transaction,
            attempt.map(|a| (AttemptKind::Refund, a)),
        )?;

        Ok(Applied {
            balance_before,
            balance_after: balance.credits,
            transaction_id: transaction.id,
        })
    }

    fn grant(
        &self,
        user_id: &UserId,
        amount: i64,
        metadata: TransactionMetadata,
    ) -> Result<Applied> {
        assert!(amount > 0, "grants must carry a positive amount");

        let _guard = self.user_guard(user_id);

        let mut balance = match self.read_balance(user_id)? {
            Some(balance) => balance,
            None => Balance::new(*user_id),
        };

        let balance_before = balance.credits;
        balance.credits += amount;
        balance.updated_at = Utc::now();

        let transaction =
            LedgerTransaction::credit(*user_id, amount, balance_before, balance.credits, metadata);

        self.commit_mutation(&balance, &transaction, None)?;

        Ok(Applied {
            balance_before,
            balance_after: balance.credits,
            transaction_id: transaction.id,
        })
    }

    // =========================================================================
    // Transaction Log
    // =========================================================================

    fn get_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<LedgerTransaction>> {
        let cf = self.cf(cf::TRANSACTIONS)?;

        self.db
            .get_cf(&cf, keys::transaction_key(transaction_id))
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_transactions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerTransaction>> {
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;
        let prefix = keys::user_transactions_prefix(user_id);

        // ULID keys under the user prefix are chronological; collect the
        // prefix range and walk it backwards for newest-first.
        let iter = self.db.iterator_cf(
            &cf_by_user,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        let mut all_keys: Vec<Vec<u8>> = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Unavailable(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            all_keys.push(key.to_vec());
        }

        let mut transactions = Vec::new();
        for key in all_keys.iter().rev().skip(offset).take(limit) {
            let tx_id = keys::extract_transaction_id_from_user_key(key);
            if let Some(tx) = self.get_transaction(&tx_id)? {
                transactions.push(tx);
            }
        }

        Ok(transactions)
    }

    // =========================================================================
    // Settlement Records
    // =========================================================================

    fn put_settlement(&self, settlement: &PendingSettlement) -> Result<()> {
        let cf = self.cf(cf::SETTLEMENTS)?;
        self.db
            .put_cf(
                &cf,
                keys::settlement_key(&settlement.attempt_id),
                Self::serialize(settlement)?,
            )
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    fn resolve_settlement(&self, attempt_id: &AttemptId) -> Result<()> {
        let cf = self.cf(cf::SETTLEMENTS)?;
        self.db
            .delete_cf(&cf, keys::settlement_key(attempt_id))
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    fn list_open_settlements(&self, cutoff: DateTime<Utc>) -> Result<Vec<PendingSettlement>> {
        let cf = self.cf(cf::SETTLEMENTS)?;

        let mut open = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Unavailable(e.to_string()))?;
            let settlement: PendingSettlement = Self::deserialize(&value)?;
            if settlement.started_at <= cutoff {
                open.push(settlement);
            }
        }

        Ok(open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::TempDir;

    use atelier_ledger_core::TransactionType;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn seed(store: &RocksStore, user_id: &UserId, amount: i64) {
        store
            .grant(
                user_id,
                amount,
                TransactionMetadata::grant("test", None),
            )
            .unwrap();
    }

    #[test]
    fn balance_provisioned_lazily_at_zero() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();

        assert!(store.get_balance(&user_id).unwrap().is_none());

        let balance = store.get_or_create_balance(&user_id).unwrap();
        assert_eq!(balance.credits, 0);

        // Idempotent: a second call returns the same record.
        let again = store.get_or_create_balance(&user_id).unwrap();
        assert_eq!(again.created_at, balance.created_at);
    }

    #[test]
    fn debit_and_refund_roundtrip() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        seed(&store, &user_id, 100);

        let debit = store
            .debit(
                &user_id,
                Operation::ImageUltra,
                TransactionMetadata::None,
                None,
            )
            .unwrap();
        assert_eq!(debit.balance_before, 100);
        assert_eq!(debit.balance_after, 65);

        let refund = store
            .refund(
                &user_id,
                Operation::ImageUltra,
                TransactionMetadata::refund("render failed", None),
                None,
            )
            .unwrap();
        assert_eq!(refund.balance_before, 65);
        assert_eq!(refund.balance_after, 100);

        // Two rows, equal amounts, opposite effect.
        let transactions = store.list_transactions(&user_id, 10, 0).unwrap();
        assert_eq!(transactions.len(), 3); // grant + debit + refund
        assert_eq!(transactions[0].tx_type, TransactionType::Refund);
        assert_eq!(transactions[1].tx_type, TransactionType::Debit);
        assert_eq!(transactions[0].amount, transactions[1].amount);
        assert_eq!(
            transactions[0].signed_amount(),
            -transactions[1].signed_amount()
        );
    }

    #[test]
    fn debit_fails_without_mutation_when_underfunded() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        seed(&store, &user_id, 3);

        let result = store.debit(
            &user_id,
            Operation::MusicGenerateV5,
            TransactionMetadata::None,
            None,
        );
        assert!(matches!(
            result,
            Err(StoreError::InsufficientCredits {
                balance: 3,
                required: 6
            })
        ));

        // No mutation, no transaction row.
        assert_eq!(store.get_balance(&user_id).unwrap().unwrap().credits, 3);
        assert_eq!(store.list_transactions(&user_id, 10, 0).unwrap().len(), 1);
    }

    #[test]
    fn debit_against_missing_balance_fails() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();

        let result = store.debit(
            &user_id,
            Operation::ChatAdvanced,
            TransactionMetadata::None,
            None,
        );
        assert!(matches!(
            result,
            Err(StoreError::InsufficientCredits {
                balance: 0,
                required: 1
            })
        ));
    }

    #[test]
    fn lifetime_counters_track_flows() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        seed(&store, &user_id, 50);

        store
            .debit(
                &user_id,
                Operation::VideoGen4_5s,
                TransactionMetadata::None,
                None,
            )
            .unwrap();
        store
            .refund(
                &user_id,
                Operation::VideoGen4_5s,
                TransactionMetadata::refund("timeout", None),
                None,
            )
            .unwrap();

        let balance = store.get_balance(&user_id).unwrap().unwrap();
        assert_eq!(balance.credits, 50);
        assert_eq!(balance.lifetime_spent, 20);
        assert_eq!(balance.lifetime_refunded, 20);
    }

    #[test]
    fn duplicate_debit_attempt_is_refused() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        seed(&store, &user_id, 100);
        let attempt = AttemptId::generate();

        store
            .debit(
                &user_id,
                Operation::MusicGenerateV5,
                TransactionMetadata::None,
                Some(&attempt),
            )
            .unwrap();

        let result = store.debit(
            &user_id,
            Operation::MusicGenerateV5,
            TransactionMetadata::None,
            Some(&attempt),
        );
        assert!(matches!(result, Err(StoreError::DuplicateAttempt { .. })));

        // Only one debit landed.
        assert_eq!(store.get_balance(&user_id).unwrap().unwrap().credits, 94);
    }

    #[test]
    fn at_most_one_refund_per_attempt() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        seed(&store, &user_id, 100);
        let attempt = AttemptId::generate();

        store
            .debit(
                &user_id,
                Operation::MusicGenerateV5,
                TransactionMetadata::None,
                Some(&attempt),
            )
            .unwrap();

        // Same attempt may carry one refund...
        store
            .refund(
                &user_id,
                Operation::MusicGenerateV5,
                TransactionMetadata::refund("failed", Some(attempt)),
                Some(&attempt),
            )
            .unwrap();

        // ...but never two.
        let result = store.refund(
            &user_id,
            Operation::MusicGenerateV5,
            TransactionMetadata::refund("failed again", Some(attempt)),
            Some(&attempt),
        );
        assert!(matches!(result, Err(StoreError::DuplicateAttempt { .. })));
        assert_eq!(store.get_balance(&user_id).unwrap().unwrap().credits, 100);
    }

    #[test]
    fn concurrent_debits_never_overdraw() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);
        let user_id = UserId::generate();
        seed(&store, &user_id, 20);

        // 10 concurrent debits of 6 credits against a balance of 20:
        // exactly floor(20 / 6) = 3 may succeed.
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store.debit(
                        &user_id,
                        Operation::MusicGenerateV5,
                        TransactionMetadata::None,
                        None,
                    )
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let rejections = results
            .iter()
            .filter(|r| matches!(r, Err(StoreError::InsufficientCredits { .. })))
            .count();

        assert_eq!(successes, 3);
        assert_eq!(rejections, 7);

        let balance = store.get_balance(&user_id).unwrap().unwrap();
        assert_eq!(balance.credits, 2);
        assert!(balance.credits >= 0);
    }

    #[test]
    fn ledger_reconciles_with_balance() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        seed(&store, &user_id, 100);

        store
            .debit(
                &user_id,
                Operation::ImageFast,
                TransactionMetadata::None,
                None,
            )
            .unwrap();
        store
            .debit(
                &user_id,
                Operation::ChatAdvanced,
                TransactionMetadata::None,
                None,
            )
            .unwrap();
        store
            .refund(
                &user_id,
                Operation::ImageFast,
                TransactionMetadata::refund("bad output", None),
                None,
            )
            .unwrap();

        let transactions = store.list_transactions(&user_id, 100, 0).unwrap();
        let replayed: i64 = transactions.iter().map(LedgerTransaction::signed_amount).sum();
        let balance = store.get_balance(&user_id).unwrap().unwrap();

        assert_eq!(replayed, balance.credits);
        assert!(transactions.iter().all(LedgerTransaction::is_consistent));
    }

    #[test]
    fn transactions_list_newest_first_with_pagination() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        seed(&store, &user_id, 100);

        std::thread::sleep(std::time::Duration::from_millis(2)); // distinct ULID timestamps
        store
            .debit(
                &user_id,
                Operation::ChatAdvanced,
                TransactionMetadata::None,
                None,
            )
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        store
            .debit(
                &user_id,
                Operation::ImageFast,
                TransactionMetadata::None,
                None,
            )
            .unwrap();

        let all = store.list_transactions(&user_id, 10, 0).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].operation, Some(Operation::ImageFast));
        assert_eq!(all[1].operation, Some(Operation::ChatAdvanced));
        assert_eq!(all[2].tx_type, TransactionType::Credit);

        let page1 = store.list_transactions(&user_id, 1, 0).unwrap();
        let page2 = store.list_transactions(&user_id, 1, 1).unwrap();
        assert_eq!(page1[0].operation, Some(Operation::ImageFast));
        assert_eq!(page2[0].operation, Some(Operation::ChatAdvanced));
    }

    #[test]
    fn transactions_are_isolated_per_user() {
        let (store, _dir) = create_test_store();
        let alice = UserId::generate();
        let bob = UserId::generate();
        seed(&store, &alice, 50);
        seed(&store, &bob, 50);

        store
            .debit(&alice, Operation::ImageFast, TransactionMetadata::None, None)
            .unwrap();

        assert_eq!(store.list_transactions(&alice, 10, 0).unwrap().len(), 2);
        assert_eq!(store.list_transactions(&bob, 10, 0).unwrap().len(), 1);
    }

    #[test]
    fn settlement_lifecycle() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let attempt = AttemptId::generate();

        let settlement =
            PendingSettlement::open(attempt, user_id, Operation::VideoGen4_10s);
        store.put_settlement(&settlement).unwrap();

        // Open now, visible with a future cutoff.
        let open = store.list_open_settlements(Utc::now()).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].attempt_id, attempt);

        // Invisible with a cutoff before it started.
        let earlier = settlement.started_at - chrono::Duration::seconds(60);
        assert!(store.list_open_settlements(earlier).unwrap().is_empty());

        store.resolve_settlement(&attempt).unwrap();
        assert!(store.list_open_settlements(Utc::now()).unwrap().is_empty());

        // Resolving again is a no-op.
        store.resolve_settlement(&attempt).unwrap();
    }
}
