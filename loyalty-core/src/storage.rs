//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `balances` - One record per (user, scope) key
//! - `transactions` - Append-only transaction log (key: transaction_id)
//! - `indices` - Secondary indices: per-user history and award markers
//!
//! Every mutating operation commits through [`Storage::commit_operation`],
//! which writes the touched balances, the transaction row, and the indices
//! in a single `WriteBatch` - an operation either fully commits or nothing
//! is persisted.

use crate::balance::{Balance, BalanceKey};
use crate::error::{Error, Result};
use crate::types::{LoyaltyTransaction, TransactionId, TransactionType, UserId};
use crate::Config;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, IteratorMode, Options, WriteBatch, DB,
};
use std::sync::Arc;

/// Column family names
const CF_BALANCES: &str = "balances";
const CF_TRANSACTIONS: &str = "transactions";
const CF_INDICES: &str = "indices";

/// Index key prefixes within `indices`
const IDX_USER_TXN: u8 = b'u';
const IDX_MARKER: u8 = b'm';

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        db_opts.set_level_zero_file_num_compaction_trigger(
            config.rocksdb.level0_file_num_compaction_trigger,
        );

        // Universal compaction for the append-heavy transaction log
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_BALANCES, Self::cf_options_balances()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_transactions()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened RocksDB at {:?}", path);

        Ok(Self { db: Arc::new(db) })
    }

    fn cf_options_balances() -> Options {
        let mut opts = Options::default();
        // Balances are hot reads, favor speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_transactions() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Marker lookups benefit from bloom filters
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Balance operations

    /// Get a balance record, `None` if never written
    pub fn get_balance(&self, key: &BalanceKey) -> Result<Option<Balance>> {
        let cf = self.cf_handle(CF_BALANCES)?;

        match self.db.get_cf(cf, key.as_bytes())? {
            Some(value) => {
                let balance: Balance = bincode::deserialize(&value)?;
                Ok(Some(balance))
            }
            None => Ok(None),
        }
    }

    /// Get a balance record, creating a zeroed one in memory if absent.
    ///
    /// The created record is not persisted until it goes through
    /// [`Storage::commit_operation`].
    pub fn get_or_create_balance(&self, key: &BalanceKey) -> Result<Balance> {
        Ok(self.get_balance(key)?.unwrap_or_else(|| Balance::new(key)))
    }

    // Transaction ledger operations

    /// Atomically commit one operation: all touched balances, the
    /// transaction row, and the secondary indices.
    ///
    /// When `unique_marker` is set, the commit fails with `Conflict` and
    /// writes nothing if a row with the same `(user, type, marker)` already
    /// exists. This is the uniqueness guard behind idempotent milestone and
    /// tier awards.
    pub fn commit_operation(
        &self,
        balances: &[&Balance],
        transaction: &LoyaltyTransaction,
        unique_marker: Option<&str>,
    ) -> Result<()> {
        let cf_balances = self.cf_handle(CF_BALANCES)?;
        let cf_transactions = self.cf_handle(CF_TRANSACTIONS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let mut batch = WriteBatch::default();

        // 1. Uniqueness guard
        if let Some(marker) = unique_marker {
            let marker_key = Self::index_key_marker(
                &transaction.user_id,
                transaction.transaction_type,
                marker,
            );
            if self.db.get_cf(cf_indices, &marker_key)?.is_some() {
                return Err(Error::Conflict(format!(
                    "{} already recorded for user {} marker {}",
                    transaction.transaction_type, transaction.user_id, marker
                )));
            }
            batch.put_cf(cf_indices, &marker_key, transaction.transaction_id.as_str());
        }

        // 2. Balances
        for balance in balances {
            let key = balance.key().as_bytes();
            let value = bincode::serialize(balance)?;
            batch.put_cf(cf_balances, &key, &value);
        }

        // 3. Transaction row
        let txn_key = transaction.transaction_id.as_str().as_bytes();
        let txn_value = bincode::serialize(transaction)?;
        batch.put_cf(cf_transactions, txn_key, &txn_value);

        // 4. Per-user history index: user || created_nanos || txn_id
        let idx_user = Self::index_key_user_txn(transaction);
        batch.put_cf(cf_indices, &idx_user, transaction.transaction_id.as_str());

        // Atomic commit
        self.db.write(batch)?;

        tracing::debug!(
            transaction_id = %transaction.transaction_id,
            user_id = %transaction.user_id,
            transaction_type = %transaction.transaction_type,
            "Transaction appended"
        );

        Ok(())
    }

    /// Get a transaction by ID
    pub fn get_transaction(&self, id: &TransactionId) -> Result<LoyaltyTransaction> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;

        let value = self
            .db
            .get_cf(cf, id.as_str().as_bytes())?
            .ok_or_else(|| Error::NotFound(format!("transaction {}", id)))?;

        let txn: LoyaltyTransaction = bincode::deserialize(&value)?;
        Ok(txn)
    }

    /// Look up a prior award of a specific milestone/tier marker
    pub fn find_existing(
        &self,
        user_id: &UserId,
        transaction_type: TransactionType,
        marker: &str,
    ) -> Result<Option<TransactionId>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let key = Self::index_key_marker(user_id, transaction_type, marker);

        match self.db.get_cf(cf, &key)? {
            Some(value) => {
                let id = String::from_utf8(value.to_vec())
                    .map_err(|e| Error::Storage(format!("corrupt marker index: {}", e)))?;
                Ok(Some(TransactionId::from_string(id)))
            }
            None => Ok(None),
        }
    }

    /// All transactions for a user, oldest first
    pub fn transactions_for_user(&self, user_id: &UserId) -> Result<Vec<LoyaltyTransaction>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let prefix = Self::index_prefix_user(user_id);
        let iter = self.db.prefix_iterator_cf(cf_indices, &prefix);

        let mut transactions = Vec::new();
        for item in iter {
            let (key, value) = item?;
            // prefix_iterator seeks; stop once past our prefix
            if !key.starts_with(&prefix) {
                break;
            }
            let id = String::from_utf8(value.to_vec())
                .map_err(|e| Error::Storage(format!("corrupt user index: {}", e)))?;
            transactions.push(self.get_transaction(&TransactionId::from_string(id))?);
        }

        Ok(transactions)
    }

    /// Full transaction-log scan, for derived reporting aggregates
    pub fn scan_transactions(&self) -> Result<Vec<LoyaltyTransaction>> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        let iter = self.db.iterator_cf(cf, IteratorMode::Start);

        let mut transactions = Vec::new();
        for item in iter {
            let (_, value) = item?;
            transactions.push(bincode::deserialize(&value)?);
        }

        Ok(transactions)
    }

    /// Full balance-store scan, for pool totals
    pub fn scan_balances(&self) -> Result<Vec<Balance>> {
        let cf = self.cf_handle(CF_BALANCES)?;
        let iter = self.db.iterator_cf(cf, IteratorMode::Start);

        let mut balances = Vec::new();
        for item in iter {
            let (_, value) = item?;
            balances.push(bincode::deserialize(&value)?);
        }

        Ok(balances)
    }

    // Index key helpers

    fn index_prefix_user(user_id: &UserId) -> Vec<u8> {
        let mut key = vec![IDX_USER_TXN];
        key.extend_from_slice(user_id.as_str().as_bytes());
        key.push(0);
        key
    }

    fn index_key_user_txn(transaction: &LoyaltyTransaction) -> Vec<u8> {
        let mut key = Self::index_prefix_user(&transaction.user_id);
        let nanos = transaction
            .created_at
            .timestamp_nanos_opt()
            .unwrap_or(i64::MAX);
        key.extend_from_slice(&nanos.to_be_bytes());
        key.extend_from_slice(transaction.transaction_id.as_str().as_bytes());
        key
    }

    fn index_key_marker(
        user_id: &UserId,
        transaction_type: TransactionType,
        marker: &str,
    ) -> Vec<u8> {
        let mut key = vec![IDX_MARKER];
        key.extend_from_slice(user_id.as_str().as_bytes());
        key.push(0);
        key.push(transaction_type.code());
        key.extend_from_slice(marker.as_bytes());
        key
    }

    // Statistics

    /// Approximate storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            total_balances: self.approximate_count(CF_BALANCES)?,
            total_transactions: self.approximate_count(CF_TRANSACTIONS)?,
        })
    }

    fn approximate_count(&self, cf_name: &str) -> Result<u64> {
        let cf = self.cf_handle(cf_name)?;
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);
        Ok(prop)
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Approximate balance record count
    pub total_balances: u64,
    /// Approximate transaction row count
    pub total_transactions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{base_transaction, PointType, PoolType, Scope};
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn sample_txn(user: &str, amount: i64) -> LoyaltyTransaction {
        base_transaction(
            UserId::new(user),
            Scope::Pool(PoolType::TownTicks),
            TransactionType::Issue,
            PointType::Regular,
            Decimal::from(amount),
            Decimal::ONE,
        )
    }

    #[test]
    fn test_balance_roundtrip() {
        let (storage, _dir) = test_storage();
        let key = BalanceKey::new(UserId::new("u1"), Scope::Global);

        assert!(storage.get_balance(&key).unwrap().is_none());

        let mut balance = storage.get_or_create_balance(&key).unwrap();
        balance
            .apply(&crate::balance::BalanceDelta::issue(Decimal::from(100)))
            .unwrap();

        let txn = sample_txn("u1", 100);
        storage.commit_operation(&[&balance], &txn, None).unwrap();

        let stored = storage.get_balance(&key).unwrap().unwrap();
        assert_eq!(stored.points_available, Decimal::from(100));
        assert!(stored.invariant_holds());
    }

    #[test]
    fn test_transaction_roundtrip_and_user_index() {
        let (storage, _dir) = test_storage();
        let key = BalanceKey::new(UserId::new("u1"), Scope::Pool(PoolType::TownTicks));
        let balance = storage.get_or_create_balance(&key).unwrap();

        for amount in [10, 20, 30] {
            let txn = sample_txn("u1", amount);
            storage.commit_operation(&[&balance], &txn, None).unwrap();
        }
        // Unrelated user must not leak into the prefix scan
        let other = sample_txn("u10", 99);
        storage.commit_operation(&[&balance], &other, None).unwrap();

        let history = storage
            .transactions_for_user(&UserId::new("u1"))
            .unwrap();
        assert_eq!(history.len(), 3);
        let amounts: Vec<Decimal> = history.iter().map(|t| t.points_amount).collect();
        assert_eq!(
            amounts,
            vec![Decimal::from(10), Decimal::from(20), Decimal::from(30)]
        );
    }

    #[test]
    fn test_marker_uniqueness_guard() {
        let (storage, _dir) = test_storage();
        let key = BalanceKey::new(UserId::new("u1"), Scope::Global);
        let balance = storage.get_or_create_balance(&key).unwrap();

        let mut txn = sample_txn("u1", 10);
        txn.transaction_type = TransactionType::MilestoneBonus;
        txn.point_type = PointType::Milestone;
        txn.milestone_reached = Some("100".to_string());

        assert!(storage
            .find_existing(&UserId::new("u1"), TransactionType::MilestoneBonus, "100")
            .unwrap()
            .is_none());

        storage
            .commit_operation(&[&balance], &txn, Some("100"))
            .unwrap();

        let found = storage
            .find_existing(&UserId::new("u1"), TransactionType::MilestoneBonus, "100")
            .unwrap();
        assert_eq!(found, Some(txn.transaction_id.clone()));

        // Second commit with the same marker is rejected, nothing written
        let mut dup = sample_txn("u1", 10);
        dup.transaction_type = TransactionType::MilestoneBonus;
        dup.milestone_reached = Some("100".to_string());
        let err = storage
            .commit_operation(&[&balance], &dup, Some("100"))
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(storage.get_transaction(&dup.transaction_id).is_err());
    }

    #[test]
    fn test_scans_and_stats() {
        let (storage, _dir) = test_storage();
        let key = BalanceKey::new(UserId::new("u1"), Scope::Pool(PoolType::Business));
        let balance = storage.get_or_create_balance(&key).unwrap();

        storage
            .commit_operation(&[&balance], &sample_txn("u1", 5), None)
            .unwrap();
        storage
            .commit_operation(&[&balance], &sample_txn("u2", 7), None)
            .unwrap();

        assert_eq!(storage.scan_transactions().unwrap().len(), 2);
        assert_eq!(storage.scan_balances().unwrap().len(), 1);
    }
}
