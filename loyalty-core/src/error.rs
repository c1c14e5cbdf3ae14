//! Error types for the loyalty ledger

use crate::tier::Tier;
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing operation parameters, rejected before any store access
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced balance/record does not exist where one was required
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation would drive an available balance negative
    #[error("Insufficient balance: {available} available, {requested} requested")]
    InsufficientBalance {
        /// Balance available before the operation
        available: Decimal,
        /// Amount the operation tried to deduct
        requested: Decimal,
    },

    /// Actor lacks the required capability or scope flag
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Tier upgrade requested at the terminal tier
    #[error("Already at maximum tier ({0})")]
    AlreadyMaxTier(Tier),

    /// Cumulative points below the next tier's minimum
    #[error("Need {shortfall} more points to upgrade to {next_tier}")]
    InsufficientPointsForTier {
        /// The tier the upgrade targeted
        next_tier: Tier,
        /// Minimum cumulative points that tier requires
        required: Decimal,
        /// Exact shortfall to report to the caller
        shortfall: Decimal,
    },

    /// Concurrent-mutation conflict detected by the uniqueness guard; retryable
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the caller may safely retry the operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
