//! TownTicks Loyalty Core
//!
//! Event-sourced loyalty points ledger: an append-only transaction log plus
//! materialized per-`(user, scope)` balance records, with tier and milestone
//! reward policies layered on top.
//!
//! # Architecture
//!
//! - **Append-only ledger**: every balance mutation pairs with exactly one
//!   immutable transaction row
//! - **Single writer**: all mutations flow through one actor task, so
//!   read-modify-write cycles on balances never race
//! - **Atomic commits**: balance record(s) and their transaction row land in
//!   one RocksDB write batch
//!
//! # Invariants
//!
//! - `points_available` = issued − redeemed − transferred − gifted − expired,
//!   and never negative
//! - Gifts and transfers conserve points across the two balances they touch
//! - A milestone threshold is awarded at most once per user

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod balance;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod milestone;
pub mod ops;
pub mod qr;
pub mod reporting;
pub mod storage;
pub mod tier;
pub mod types;

// Re-exports
pub use balance::{Balance, BalanceDelta, BalanceKey};
pub use config::{Config, PolicyConfig};
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use milestone::{MilestoneReport, MilestoneRule, MilestoneSchedule};
pub use ops::{
    CashbackIssueRequest, CashbackRedeemRequest, CheckMilestonesRequest, ExpireRequest,
    ExportRequest, GiftRequest, ImportRequest, IssueRequest, MilestoneCheckReceipt,
    OperationReceipt, RedeemRequest, TierUpgradeReceipt, TransferRequest, UpgradeTierRequest,
};
pub use qr::RedemptionPayload;
pub use reporting::{ActivitySummary, PoolTotals, TransactionFilter};
pub use storage::StorageStats;
pub use tier::{Tier, TierInfo, TierTable};
pub use types::{
    Identity, LoyaltyTransaction, PointType, PoolType, Role, Scope, TransactionId,
    TransactionStatus, TransactionType, UserId,
};

/// Initialize tracing from `RUST_LOG`, defaulting to `info`
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();
}
