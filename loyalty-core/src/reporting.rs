//! Read-side reporting over the ledger
//!
//! Pure aggregation: the facade loads rows from storage and these types
//! fold them into dashboard shapes. Nothing here writes.

use crate::balance::Balance;
use crate::types::{LoyaltyTransaction, PointType, PoolType, Scope, TransactionType, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Filter for transaction history queries
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    /// Only this transaction type
    pub transaction_type: Option<TransactionType>,
    /// Only this point type
    pub point_type: Option<PointType>,
    /// Only this scope
    pub scope: Option<Scope>,
    /// Only rows at or after this instant
    pub since: Option<DateTime<Utc>>,
    /// Only rows before this instant
    pub until: Option<DateTime<Utc>>,
    /// Cap on returned rows (applied after the other filters)
    pub limit: Option<usize>,
}

impl TransactionFilter {
    /// Whether a row passes every set criterion
    pub fn matches(&self, txn: &LoyaltyTransaction) -> bool {
        if let Some(t) = self.transaction_type {
            if txn.transaction_type != t {
                return false;
            }
        }
        if let Some(p) = self.point_type {
            if txn.point_type != p {
                return false;
            }
        }
        if let Some(ref s) = self.scope {
            if txn.scope != *s {
                return false;
            }
        }
        if let Some(since) = self.since {
            if txn.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if txn.created_at >= until {
                return false;
            }
        }
        true
    }

    /// Apply the filter to an ordered row list
    pub fn apply(&self, rows: Vec<LoyaltyTransaction>) -> Vec<LoyaltyTransaction> {
        let filtered = rows.into_iter().filter(|t| self.matches(t));
        match self.limit {
            Some(limit) => filtered.take(limit).collect(),
            None => filtered.collect(),
        }
    }
}

/// Per-user activity totals folded from transaction history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivitySummary {
    /// User the summary covers
    pub user_id: UserId,
    /// Sum of issue rows
    pub total_issued: Decimal,
    /// Sum of redeem rows
    pub total_redeemed: Decimal,
    /// Sum of transfer and export rows
    pub total_transferred: Decimal,
    /// Sum of gift rows
    pub total_gifted: Decimal,
    /// Sum of expire rows
    pub total_expired: Decimal,
    /// Sum of import rows
    pub total_imported: Decimal,
    /// Sum of milestone and tier bonus rows
    pub total_bonus: Decimal,
    /// Sum of cashback issued
    pub total_cashback_issued: Decimal,
    /// Sum of cashback redeemed
    pub total_cashback_redeemed: Decimal,
    /// Row count
    pub transaction_count: usize,
}

impl ActivitySummary {
    /// Fold a user's transaction rows into totals
    pub fn compute(user_id: UserId, rows: &[LoyaltyTransaction]) -> Self {
        let mut summary = Self {
            user_id,
            total_issued: Decimal::ZERO,
            total_redeemed: Decimal::ZERO,
            total_transferred: Decimal::ZERO,
            total_gifted: Decimal::ZERO,
            total_expired: Decimal::ZERO,
            total_imported: Decimal::ZERO,
            total_bonus: Decimal::ZERO,
            total_cashback_issued: Decimal::ZERO,
            total_cashback_redeemed: Decimal::ZERO,
            transaction_count: rows.len(),
        };

        for txn in rows {
            let amount = txn.points_amount;
            match txn.transaction_type {
                TransactionType::Issue => summary.total_issued += amount,
                TransactionType::Redeem => summary.total_redeemed += amount,
                TransactionType::Transfer | TransactionType::Export => {
                    summary.total_transferred += amount
                }
                TransactionType::Gift => summary.total_gifted += amount,
                TransactionType::Expire => summary.total_expired += amount,
                TransactionType::Import => summary.total_imported += amount,
                TransactionType::MilestoneBonus | TransactionType::TierBonus => {
                    summary.total_bonus += amount
                }
                TransactionType::CashbackIssue => {
                    summary.total_cashback_issued += txn.cashback_amount
                }
                TransactionType::CashbackRedeem => {
                    summary.total_cashback_redeemed += txn.cashback_amount
                }
            }
        }
        summary
    }
}

/// Available points broken down by pool, folded from balance records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolTotals {
    /// Sum of points_issued across all records
    pub total_points_in_system: Decimal,
    /// Sum of points_available across all records
    pub total_available: Decimal,
    /// Available points in the global scope
    pub global_available: Decimal,
    /// Available points in the townTicks pool
    pub town_ticks_available: Decimal,
    /// Available points in the business pool
    pub business_available: Decimal,
    /// Available points in individual business pools
    pub individual_business_available: Decimal,
    /// Balance record count
    pub record_count: usize,
}

impl PoolTotals {
    /// Fold balance records into pool totals
    pub fn compute(records: &[Balance]) -> Self {
        let mut totals = Self {
            total_points_in_system: Decimal::ZERO,
            total_available: Decimal::ZERO,
            global_available: Decimal::ZERO,
            town_ticks_available: Decimal::ZERO,
            business_available: Decimal::ZERO,
            individual_business_available: Decimal::ZERO,
            record_count: records.len(),
        };

        for record in records {
            totals.total_points_in_system += record.points_issued;
            totals.total_available += record.points_available;
            match record.scope.pool_type() {
                None => totals.global_available += record.points_available,
                Some(PoolType::TownTicks) => {
                    totals.town_ticks_available += record.points_available
                }
                Some(PoolType::Business) => totals.business_available += record.points_available,
                Some(PoolType::IndividualBusiness) => {
                    totals.individual_business_available += record.points_available
                }
            }
        }
        totals
    }
}
