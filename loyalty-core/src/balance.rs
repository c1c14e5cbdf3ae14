//! Balance store records
//!
//! One mutable record per `(user, scope)` key, materialized from the
//! transaction ledger. `points_available` is never written directly: every
//! mutation goes through [`Balance::apply`], which recomputes availability
//! from the component counters and rejects any delta that would drive it
//! negative. That keeps the running-net invariant true by construction.

use crate::error::{Error, Result};
use crate::tier::Tier;
use crate::types::{default_multiplier, Scope, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Storage key of a balance record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BalanceKey {
    /// Balance owner
    pub user_id: UserId,
    /// Balance scope
    pub scope: Scope,
}

impl BalanceKey {
    /// Create a key
    pub fn new(user_id: UserId, scope: Scope) -> Self {
        Self { user_id, scope }
    }

    /// Deterministic byte encoding for storage
    pub fn as_bytes(&self) -> Vec<u8> {
        let mut key = self.user_id.as_str().as_bytes().to_vec();
        key.push(0);
        key.extend_from_slice(self.scope.key_fragment().as_bytes());
        key
    }
}

/// One balance record per `(user, scope)` key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    /// Balance owner
    pub user_id: UserId,

    /// Balance scope
    pub scope: Scope,

    /// Cumulative points issued into this scope (includes gifts received and imports)
    pub points_issued: Decimal,

    /// Cumulative points redeemed
    pub points_redeemed: Decimal,

    /// Cumulative points transferred or exported out
    pub points_transferred: Decimal,

    /// Cumulative points gifted away
    pub points_gifted: Decimal,

    /// Cumulative points expired
    pub points_expired: Decimal,

    /// Spendable points: issued − redeemed − transferred − gifted − expired
    pub points_available: Decimal,

    /// Cumulative cashback issued
    pub cashback_issued: Decimal,

    /// Cumulative cashback redeemed
    pub cashback_redeemed: Decimal,

    /// Spendable cashback: issued − redeemed
    pub cashback_available: Decimal,

    /// Current loyalty tier
    pub current_tier: Tier,

    /// Earning multiplier granted by the current tier
    pub tier_multiplier: Decimal,

    /// Last mutation timestamp
    pub last_updated: DateTime<Utc>,
}

impl Balance {
    /// Zeroed balance for a key, created lazily on first use
    pub fn new(key: &BalanceKey) -> Self {
        Self {
            user_id: key.user_id.clone(),
            scope: key.scope.clone(),
            points_issued: Decimal::ZERO,
            points_redeemed: Decimal::ZERO,
            points_transferred: Decimal::ZERO,
            points_gifted: Decimal::ZERO,
            points_expired: Decimal::ZERO,
            points_available: Decimal::ZERO,
            cashback_issued: Decimal::ZERO,
            cashback_redeemed: Decimal::ZERO,
            cashback_available: Decimal::ZERO,
            current_tier: Tier::Bronze,
            tier_multiplier: default_multiplier(),
            last_updated: Utc::now(),
        }
    }

    /// Key of this record
    pub fn key(&self) -> BalanceKey {
        BalanceKey::new(self.user_id.clone(), self.scope.clone())
    }

    /// Apply a delta, recomputing availability.
    ///
    /// Fails with `InsufficientBalance` and leaves the record unchanged if
    /// the delta would drive `points_available` or `cashback_available`
    /// negative.
    pub fn apply(&mut self, delta: &BalanceDelta) -> Result<()> {
        delta.validate()?;

        let issued = self.points_issued + delta.points_issued;
        let redeemed = self.points_redeemed + delta.points_redeemed;
        let transferred = self.points_transferred + delta.points_transferred;
        let gifted = self.points_gifted + delta.points_gifted;
        let expired = self.points_expired + delta.points_expired;
        let available = issued - redeemed - transferred - gifted - expired;

        if available < Decimal::ZERO {
            return Err(Error::InsufficientBalance {
                available: self.points_available,
                requested: delta.points_debit(),
            });
        }

        let cashback_issued = self.cashback_issued + delta.cashback_issued;
        let cashback_redeemed = self.cashback_redeemed + delta.cashback_redeemed;
        let cashback_available = cashback_issued - cashback_redeemed;

        if cashback_available < Decimal::ZERO {
            return Err(Error::InsufficientBalance {
                available: self.cashback_available,
                requested: delta.cashback_redeemed,
            });
        }

        self.points_issued = issued;
        self.points_redeemed = redeemed;
        self.points_transferred = transferred;
        self.points_gifted = gifted;
        self.points_expired = expired;
        self.points_available = available;
        self.cashback_issued = cashback_issued;
        self.cashback_redeemed = cashback_redeemed;
        self.cashback_available = cashback_available;
        self.last_updated = Utc::now();

        Ok(())
    }

    /// Running-net invariant check, used by audits and tests
    pub fn invariant_holds(&self) -> bool {
        self.points_available
            == self.points_issued
                - self.points_redeemed
                - self.points_transferred
                - self.points_gifted
                - self.points_expired
            && self.cashback_available == self.cashback_issued - self.cashback_redeemed
            && self.points_available >= Decimal::ZERO
            && self.cashback_available >= Decimal::ZERO
    }
}

/// Non-negative adjustments to a balance's component counters
///
/// Each field is an increment to the corresponding cumulative counter;
/// availability is derived, never set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BalanceDelta {
    /// Increment to points issued
    pub points_issued: Decimal,
    /// Increment to points redeemed
    pub points_redeemed: Decimal,
    /// Increment to points transferred/exported
    pub points_transferred: Decimal,
    /// Increment to points gifted away
    pub points_gifted: Decimal,
    /// Increment to points expired
    pub points_expired: Decimal,
    /// Increment to cashback issued
    pub cashback_issued: Decimal,
    /// Increment to cashback redeemed
    pub cashback_redeemed: Decimal,
}

impl BalanceDelta {
    /// Delta for issuing points (also gift receipt and import)
    pub fn issue(amount: Decimal) -> Self {
        Self {
            points_issued: amount,
            ..Default::default()
        }
    }

    /// Delta for redeeming points
    pub fn redeem(amount: Decimal) -> Self {
        Self {
            points_redeemed: amount,
            ..Default::default()
        }
    }

    /// Delta for the sender side of a gift
    pub fn gift_out(amount: Decimal) -> Self {
        Self {
            points_gifted: amount,
            ..Default::default()
        }
    }

    /// Delta for the source side of a transfer or an export
    pub fn transfer_out(amount: Decimal) -> Self {
        Self {
            points_transferred: amount,
            ..Default::default()
        }
    }

    /// Delta for expiring points
    pub fn expire(amount: Decimal) -> Self {
        Self {
            points_expired: amount,
            ..Default::default()
        }
    }

    /// Delta for issuing cashback
    pub fn cashback_issue(amount: Decimal) -> Self {
        Self {
            cashback_issued: amount,
            ..Default::default()
        }
    }

    /// Delta for redeeming cashback
    pub fn cashback_redeem(amount: Decimal) -> Self {
        Self {
            cashback_redeemed: amount,
            ..Default::default()
        }
    }

    /// Total points this delta deducts from availability
    fn points_debit(&self) -> Decimal {
        self.points_redeemed + self.points_transferred + self.points_gifted + self.points_expired
    }

    fn validate(&self) -> Result<()> {
        let fields = [
            self.points_issued,
            self.points_redeemed,
            self.points_transferred,
            self.points_gifted,
            self.points_expired,
            self.cashback_issued,
            self.cashback_redeemed,
        ];
        if fields.iter().any(|f| *f < Decimal::ZERO) {
            return Err(Error::Validation(
                "balance delta fields must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}
