//! Tier policy
//!
//! Four ordered loyalty ranks, each with a minimum cumulative-points
//! threshold and an earning multiplier. Pure functions, no state; the table
//! is configuration (overridable per tenant), not a process-wide constant.

use crate::error::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Loyalty tier, ordered bronze < silver < gold < platinum
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Basic tier
    Bronze,
    /// 20% bonus points
    Silver,
    /// 50% bonus points
    Gold,
    /// 100% bonus points, terminal
    Platinum,
}

impl Tier {
    /// Next tier up, `None` at the terminal tier
    pub fn next(&self) -> Option<Tier> {
        match self {
            Tier::Bronze => Some(Tier::Silver),
            Tier::Silver => Some(Tier::Gold),
            Tier::Gold => Some(Tier::Platinum),
            Tier::Platinum => None,
        }
    }

    /// Lowercase tier name
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Bronze => "bronze",
            Tier::Silver => "silver",
            Tier::Gold => "gold",
            Tier::Platinum => "platinum",
        }
    }

    /// Multiplier in the default table
    pub fn default_multiplier(&self) -> Decimal {
        DEFAULT_RULES[*self as usize].1
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// (min_points, multiplier) indexed by tier order
const DEFAULT_RULES: [(i64, Decimal); 4] = [
    (0, Decimal::from_parts(10, 0, 0, false, 1)),
    (1000, Decimal::from_parts(12, 0, 0, false, 1)),
    (5000, Decimal::from_parts(15, 0, 0, false, 1)),
    (10000, Decimal::from_parts(20, 0, 0, false, 1)),
];

/// Threshold and multiplier for one tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierRule {
    /// Minimum cumulative issued points to hold this tier
    pub min_points: Decimal,
    /// Earning multiplier granted by this tier
    pub multiplier: Decimal,
}

/// Tier table: one rule per tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierTable {
    /// Bronze rule
    pub bronze: TierRule,
    /// Silver rule
    pub silver: TierRule,
    /// Gold rule
    pub gold: TierRule,
    /// Platinum rule
    pub platinum: TierRule,
}

impl Default for TierTable {
    fn default() -> Self {
        let rule = |tier: Tier| {
            let (min, multiplier) = DEFAULT_RULES[tier as usize];
            TierRule {
                min_points: Decimal::from(min),
                multiplier,
            }
        };
        Self {
            bronze: rule(Tier::Bronze),
            silver: rule(Tier::Silver),
            gold: rule(Tier::Gold),
            platinum: rule(Tier::Platinum),
        }
    }
}

impl TierTable {
    /// Rule for a tier
    pub fn rule(&self, tier: Tier) -> TierRule {
        match tier {
            Tier::Bronze => self.bronze,
            Tier::Silver => self.silver,
            Tier::Gold => self.gold,
            Tier::Platinum => self.platinum,
        }
    }

    /// Evaluate an upgrade from `current` with `points_issued` cumulative points.
    ///
    /// Equality with the threshold counts as reaching it. Returns the new
    /// tier and its rule, or the exact shortfall.
    pub fn evaluate_upgrade(&self, current: Tier, points_issued: Decimal) -> Result<(Tier, TierRule)> {
        let next = current.next().ok_or(Error::AlreadyMaxTier(current))?;
        let rule = self.rule(next);
        if points_issued < rule.min_points {
            return Err(Error::InsufficientPointsForTier {
                next_tier: next,
                required: rule.min_points,
                shortfall: rule.min_points - points_issued,
            });
        }
        Ok((next, rule))
    }

    /// Points still needed to reach the next tier (zero once reached)
    pub fn points_to_next(&self, current: Tier, points_issued: Decimal) -> Option<Decimal> {
        current.next().map(|next| {
            let min = self.rule(next).min_points;
            (min - points_issued).max(Decimal::ZERO)
        })
    }
}

/// Read-only tier report for a balance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierInfo {
    /// Current tier
    pub current_tier: Tier,
    /// Current multiplier
    pub current_multiplier: Decimal,
    /// Cumulative issued points in the scope
    pub total_points: Decimal,
    /// Next tier, `None` at platinum
    pub next_tier: Option<Tier>,
    /// Points still needed for the next tier
    pub points_to_next_tier: Decimal,
}

impl TierInfo {
    /// Build the report from a tier table and cumulative points
    pub fn compute(table: &TierTable, current: Tier, points_issued: Decimal) -> Self {
        Self {
            current_tier: current,
            current_multiplier: table.rule(current).multiplier,
            total_points: points_issued,
            next_tier: current.next(),
            points_to_next_tier: table
                .points_to_next(current, points_issued)
                .unwrap_or(Decimal::ZERO),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Bronze < Tier::Silver);
        assert!(Tier::Gold < Tier::Platinum);
        assert_eq!(Tier::Bronze.next(), Some(Tier::Silver));
        assert_eq!(Tier::Platinum.next(), None);
    }

    #[test]
    fn test_default_table() {
        let table = TierTable::default();
        assert_eq!(table.rule(Tier::Bronze).min_points, Decimal::ZERO);
        assert_eq!(table.rule(Tier::Silver).min_points, Decimal::from(1000));
        assert_eq!(table.rule(Tier::Silver).multiplier, Decimal::new(12, 1));
        assert_eq!(table.rule(Tier::Gold).multiplier, Decimal::new(15, 1));
        assert_eq!(table.rule(Tier::Platinum).multiplier, Decimal::new(20, 1));
    }

    #[test]
    fn test_upgrade_boundary_inclusive() {
        let table = TierTable::default();
        let (next, rule) = table
            .evaluate_upgrade(Tier::Bronze, Decimal::from(1000))
            .unwrap();
        assert_eq!(next, Tier::Silver);
        assert_eq!(rule.multiplier, Decimal::new(12, 1));
    }

    #[test]
    fn test_upgrade_shortfall_reported() {
        let table = TierTable::default();
        let err = table
            .evaluate_upgrade(Tier::Silver, Decimal::from(1000))
            .unwrap_err();
        match err {
            Error::InsufficientPointsForTier {
                next_tier,
                required,
                shortfall,
            } => {
                assert_eq!(next_tier, Tier::Gold);
                assert_eq!(required, Decimal::from(5000));
                assert_eq!(shortfall, Decimal::from(4000));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_upgrade_at_terminal_tier() {
        let table = TierTable::default();
        let err = table
            .evaluate_upgrade(Tier::Platinum, Decimal::from(1_000_000))
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyMaxTier(Tier::Platinum)));
    }

    #[test]
    fn test_tier_info() {
        let table = TierTable::default();
        let info = TierInfo::compute(&table, Tier::Silver, Decimal::from(1200));
        assert_eq!(info.next_tier, Some(Tier::Gold));
        assert_eq!(info.points_to_next_tier, Decimal::from(3800));
        assert_eq!(info.current_multiplier, Decimal::new(12, 1));

        let info = TierInfo::compute(&table, Tier::Platinum, Decimal::from(20000));
        assert_eq!(info.next_tier, None);
        assert_eq!(info.points_to_next_tier, Decimal::ZERO);
    }
}
