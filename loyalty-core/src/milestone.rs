//! Milestone policy
//!
//! Cumulative-points thresholds that trigger a one-time bonus award. The
//! schedule is configuration (overridable per tenant); the "already
//! awarded" check lives in the ledger, keyed by the threshold label.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One milestone: a threshold and the bonus units it grants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneRule {
    /// Cumulative issued-points threshold
    pub threshold: u64,
    /// Bonus points per multiplier unit awarded on reaching it
    pub bonus: Decimal,
}

/// Ordered milestone schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneSchedule {
    /// Rules, kept sorted by threshold ascending
    rules: Vec<MilestoneRule>,
}

impl Default for MilestoneSchedule {
    fn default() -> Self {
        Self::new(vec![
            MilestoneRule { threshold: 100, bonus: Decimal::from(10) },
            MilestoneRule { threshold: 500, bonus: Decimal::from(50) },
            MilestoneRule { threshold: 1000, bonus: Decimal::from(100) },
            MilestoneRule { threshold: 5000, bonus: Decimal::from(500) },
            MilestoneRule { threshold: 10000, bonus: Decimal::from(1000) },
        ])
    }
}

impl MilestoneSchedule {
    /// Build a schedule; rules are sorted and deduplicated by threshold
    pub fn new(mut rules: Vec<MilestoneRule>) -> Self {
        rules.sort_by_key(|r| r.threshold);
        rules.dedup_by_key(|r| r.threshold);
        Self { rules }
    }

    /// All rules, threshold ascending
    pub fn rules(&self) -> &[MilestoneRule] {
        &self.rules
    }

    /// Rules whose threshold the given cumulative total has reached
    pub fn reached(&self, points_issued: Decimal) -> impl Iterator<Item = &MilestoneRule> {
        self.rules
            .iter()
            .take_while(move |r| Decimal::from(r.threshold) <= points_issued)
    }

    /// Marker label recorded on the award transaction
    pub fn marker(rule: &MilestoneRule) -> String {
        rule.threshold.to_string()
    }
}

/// Progress toward one milestone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestoneProgress {
    /// Threshold
    pub threshold: u64,
    /// Bonus units at this threshold
    pub bonus: Decimal,
    /// Whether the cumulative total has reached it
    pub is_reached: bool,
    /// Progress percentage, capped at 100
    pub progress: Decimal,
}

/// Full progress report over a schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestoneReport {
    /// Cumulative issued points the report was computed from
    pub total_points: Decimal,
    /// Per-milestone progress, threshold ascending
    pub milestones: Vec<MilestoneProgress>,
    /// First unreached milestone, if any
    pub next_milestone: Option<u64>,
}

impl MilestoneReport {
    /// Compute the report for a cumulative total
    pub fn compute(schedule: &MilestoneSchedule, points_issued: Decimal) -> Self {
        let hundred = Decimal::from(100);
        let milestones: Vec<MilestoneProgress> = schedule
            .rules()
            .iter()
            .map(|rule| {
                let threshold = Decimal::from(rule.threshold);
                let is_reached = points_issued >= threshold;
                let progress = if is_reached {
                    hundred
                } else {
                    (points_issued / threshold * hundred).round_dp(2)
                };
                MilestoneProgress {
                    threshold: rule.threshold,
                    bonus: rule.bonus,
                    is_reached,
                    progress,
                }
            })
            .collect();
        let next_milestone = milestones
            .iter()
            .find(|m| !m.is_reached)
            .map(|m| m.threshold);
        Self {
            total_points: points_issued,
            milestones,
            next_milestone,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let schedule = MilestoneSchedule::default();
        let thresholds: Vec<u64> = schedule.rules().iter().map(|r| r.threshold).collect();
        assert_eq!(thresholds, vec![100, 500, 1000, 5000, 10000]);
        assert_eq!(schedule.rules()[0].bonus, Decimal::from(10));
    }

    #[test]
    fn test_reached_respects_boundary() {
        let schedule = MilestoneSchedule::default();
        let reached: Vec<u64> = schedule
            .reached(Decimal::from(500))
            .map(|r| r.threshold)
            .collect();
        assert_eq!(reached, vec![100, 500]);

        assert_eq!(schedule.reached(Decimal::from(99)).count(), 0);
    }

    #[test]
    fn test_rules_sorted_and_deduped() {
        let schedule = MilestoneSchedule::new(vec![
            MilestoneRule { threshold: 500, bonus: Decimal::from(50) },
            MilestoneRule { threshold: 100, bonus: Decimal::from(10) },
            MilestoneRule { threshold: 100, bonus: Decimal::from(99) },
        ]);
        let thresholds: Vec<u64> = schedule.rules().iter().map(|r| r.threshold).collect();
        assert_eq!(thresholds, vec![100, 500]);
    }

    #[test]
    fn test_progress_report() {
        let schedule = MilestoneSchedule::default();
        let report = MilestoneReport::compute(&schedule, Decimal::from(250));
        assert!(report.milestones[0].is_reached);
        assert!(!report.milestones[1].is_reached);
        assert_eq!(report.milestones[1].progress, Decimal::from(50));
        assert_eq!(report.next_milestone, Some(500));
    }
}
