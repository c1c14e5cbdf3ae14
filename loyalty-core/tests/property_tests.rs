//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Non-negativity: no operation sequence drives a balance negative
//! - Conservation: gifts and transfers move points, never create them
//! - Milestone idempotency: each threshold pays at most once
//! - Tier monotonicity: upgrades only ever move up

use loyalty_core::{
    CheckMilestonesRequest, Config, GiftRequest, Identity, IssueRequest, Ledger, PoolType,
    RedeemRequest, Scope, Tier, TransferRequest, UpgradeTierRequest, UserId,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Strategy for generating valid point amounts
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1u64..100_000u64).prop_map(Decimal::from)
}

/// One step of a random operation sequence
#[derive(Debug, Clone)]
enum Op {
    Issue(u64),
    Redeem(u64),
    Gift(u64),
    Transfer(u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u64..5_000).prop_map(Op::Issue),
        (1u64..5_000).prop_map(Op::Redeem),
        (1u64..5_000).prop_map(Op::Gift),
        (1u64..5_000).prop_map(Op::Transfer),
    ]
}

/// Create test ledger with temp directory
fn create_test_ledger() -> (Ledger, tempfile::TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();

    (Ledger::open(config).unwrap(), temp_dir)
}

fn town_scope() -> Scope {
    Scope::Pool(PoolType::TownTicks)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: issuing a positive amount always succeeds and credits in full
    #[test]
    fn prop_positive_issue_accepted(amount in amount_strategy()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _dir) = create_test_ledger();

            let receipt = ledger
                .issue(IssueRequest::new(
                    Identity::business("op", "B1"),
                    UserId::new("u1"),
                    town_scope(),
                    amount,
                ))
                .await
                .unwrap();
            prop_assert_eq!(receipt.balance.points_available, amount);
            prop_assert_eq!(receipt.balance.points_issued, amount);
            prop_assert!(receipt.balance.invariant_holds());

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: no operation sequence drives any balance negative, and the
    /// system-wide available total equals accepted issues minus accepted
    /// redemptions
    #[test]
    fn prop_random_ops_preserve_invariants(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _dir) = create_test_ledger();
            let business = Identity::business("op", "B1");
            let actor = Identity::citizen("u1");

            let mut issued = Decimal::ZERO;
            let mut redeemed = Decimal::ZERO;

            for op in &ops {
                match op {
                    Op::Issue(n) => {
                        let amount = Decimal::from(*n);
                        ledger
                            .issue(IssueRequest::new(
                                business.clone(),
                                UserId::new("u1"),
                                town_scope(),
                                amount,
                            ))
                            .await
                            .unwrap();
                        issued += amount;
                    }
                    Op::Redeem(n) => {
                        let amount = Decimal::from(*n);
                        if ledger
                            .redeem(RedeemRequest {
                                actor: actor.clone(),
                                scope: town_scope(),
                                amount,
                                qr_code_data: None,
                                description: None,
                            })
                            .await
                            .is_ok()
                        {
                            redeemed += amount;
                        }
                    }
                    Op::Gift(n) => {
                        // Conserving: failure or success both keep the total
                        let _ = ledger
                            .gift(GiftRequest {
                                actor: actor.clone(),
                                recipient_user_id: UserId::new("u2"),
                                recipient_email: None,
                                scope: town_scope(),
                                amount: Decimal::from(*n),
                                description: None,
                                policy: None,
                            })
                            .await;
                    }
                    Op::Transfer(n) => {
                        let _ = ledger
                            .transfer(TransferRequest {
                                actor: actor.clone(),
                                from_scope: town_scope(),
                                to_scope: Scope::Global,
                                amount: Decimal::from(*n),
                                description: None,
                            })
                            .await;
                    }
                }
            }

            for user in ["u1", "u2"] {
                for balance in ledger.balances_for_user(&UserId::new(user)).unwrap() {
                    prop_assert!(balance.points_available >= Decimal::ZERO);
                    prop_assert!(balance.invariant_holds());
                }
            }

            let totals = ledger.pool_totals().unwrap();
            prop_assert_eq!(totals.total_available, issued - redeemed);

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: a gift moves points without changing the combined total
    #[test]
    fn prop_gift_conserves_points(
        issued in 1u64..100_000,
        gift_fraction in 1u64..100,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _dir) = create_test_ledger();
            let issued = Decimal::from(issued);
            let gifted = (issued * Decimal::from(gift_fraction) / Decimal::from(100))
                .max(Decimal::ONE);

            ledger
                .issue(IssueRequest::new(
                    Identity::business("op", "B1"),
                    UserId::new("sender"),
                    town_scope(),
                    issued,
                ))
                .await
                .unwrap();

            let receipt = ledger
                .gift(GiftRequest {
                    actor: Identity::citizen("sender"),
                    recipient_user_id: UserId::new("recipient"),
                    recipient_email: None,
                    scope: town_scope(),
                    amount: gifted,
                    description: None,
                    policy: None,
                })
                .await
                .unwrap();

            let recipient = receipt.recipient_balance.unwrap();
            prop_assert_eq!(
                receipt.balance.points_available + recipient.points_available,
                issued
            );
            prop_assert_eq!(receipt.balance.points_gifted, gifted);
            prop_assert_eq!(recipient.points_available, gifted);

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: re-running the milestone check never awards twice
    #[test]
    fn prop_milestone_awards_are_idempotent(issued in 1u64..20_000) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _dir) = create_test_ledger();

            ledger
                .issue(IssueRequest::new(
                    Identity::business("op", "B1"),
                    UserId::new("u1"),
                    town_scope(),
                    Decimal::from(issued),
                ))
                .await
                .unwrap();

            let first = ledger
                .check_milestones(CheckMilestonesRequest {
                    actor: Identity::citizen("u1"),
                    scope: town_scope(),
                    policy: None,
                })
                .await
                .unwrap();
            let second = ledger
                .check_milestones(CheckMilestonesRequest {
                    actor: Identity::citizen("u1"),
                    scope: town_scope(),
                    policy: None,
                })
                .await
                .unwrap();

            // Every default threshold at or below the issued amount pays in
            // the first call; nothing pays twice
            let expected = [100u64, 500, 1000, 5000, 10000]
                .iter()
                .filter(|t| **t <= issued)
                .count();
            prop_assert_eq!(first.reached.len(), expected);
            prop_assert_eq!(second.reached.len(), 0);
            prop_assert_eq!(second.total_bonus_awarded, Decimal::ZERO);

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: repeated upgrade attempts never move the tier down, and each
    /// success advances exactly one step
    #[test]
    fn prop_tier_never_regresses(issued in 1u64..50_000) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _dir) = create_test_ledger();

            ledger
                .issue(IssueRequest::new(
                    Identity::business("op", "B1"),
                    UserId::new("u1"),
                    town_scope(),
                    Decimal::from(issued),
                ))
                .await
                .unwrap();

            let mut current = Tier::Bronze;
            for _ in 0..4 {
                match ledger
                    .upgrade_tier(UpgradeTierRequest {
                        actor: Identity::citizen("u1"),
                        scope: town_scope(),
                        policy: None,
                    })
                    .await
                {
                    Ok(receipt) => {
                        prop_assert!(receipt.new_tier > receipt.previous_tier);
                        prop_assert_eq!(receipt.previous_tier, current);
                        current = receipt.new_tier;
                    }
                    Err(_) => break,
                }
            }

            let expected = if issued >= 10_000 {
                Tier::Platinum
            } else if issued >= 5_000 {
                Tier::Gold
            } else if issued >= 1_000 {
                Tier::Silver
            } else {
                Tier::Bronze
            };
            prop_assert_eq!(current, expected);

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use loyalty_core::{Error, TransactionFilter, TransactionType};

    #[tokio::test]
    async fn test_full_loyalty_lifecycle() {
        let (ledger, _dir) = create_test_ledger();
        let business = Identity::business("op", "B1");
        let customer = Identity::citizen("alice");

        // 1. Purchases accumulate points
        for _ in 0..3 {
            ledger
                .issue(IssueRequest::new(
                    business.clone(),
                    UserId::new("alice"),
                    town_scope(),
                    Decimal::from(400),
                ))
                .await
                .unwrap();
        }

        // 2. Milestones 100, 500 and 1000 pay out
        let milestones = ledger
            .check_milestones(CheckMilestonesRequest {
                actor: customer.clone(),
                scope: town_scope(),
                policy: None,
            })
            .await
            .unwrap();
        assert_eq!(milestones.total_bonus_awarded, Decimal::from(160));

        // 3. 1360 issued clears the silver threshold
        let upgrade = ledger
            .upgrade_tier(UpgradeTierRequest {
                actor: customer.clone(),
                scope: town_scope(),
                policy: None,
            })
            .await
            .unwrap();
        assert_eq!(upgrade.new_tier, Tier::Silver);
        assert_eq!(upgrade.new_multiplier, Decimal::new(12, 1));

        // 4. Redeem part of the balance in-store
        let receipt = ledger
            .redeem(RedeemRequest {
                actor: customer.clone(),
                scope: town_scope(),
                amount: Decimal::from(300),
                qr_code_data: None,
                description: None,
            })
            .await
            .unwrap();
        assert_eq!(receipt.balance.points_available, Decimal::from(1060));

        // 5. Gift some to a friend
        ledger
            .gift(GiftRequest {
                actor: customer.clone(),
                recipient_user_id: UserId::new("bob"),
                recipient_email: None,
                scope: town_scope(),
                amount: Decimal::from(60),
                description: None,
                policy: None,
            })
            .await
            .unwrap();

        // Ledger rows tell the whole story in order
        let history = ledger
            .transaction_history(&UserId::new("alice"), &TransactionFilter::default())
            .unwrap();
        let kinds: Vec<TransactionType> =
            history.iter().map(|t| t.transaction_type).collect();
        assert_eq!(
            kinds,
            vec![
                TransactionType::Issue,
                TransactionType::Issue,
                TransactionType::Issue,
                TransactionType::MilestoneBonus,
                TransactionType::MilestoneBonus,
                TransactionType::MilestoneBonus,
                TransactionType::TierBonus,
                TransactionType::Redeem,
                TransactionType::Gift,
            ]
        );

        let summary = ledger.activity_summary(&UserId::new("alice")).unwrap();
        assert_eq!(summary.total_issued, Decimal::from(1200));
        assert_eq!(summary.total_redeemed, Decimal::from(300));
        assert_eq!(summary.total_gifted, Decimal::from(60));
        assert_eq!(summary.total_bonus, Decimal::from(160));

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_insufficient_then_retry_succeeds() {
        let (ledger, _dir) = create_test_ledger();
        ledger
            .issue(IssueRequest::new(
                Identity::business("op", "B1"),
                UserId::new("u1"),
                town_scope(),
                Decimal::from(100),
            ))
            .await
            .unwrap();

        let err = ledger
            .redeem(RedeemRequest {
                actor: Identity::citizen("u1"),
                scope: town_scope(),
                amount: Decimal::from(150),
                qr_code_data: None,
                description: None,
            })
            .await
            .unwrap_err();
        match err {
            Error::InsufficientBalance {
                available,
                requested,
            } => {
                assert_eq!(available, Decimal::from(100));
                assert_eq!(requested, Decimal::from(150));
            }
            other => panic!("unexpected error: {other}"),
        }

        // A smaller retry goes through against the untouched balance
        let receipt = ledger
            .redeem(RedeemRequest {
                actor: Identity::citizen("u1"),
                scope: town_scope(),
                amount: Decimal::from(100),
                qr_code_data: None,
                description: None,
            })
            .await
            .unwrap();
        assert_eq!(receipt.balance.points_available, Decimal::ZERO);

        ledger.shutdown().await.unwrap();
    }
}
