//! Ledger operations engine
//!
//! Each operation is a single-shot transition following one template:
//! validate precondition → compute delta(s) → apply to balance record(s) →
//! append exactly one transaction row → return a snapshot. Failure of any
//! precondition aborts before any mutation. The engine runs inside the
//! single-writer actor, so each operation's read-modify-write is naturally
//! serialized.

use crate::balance::{Balance, BalanceDelta, BalanceKey};
use crate::config::PolicyConfig;
use crate::error::{Error, Result};
use crate::milestone::MilestoneSchedule;
use crate::storage::Storage;
use crate::tier::Tier;
use crate::types::{
    base_transaction, Identity, LoyaltyTransaction, PointType, Role, Scope, TransactionId,
    TransactionType, UserId,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

/// Issue points to a customer
#[derive(Debug, Clone)]
pub struct IssueRequest {
    /// Acting identity (typically a business operator)
    pub actor: Identity,
    /// Customer receiving the points
    pub customer_user_id: UserId,
    /// Balance scope credited
    pub scope: Scope,
    /// Points to issue, must be positive
    pub amount: Decimal,
    /// Purchase cash amount, if any
    pub cash_amount: Decimal,
    /// Point classifier
    pub point_type: PointType,
    /// Optional description
    pub description: Option<String>,
    /// Additional metadata
    pub metadata: HashMap<String, String>,
}

impl IssueRequest {
    /// Minimal request with defaults
    pub fn new(actor: Identity, customer_user_id: UserId, scope: Scope, amount: Decimal) -> Self {
        Self {
            actor,
            customer_user_id,
            scope,
            amount,
            cash_amount: Decimal::ZERO,
            point_type: PointType::Regular,
            description: None,
            metadata: HashMap::new(),
        }
    }

    fn validate(&self) -> Result<()> {
        require_positive("points_amount", self.amount)?;
        require_non_negative("cash_amount", self.cash_amount)
    }
}

/// Redeem points from the actor's own balance
#[derive(Debug, Clone)]
pub struct RedeemRequest {
    /// Acting identity (the redeeming user)
    pub actor: Identity,
    /// Balance scope debited
    pub scope: Scope,
    /// Points to redeem, must be positive
    pub amount: Decimal,
    /// Scanned redemption payload, if redeemed via QR
    pub qr_code_data: Option<String>,
    /// Optional description
    pub description: Option<String>,
}

impl RedeemRequest {
    fn validate(&self) -> Result<()> {
        require_positive("points_amount", self.amount)
    }
}

/// Gift points to another user in the same pool
#[derive(Debug, Clone)]
pub struct GiftRequest {
    /// Acting identity (the sender)
    pub actor: Identity,
    /// Gift recipient
    pub recipient_user_id: UserId,
    /// Recipient email, recorded on the transaction
    pub recipient_email: Option<String>,
    /// Shared scope of sender and recipient
    pub scope: Scope,
    /// Points to gift, must be positive
    pub amount: Decimal,
    /// Optional description
    pub description: Option<String>,
    /// Tenant policy override
    pub policy: Option<PolicyConfig>,
}

impl GiftRequest {
    fn validate(&self) -> Result<()> {
        require_positive("points_amount", self.amount)?;
        if self.recipient_user_id == self.actor.user_id {
            return Err(Error::Validation(
                "cannot gift points to yourself".to_string(),
            ));
        }
        Ok(())
    }
}

/// Move points between two of the actor's own pools
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Acting identity
    pub actor: Identity,
    /// Source scope, debited
    pub from_scope: Scope,
    /// Destination scope, credited
    pub to_scope: Scope,
    /// Points to move, must be positive
    pub amount: Decimal,
    /// Optional description
    pub description: Option<String>,
}

impl TransferRequest {
    fn validate(&self) -> Result<()> {
        require_positive("points_amount", self.amount)?;
        if self.from_scope == self.to_scope {
            return Err(Error::Validation(
                "transfer source and destination scopes must differ".to_string(),
            ));
        }
        Ok(())
    }
}

/// Import points from an external pool
#[derive(Debug, Clone)]
pub struct ImportRequest {
    /// Acting identity
    pub actor: Identity,
    /// Balance scope credited
    pub scope: Scope,
    /// Points to import, must be positive
    pub amount: Decimal,
    /// Source pool label, defaults to "external"
    pub source_pool: Option<String>,
    /// Optional description
    pub description: Option<String>,
    /// Tenant policy override
    pub policy: Option<PolicyConfig>,
}

impl ImportRequest {
    fn validate(&self) -> Result<()> {
        require_positive("points_amount", self.amount)
    }
}

/// Export points to an external pool
#[derive(Debug, Clone)]
pub struct ExportRequest {
    /// Acting identity
    pub actor: Identity,
    /// Balance scope debited
    pub scope: Scope,
    /// Points to export, must be positive
    pub amount: Decimal,
    /// Destination pool label, defaults to "external"
    pub destination_pool: Option<String>,
    /// Optional description
    pub description: Option<String>,
    /// Tenant policy override
    pub policy: Option<PolicyConfig>,
}

impl ExportRequest {
    fn validate(&self) -> Result<()> {
        require_positive("points_amount", self.amount)
    }
}

/// Expire points from a user's balance (admin capability)
#[derive(Debug, Clone)]
pub struct ExpireRequest {
    /// Acting identity, must be an admin
    pub actor: Identity,
    /// User whose points expire
    pub user_id: UserId,
    /// Balance scope debited
    pub scope: Scope,
    /// Points to expire, must be positive
    pub amount: Decimal,
    /// Optional description
    pub description: Option<String>,
}

impl ExpireRequest {
    fn validate(&self) -> Result<()> {
        require_positive("points_amount", self.amount)
    }
}

/// Issue cashback to a customer
#[derive(Debug, Clone)]
pub struct CashbackIssueRequest {
    /// Acting identity (typically a business operator)
    pub actor: Identity,
    /// Customer receiving the cashback
    pub customer_user_id: UserId,
    /// Balance scope credited
    pub scope: Scope,
    /// Cashback amount, must be positive
    pub amount: Decimal,
    /// Purchase cash amount, if any
    pub cash_amount: Decimal,
    /// Optional description
    pub description: Option<String>,
}

impl CashbackIssueRequest {
    fn validate(&self) -> Result<()> {
        require_positive("cashback_amount", self.amount)?;
        require_non_negative("cash_amount", self.cash_amount)
    }
}

/// Redeem cashback from the actor's own balance
#[derive(Debug, Clone)]
pub struct CashbackRedeemRequest {
    /// Acting identity
    pub actor: Identity,
    /// Balance scope debited
    pub scope: Scope,
    /// Cashback amount, must be positive
    pub amount: Decimal,
    /// Optional description
    pub description: Option<String>,
}

impl CashbackRedeemRequest {
    fn validate(&self) -> Result<()> {
        require_positive("cashback_amount", self.amount)
    }
}

/// Upgrade the actor's tier in a scope
#[derive(Debug, Clone)]
pub struct UpgradeTierRequest {
    /// Acting identity
    pub actor: Identity,
    /// Balance scope holding the tier
    pub scope: Scope,
    /// Tenant policy override
    pub policy: Option<PolicyConfig>,
}

/// Check and award newly reached milestones for the actor
#[derive(Debug, Clone)]
pub struct CheckMilestonesRequest {
    /// Acting identity
    pub actor: Identity,
    /// Balance scope evaluated
    pub scope: Scope,
    /// Tenant policy override
    pub policy: Option<PolicyConfig>,
}

fn require_positive(field: &str, value: Decimal) -> Result<()> {
    if value <= Decimal::ZERO {
        return Err(Error::Validation(format!("{} must be positive", field)));
    }
    Ok(())
}

fn require_non_negative(field: &str, value: Decimal) -> Result<()> {
    if value < Decimal::ZERO {
        return Err(Error::Validation(format!(
            "{} must not be negative",
            field
        )));
    }
    Ok(())
}

/// Snapshot returned by a single-balance (or gift/transfer) operation
#[derive(Debug, Clone)]
pub struct OperationReceipt {
    /// The appended transaction row
    pub transaction: LoyaltyTransaction,
    /// Primary balance after the operation
    pub balance: Balance,
    /// Recipient/destination balance, for gift and transfer
    pub recipient_balance: Option<Balance>,
}

/// Snapshot returned by a tier upgrade
#[derive(Debug, Clone)]
pub struct TierUpgradeReceipt {
    /// Tier before the upgrade
    pub previous_tier: Tier,
    /// Tier after the upgrade
    pub new_tier: Tier,
    /// Multiplier after the upgrade
    pub new_multiplier: Decimal,
    /// Bonus points issued with the upgrade (zero when disabled)
    pub bonus_awarded: Decimal,
    /// The appended tier_bonus row
    pub transaction: LoyaltyTransaction,
    /// Balance after the upgrade
    pub balance: Balance,
}

/// One newly awarded milestone
#[derive(Debug, Clone)]
pub struct MilestoneAward {
    /// Threshold that was reached
    pub threshold: u64,
    /// Bonus points awarded for it
    pub bonus_awarded: Decimal,
    /// The appended milestone_bonus row
    pub transaction_id: TransactionId,
}

/// Snapshot returned by a milestone check
#[derive(Debug, Clone)]
pub struct MilestoneCheckReceipt {
    /// Milestones newly awarded by this call, threshold ascending
    pub reached: Vec<MilestoneAward>,
    /// Total bonus points awarded by this call
    pub total_bonus_awarded: Decimal,
    /// Balance after any awards
    pub balance: Balance,
}

/// The operations engine
///
/// Owns no mutable state; all state lives in storage. Must only be driven
/// from the single-writer actor for the serialization guarantees to hold.
pub struct Engine {
    storage: Arc<Storage>,
    default_policy: PolicyConfig,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine over a storage handle
    pub fn new(storage: Arc<Storage>, default_policy: PolicyConfig) -> Self {
        Self {
            storage,
            default_policy,
        }
    }

    fn policy<'a>(&'a self, override_policy: &'a Option<PolicyConfig>) -> &'a PolicyConfig {
        override_policy.as_ref().unwrap_or(&self.default_policy)
    }

    /// Issue points to a customer
    pub fn issue(&self, req: &IssueRequest) -> Result<OperationReceipt> {
        req.validate()?;

        let key = BalanceKey::new(req.customer_user_id.clone(), req.scope.clone());
        let mut balance = self.storage.get_or_create_balance(&key)?;
        balance.apply(&BalanceDelta::issue(req.amount))?;

        let mut txn = base_transaction(
            req.customer_user_id.clone(),
            req.scope.clone(),
            TransactionType::Issue,
            req.point_type,
            req.amount,
            balance.tier_multiplier,
        );
        txn.business_id = req.actor.business_id.clone();
        txn.cash_amount = req.cash_amount;
        txn.description = Some(
            req.description
                .clone()
                .unwrap_or_else(|| "Points issued".to_string()),
        );
        txn.metadata = req.metadata.clone();

        self.storage.commit_operation(&[&balance], &txn, None)?;

        tracing::info!(
            user_id = %req.customer_user_id,
            scope = %req.scope,
            amount = %req.amount,
            "Points issued"
        );

        Ok(OperationReceipt {
            transaction: txn,
            balance,
            recipient_balance: None,
        })
    }

    /// Redeem points from the actor's balance
    pub fn redeem(&self, req: &RedeemRequest) -> Result<OperationReceipt> {
        req.validate()?;

        let key = BalanceKey::new(req.actor.user_id.clone(), req.scope.clone());
        let mut balance = self.storage.get_or_create_balance(&key)?;
        balance.apply(&BalanceDelta::redeem(req.amount))?;

        let mut txn = base_transaction(
            req.actor.user_id.clone(),
            req.scope.clone(),
            TransactionType::Redeem,
            PointType::Regular,
            req.amount,
            balance.tier_multiplier,
        );
        txn.qr_code_data = req.qr_code_data.clone();
        txn.description = Some(req.description.clone().unwrap_or_else(|| {
            format!("Points redeemed from {} pool", req.scope.label())
        }));

        self.storage.commit_operation(&[&balance], &txn, None)?;

        tracing::info!(
            user_id = %req.actor.user_id,
            scope = %req.scope,
            amount = %req.amount,
            "Points redeemed"
        );

        Ok(OperationReceipt {
            transaction: txn,
            balance,
            recipient_balance: None,
        })
    }

    /// Gift points to another user in the same pool
    ///
    /// Both balances and the transaction row commit in one write batch; a
    /// half-applied gift cannot be observed.
    pub fn gift(&self, req: &GiftRequest) -> Result<OperationReceipt> {
        req.validate()?;
        let policy = self.policy(&req.policy);

        let pool_allowed = match req.scope.pool_type() {
            None => true, // Global scope in the single-pool deployment
            Some(pool) => policy.gift_pools.contains(&pool),
        };
        if !pool_allowed {
            return Err(Error::Forbidden(format!(
                "gifting is not permitted in the {} pool",
                req.scope.label()
            )));
        }

        let sender_key = BalanceKey::new(req.actor.user_id.clone(), req.scope.clone());
        let mut sender = self.storage.get_or_create_balance(&sender_key)?;
        sender.apply(&BalanceDelta::gift_out(req.amount))?;

        let recipient_key = BalanceKey::new(req.recipient_user_id.clone(), req.scope.clone());
        let mut recipient = self.storage.get_or_create_balance(&recipient_key)?;
        recipient.apply(&BalanceDelta::issue(req.amount))?;

        let mut txn = base_transaction(
            req.actor.user_id.clone(),
            req.scope.clone(),
            TransactionType::Gift,
            PointType::Regular,
            req.amount,
            sender.tier_multiplier,
        );
        txn.recipient_user_id = Some(req.recipient_user_id.clone());
        txn.recipient_email = req.recipient_email.clone();
        txn.description = Some(req.description.clone().unwrap_or_else(|| {
            format!("Points gifted to user {}", req.recipient_user_id)
        }));

        self.storage
            .commit_operation(&[&sender, &recipient], &txn, None)?;

        tracing::info!(
            sender = %req.actor.user_id,
            recipient = %req.recipient_user_id,
            scope = %req.scope,
            amount = %req.amount,
            "Points gifted"
        );

        Ok(OperationReceipt {
            transaction: txn,
            balance: sender,
            recipient_balance: Some(recipient),
        })
    }

    /// Move points between two of the actor's pools
    pub fn transfer(&self, req: &TransferRequest) -> Result<OperationReceipt> {
        req.validate()?;

        let source_key = BalanceKey::new(req.actor.user_id.clone(), req.from_scope.clone());
        let mut source = self.storage.get_or_create_balance(&source_key)?;
        source.apply(&BalanceDelta::transfer_out(req.amount))?;

        let dest_key = BalanceKey::new(req.actor.user_id.clone(), req.to_scope.clone());
        let mut destination = self.storage.get_or_create_balance(&dest_key)?;
        destination.apply(&BalanceDelta::issue(req.amount))?;

        let mut txn = base_transaction(
            req.actor.user_id.clone(),
            req.from_scope.clone(),
            TransactionType::Transfer,
            PointType::Regular,
            req.amount,
            source.tier_multiplier,
        );
        txn.source_pool = Some(req.from_scope.label());
        txn.destination_pool = Some(req.to_scope.label());
        txn.description = Some(req.description.clone().unwrap_or_else(|| {
            format!(
                "Points transferred from {} to {}",
                req.from_scope.label(),
                req.to_scope.label()
            )
        }));

        self.storage
            .commit_operation(&[&source, &destination], &txn, None)?;

        tracing::info!(
            user_id = %req.actor.user_id,
            from = %req.from_scope,
            to = %req.to_scope,
            amount = %req.amount,
            "Points transferred"
        );

        Ok(OperationReceipt {
            transaction: txn,
            balance: source,
            recipient_balance: Some(destination),
        })
    }

    /// Import points from an external pool
    pub fn import(&self, req: &ImportRequest) -> Result<OperationReceipt> {
        req.validate()?;
        let policy = self.policy(&req.policy);

        if !policy.allow_import {
            return Err(Error::Forbidden(
                "import is not allowed for this user".to_string(),
            ));
        }

        let key = BalanceKey::new(req.actor.user_id.clone(), req.scope.clone());
        let mut balance = self.storage.get_or_create_balance(&key)?;
        balance.apply(&BalanceDelta::issue(req.amount))?;

        let source_pool = req
            .source_pool
            .clone()
            .unwrap_or_else(|| "external".to_string());
        let mut txn = base_transaction(
            req.actor.user_id.clone(),
            req.scope.clone(),
            TransactionType::Import,
            PointType::Regular,
            req.amount,
            balance.tier_multiplier,
        );
        txn.source_pool = Some(source_pool.clone());
        txn.destination_pool = Some(req.scope.label());
        txn.description = Some(req.description.clone().unwrap_or_else(|| {
            format!("Points imported to {} from {}", req.scope.label(), source_pool)
        }));

        self.storage.commit_operation(&[&balance], &txn, None)?;

        tracing::info!(
            user_id = %req.actor.user_id,
            scope = %req.scope,
            amount = %req.amount,
            source_pool = %source_pool,
            "Points imported"
        );

        Ok(OperationReceipt {
            transaction: txn,
            balance,
            recipient_balance: None,
        })
    }

    /// Export points to an external pool
    pub fn export(&self, req: &ExportRequest) -> Result<OperationReceipt> {
        req.validate()?;
        let policy = self.policy(&req.policy);

        if !policy.allow_export {
            return Err(Error::Forbidden(
                "export is not allowed for this user".to_string(),
            ));
        }

        let key = BalanceKey::new(req.actor.user_id.clone(), req.scope.clone());
        let mut balance = self.storage.get_or_create_balance(&key)?;
        balance.apply(&BalanceDelta::transfer_out(req.amount))?;

        let destination_pool = req
            .destination_pool
            .clone()
            .unwrap_or_else(|| "external".to_string());
        let mut txn = base_transaction(
            req.actor.user_id.clone(),
            req.scope.clone(),
            TransactionType::Export,
            PointType::Regular,
            req.amount,
            balance.tier_multiplier,
        );
        txn.source_pool = Some(req.scope.label());
        txn.destination_pool = Some(destination_pool.clone());
        txn.description = Some(req.description.clone().unwrap_or_else(|| {
            format!(
                "Points exported from {} to {}",
                req.scope.label(),
                destination_pool
            )
        }));

        self.storage.commit_operation(&[&balance], &txn, None)?;

        tracing::info!(
            user_id = %req.actor.user_id,
            scope = %req.scope,
            amount = %req.amount,
            destination_pool = %destination_pool,
            "Points exported"
        );

        Ok(OperationReceipt {
            transaction: txn,
            balance,
            recipient_balance: None,
        })
    }

    /// Expire points from a user's balance
    pub fn expire(&self, req: &ExpireRequest) -> Result<OperationReceipt> {
        req.validate()?;

        if req.actor.role != Role::Admin {
            return Err(Error::Forbidden(
                "expiring points requires the admin role".to_string(),
            ));
        }

        let key = BalanceKey::new(req.user_id.clone(), req.scope.clone());
        let mut balance = self.storage.get_or_create_balance(&key)?;
        balance.apply(&BalanceDelta::expire(req.amount))?;

        let mut txn = base_transaction(
            req.user_id.clone(),
            req.scope.clone(),
            TransactionType::Expire,
            PointType::Regular,
            req.amount,
            balance.tier_multiplier,
        );
        txn.description = Some(
            req.description
                .clone()
                .unwrap_or_else(|| "Points expired".to_string()),
        );

        self.storage.commit_operation(&[&balance], &txn, None)?;

        tracing::info!(
            user_id = %req.user_id,
            scope = %req.scope,
            amount = %req.amount,
            "Points expired"
        );

        Ok(OperationReceipt {
            transaction: txn,
            balance,
            recipient_balance: None,
        })
    }

    /// Issue cashback to a customer
    pub fn cashback_issue(&self, req: &CashbackIssueRequest) -> Result<OperationReceipt> {
        req.validate()?;

        let key = BalanceKey::new(req.customer_user_id.clone(), req.scope.clone());
        let mut balance = self.storage.get_or_create_balance(&key)?;
        balance.apply(&BalanceDelta::cashback_issue(req.amount))?;

        let mut txn = base_transaction(
            req.customer_user_id.clone(),
            req.scope.clone(),
            TransactionType::CashbackIssue,
            PointType::Regular,
            Decimal::ZERO,
            balance.tier_multiplier,
        );
        txn.business_id = req.actor.business_id.clone();
        txn.cashback_amount = req.amount;
        txn.cash_amount = req.cash_amount;
        txn.description = Some(
            req.description
                .clone()
                .unwrap_or_else(|| "Cashback issued".to_string()),
        );

        self.storage.commit_operation(&[&balance], &txn, None)?;

        tracing::info!(
            user_id = %req.customer_user_id,
            scope = %req.scope,
            amount = %req.amount,
            "Cashback issued"
        );

        Ok(OperationReceipt {
            transaction: txn,
            balance,
            recipient_balance: None,
        })
    }

    /// Redeem cashback from the actor's balance
    pub fn cashback_redeem(&self, req: &CashbackRedeemRequest) -> Result<OperationReceipt> {
        req.validate()?;

        let key = BalanceKey::new(req.actor.user_id.clone(), req.scope.clone());
        let mut balance = self.storage.get_or_create_balance(&key)?;
        balance.apply(&BalanceDelta::cashback_redeem(req.amount))?;

        let mut txn = base_transaction(
            req.actor.user_id.clone(),
            req.scope.clone(),
            TransactionType::CashbackRedeem,
            PointType::Regular,
            Decimal::ZERO,
            balance.tier_multiplier,
        );
        txn.cashback_amount = req.amount;
        txn.description = Some(
            req.description
                .clone()
                .unwrap_or_else(|| "Cashback redeemed".to_string()),
        );

        self.storage.commit_operation(&[&balance], &txn, None)?;

        tracing::info!(
            user_id = %req.actor.user_id,
            scope = %req.scope,
            amount = %req.amount,
            "Cashback redeemed"
        );

        Ok(OperationReceipt {
            transaction: txn,
            balance,
            recipient_balance: None,
        })
    }

    /// Upgrade the actor's tier
    ///
    /// One `tier_bonus` row is always appended (bonus may be zero) so the
    /// tier mutation pairs with a ledger entry; the row's `tier_upgraded`
    /// marker doubles as the uniqueness guard.
    pub fn upgrade_tier(&self, req: &UpgradeTierRequest) -> Result<TierUpgradeReceipt> {
        let policy = self.policy(&req.policy);

        let key = BalanceKey::new(req.actor.user_id.clone(), req.scope.clone());
        let mut balance = self.storage.get_balance(&key)?.ok_or_else(|| {
            Error::NotFound(format!(
                "no balance for user {} in scope {}",
                req.actor.user_id, req.scope
            ))
        })?;

        let previous_tier = balance.current_tier;
        let (new_tier, rule) = policy
            .tier_table
            .evaluate_upgrade(previous_tier, balance.points_issued)?;

        balance.current_tier = new_tier;
        balance.tier_multiplier = rule.multiplier;

        let bonus = policy.tier_bonus_points;
        if bonus > Decimal::ZERO {
            balance.apply(&BalanceDelta::issue(bonus))?;
        }

        let mut txn = base_transaction(
            req.actor.user_id.clone(),
            req.scope.clone(),
            TransactionType::TierBonus,
            PointType::Tier,
            bonus,
            balance.tier_multiplier,
        );
        txn.tier_upgraded = Some(new_tier.as_str().to_string());
        txn.description = Some(format!("Tier upgrade bonus to {}", new_tier));

        // Tiers live per (user, scope); the marker must too, or an upgrade
        // in one scope blocks the same tier in every other
        let marker = format!("{}:{}", req.scope.key_fragment(), new_tier.as_str());
        self.storage
            .commit_operation(&[&balance], &txn, Some(&marker))?;

        tracing::info!(
            user_id = %req.actor.user_id,
            scope = %req.scope,
            from = %previous_tier,
            to = %new_tier,
            bonus = %bonus,
            "Tier upgraded"
        );

        Ok(TierUpgradeReceipt {
            previous_tier,
            new_tier,
            new_multiplier: rule.multiplier,
            bonus_awarded: bonus,
            transaction: txn,
            balance,
        })
    }

    /// Check milestones and award any newly reached ones
    ///
    /// Idempotent: thresholds already carrying a `milestone_bonus` row are
    /// skipped silently. Thresholds are evaluated against the cumulative
    /// issued total as it stood at call entry; bonuses awarded here do not
    /// cascade within the same call.
    pub fn check_milestones(&self, req: &CheckMilestonesRequest) -> Result<MilestoneCheckReceipt> {
        let policy = self.policy(&req.policy);

        let key = BalanceKey::new(req.actor.user_id.clone(), req.scope.clone());
        let mut balance = match self.storage.get_balance(&key)? {
            Some(balance) => balance,
            // Nothing issued yet: no thresholds can be reached
            None => {
                return Ok(MilestoneCheckReceipt {
                    reached: Vec::new(),
                    total_bonus_awarded: Decimal::ZERO,
                    balance: Balance::new(&key),
                })
            }
        };

        let issued_at_entry = balance.points_issued;
        let mut reached = Vec::new();
        let mut total_bonus = Decimal::ZERO;

        for rule in policy.milestone_schedule.reached(issued_at_entry) {
            let marker = MilestoneSchedule::marker(rule);

            if self
                .storage
                .find_existing(&req.actor.user_id, TransactionType::MilestoneBonus, &marker)?
                .is_some()
            {
                continue; // already awarded
            }

            let bonus = rule.bonus * policy.milestone_bonus_multiplier;
            if bonus > Decimal::ZERO {
                balance.apply(&BalanceDelta::issue(bonus))?;
            }

            let mut txn = base_transaction(
                req.actor.user_id.clone(),
                req.scope.clone(),
                TransactionType::MilestoneBonus,
                PointType::Milestone,
                bonus,
                balance.tier_multiplier,
            );
            txn.milestone_reached = Some(marker.clone());
            txn.description = Some(format!(
                "Milestone bonus for reaching {} points",
                rule.threshold
            ));

            self.storage
                .commit_operation(&[&balance], &txn, Some(&marker))?;

            tracing::info!(
                user_id = %req.actor.user_id,
                scope = %req.scope,
                threshold = rule.threshold,
                bonus = %bonus,
                "Milestone awarded"
            );

            total_bonus += bonus;
            reached.push(MilestoneAward {
                threshold: rule.threshold,
                bonus_awarded: bonus,
                transaction_id: txn.transaction_id,
            });
        }

        Ok(MilestoneCheckReceipt {
            reached,
            total_bonus_awarded: total_bonus,
            balance,
        })
    }
}
