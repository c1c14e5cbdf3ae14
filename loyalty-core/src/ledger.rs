//! Main ledger orchestration layer
//!
//! This module ties together storage, the operations engine, and the writer
//! actor into a high-level API for loyalty points processing. Mutations go
//! through the actor; reads hit storage directly.
//!
//! # Example
//!
//! ```no_run
//! use loyalty_core::{Config, Identity, IssueRequest, Ledger, Scope, UserId};
//! use rust_decimal::Decimal;
//!
//! #[tokio::main]
//! async fn main() -> loyalty_core::Result<()> {
//!     let config = Config::default();
//!     let ledger = Ledger::open(config)?;
//!
//!     let receipt = ledger
//!         .issue(IssueRequest::new(
//!             Identity::business("operator", "B1"),
//!             UserId::new("customer"),
//!             Scope::Global,
//!             Decimal::from(100),
//!         ))
//!         .await?;
//!     println!("available: {}", receipt.balance.points_available);
//!
//!     Ok(())
//! }
//! ```

use crate::{
    actor::{spawn_writer_actor, WriterHandle},
    balance::{Balance, BalanceKey},
    config::Config,
    error::{Error, Result},
    metrics::Metrics,
    milestone::MilestoneReport,
    ops::{
        CashbackIssueRequest, CashbackRedeemRequest, CheckMilestonesRequest, Engine,
        ExpireRequest, ExportRequest, GiftRequest, ImportRequest, IssueRequest,
        MilestoneCheckReceipt, OperationReceipt, RedeemRequest, TierUpgradeReceipt,
        TransferRequest, UpgradeTierRequest,
    },
    qr::RedemptionPayload,
    reporting::{ActivitySummary, PoolTotals, TransactionFilter},
    storage::{Storage, StorageStats},
    tier::TierInfo,
    types::{LoyaltyTransaction, Scope, TransactionId, UserId},
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;

/// Main ledger interface
pub struct Ledger {
    /// Actor handle for mutations
    handle: WriterHandle,

    /// Direct storage access (for reads)
    storage: Arc<Storage>,

    /// Metrics collector
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Ledger {
    /// Open ledger with configuration
    pub fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let engine = Engine::new(storage.clone(), config.policy.clone());
        let handle = spawn_writer_actor(engine, config.mailbox_capacity);
        let metrics = Metrics::new().map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self {
            handle,
            storage,
            metrics,
            config,
        })
    }

    /// Metrics collector for this instance
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn finish<T>(&self, operation: &str, started: Instant, result: &Result<T>) {
        self.metrics
            .record_operation_duration(started.elapsed().as_secs_f64());
        match result {
            Ok(_) => self.metrics.record_operation(operation),
            Err(_) => self.metrics.record_rejection(operation),
        }
    }

    fn points_f64(amount: Decimal) -> f64 {
        amount.to_f64().unwrap_or(0.0)
    }

    /// Issue points to a customer
    pub async fn issue(&self, request: IssueRequest) -> Result<OperationReceipt> {
        let started = Instant::now();
        let result = self.handle.issue(request).await;
        self.finish("issue", started, &result);
        if let Ok(ref receipt) = result {
            self.metrics
                .record_points_issued(Self::points_f64(receipt.transaction.points_amount));
        }
        result
    }

    /// Redeem points from a balance
    pub async fn redeem(&self, request: RedeemRequest) -> Result<OperationReceipt> {
        let started = Instant::now();
        let result = self.handle.redeem(request).await;
        self.finish("redeem", started, &result);
        if let Ok(ref receipt) = result {
            self.metrics
                .record_points_redeemed(Self::points_f64(receipt.transaction.points_amount));
        }
        result
    }

    /// Redeem with a scanned QR payload
    ///
    /// Decodes the payload, checks it against the submitting user, and
    /// redeems the encoded amount from the scope the payload was minted
    /// for. The raw payload is recorded on the row.
    pub async fn redeem_scanned(
        &self,
        actor: crate::types::Identity,
        qr_code_data: String,
    ) -> Result<OperationReceipt> {
        let payload = RedemptionPayload::decode(&qr_code_data)?;
        if payload.user_id != actor.user_id {
            return Err(Error::Forbidden(
                "QR payload was issued to a different user".to_string(),
            ));
        }
        self.redeem(RedeemRequest {
            actor,
            scope: payload.scope,
            amount: payload.points_amount,
            qr_code_data: Some(qr_code_data),
            description: None,
        })
        .await
    }

    /// Gift points to another user
    pub async fn gift(&self, request: GiftRequest) -> Result<OperationReceipt> {
        let started = Instant::now();
        let result = self.handle.gift(request).await;
        self.finish("gift", started, &result);
        result
    }

    /// Transfer points between pools
    pub async fn transfer(&self, request: TransferRequest) -> Result<OperationReceipt> {
        let started = Instant::now();
        let result = self.handle.transfer(request).await;
        self.finish("transfer", started, &result);
        result
    }

    /// Import points from an external pool
    pub async fn import(&self, request: ImportRequest) -> Result<OperationReceipt> {
        let started = Instant::now();
        let result = self.handle.import(request).await;
        self.finish("import", started, &result);
        result
    }

    /// Export points to an external pool
    pub async fn export(&self, request: ExportRequest) -> Result<OperationReceipt> {
        let started = Instant::now();
        let result = self.handle.export(request).await;
        self.finish("export", started, &result);
        result
    }

    /// Expire points (admin)
    pub async fn expire(&self, request: ExpireRequest) -> Result<OperationReceipt> {
        let started = Instant::now();
        let result = self.handle.expire(request).await;
        self.finish("expire", started, &result);
        result
    }

    /// Issue cashback to a customer
    pub async fn cashback_issue(&self, request: CashbackIssueRequest) -> Result<OperationReceipt> {
        let started = Instant::now();
        let result = self.handle.cashback_issue(request).await;
        self.finish("cashback_issue", started, &result);
        result
    }

    /// Redeem cashback from a balance
    pub async fn cashback_redeem(
        &self,
        request: CashbackRedeemRequest,
    ) -> Result<OperationReceipt> {
        let started = Instant::now();
        let result = self.handle.cashback_redeem(request).await;
        self.finish("cashback_redeem", started, &result);
        result
    }

    /// Upgrade a user's tier
    pub async fn upgrade_tier(&self, request: UpgradeTierRequest) -> Result<TierUpgradeReceipt> {
        let started = Instant::now();
        let result = self.handle.upgrade_tier(request).await;
        self.finish("upgrade_tier", started, &result);
        if let Ok(ref receipt) = result {
            self.metrics
                .record_bonus_awarded(Self::points_f64(receipt.bonus_awarded));
        }
        result
    }

    /// Check and award newly reached milestones
    pub async fn check_milestones(
        &self,
        request: CheckMilestonesRequest,
    ) -> Result<MilestoneCheckReceipt> {
        let started = Instant::now();
        let result = self.handle.check_milestones(request).await;
        self.finish("check_milestones", started, &result);
        if let Ok(ref receipt) = result {
            self.metrics
                .record_bonus_awarded(Self::points_f64(receipt.total_bonus_awarded));
        }
        result
    }

    /// Generate a redemption QR payload for a user, bound to one scope
    pub fn generate_redemption_qr(
        &self,
        user_id: UserId,
        scope: Scope,
        points_amount: Decimal,
    ) -> Result<String> {
        if points_amount <= Decimal::ZERO {
            return Err(Error::Validation(
                "points_amount must be positive".to_string(),
            ));
        }
        RedemptionPayload::new(user_id, scope, points_amount).encode()
    }

    /// Get a balance record; zeroed if the user has no activity in the scope
    pub fn balance(&self, user_id: UserId, scope: Scope) -> Result<Balance> {
        let key = BalanceKey::new(user_id, scope);
        self.storage.get_or_create_balance(&key)
    }

    /// Get all balance records for a user, across scopes
    pub fn balances_for_user(&self, user_id: &UserId) -> Result<Vec<Balance>> {
        let mut records = self.storage.scan_balances()?;
        records.retain(|b| b.user_id == *user_id);
        Ok(records)
    }

    /// Get a transaction by ID
    pub fn transaction(&self, transaction_id: &TransactionId) -> Result<LoyaltyTransaction> {
        self.storage.get_transaction(transaction_id)
    }

    /// Get a user's transaction history, oldest first
    pub fn transaction_history(
        &self,
        user_id: &UserId,
        filter: &TransactionFilter,
    ) -> Result<Vec<LoyaltyTransaction>> {
        let rows = self.storage.transactions_for_user(user_id)?;
        Ok(filter.apply(rows))
    }

    /// Fold a user's history into activity totals
    pub fn activity_summary(&self, user_id: &UserId) -> Result<ActivitySummary> {
        let rows = self.storage.transactions_for_user(user_id)?;
        Ok(ActivitySummary::compute(user_id.clone(), &rows))
    }

    /// Fold all balance records into pool totals
    pub fn pool_totals(&self) -> Result<PoolTotals> {
        let records = self.storage.scan_balances()?;
        let totals = PoolTotals::compute(&records);
        if let Ok(stats) = self.storage.stats() {
            self.metrics
                .update_storage_keys((stats.total_balances + stats.total_transactions) as i64);
        }
        Ok(totals)
    }

    /// Tier standing for a user in a scope
    pub fn tier_info(&self, user_id: UserId, scope: Scope) -> Result<TierInfo> {
        let balance = self.balance(user_id, scope)?;
        Ok(TierInfo::compute(
            &self.config.policy.tier_table,
            balance.current_tier,
            balance.points_issued,
        ))
    }

    /// Milestone progress for a user in a scope
    pub fn milestone_report(&self, user_id: UserId, scope: Scope) -> Result<MilestoneReport> {
        let balance = self.balance(user_id, scope)?;
        Ok(MilestoneReport::compute(
            &self.config.policy.milestone_schedule,
            balance.points_issued,
        ))
    }

    /// Record counts across storage, refreshing the storage keys gauge
    pub fn stats(&self) -> Result<StorageStats> {
        let stats = self.storage.stats()?;
        self.metrics
            .update_storage_keys((stats.total_balances + stats.total_transactions) as i64);
        Ok(stats)
    }

    /// Shutdown the writer actor
    pub async fn shutdown(&self) -> Result<()> {
        self.handle.shutdown().await
    }
}
