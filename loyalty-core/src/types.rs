//! Core types for the loyalty ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for points and cash)
//! - Closed enums instead of string switching

use crate::tier::Tier;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// User identifier (from the parent identity system)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create new user ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Business identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BusinessId(String);

impl BusinessId {
    /// Create new business ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BusinessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

const TXN_SUFFIX_CHARSET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const TXN_SUFFIX_LEN: usize = 9;

/// Unique transaction identifier
///
/// Format: `TXN_<unix-millis>_<9 base36 chars>`. The time prefix keeps IDs
/// roughly ordered; the random suffix makes collisions negligible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(String);

impl TransactionId {
    /// Generate a fresh transaction ID
    pub fn generate() -> Self {
        use rand::Rng;

        let millis = Utc::now().timestamp_millis();
        let mut rng = rand::thread_rng();
        let suffix: String = (0..TXN_SUFFIX_LEN)
            .map(|_| TXN_SUFFIX_CHARSET[rng.gen_range(0..TXN_SUFFIX_CHARSET.len())] as char)
            .collect();

        Self(format!("TXN_{}_{}", millis, suffix))
    }

    /// Rehydrate an ID read back from storage
    pub(crate) fn from_string(id: String) -> Self {
        Self(id)
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Balance pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolType {
    /// Platform-wide shared pool
    TownTicks,
    /// A business's aggregate pool
    Business,
    /// A user's business-specific sub-balance
    IndividualBusiness,
}

impl PoolType {
    /// Pool label used in transaction rows and reports
    pub fn label(&self) -> &'static str {
        match self {
            PoolType::TownTicks => "townTicks",
            PoolType::Business => "business",
            PoolType::IndividualBusiness => "individualBusiness",
        }
    }
}

impl fmt::Display for PoolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Balance scope: which pool a balance record belongs to
///
/// Collapses the schema variants of the source system into one tagged key:
/// single-pool deployments use `Global`, multi-pool deployments scope per
/// pool and optionally per business.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// Single-pool deployment
    Global,
    /// Platform- or business-wide pool
    Pool(PoolType),
    /// Per-business pool
    BusinessPool {
        /// Pool variant within the business
        pool: PoolType,
        /// Owning business
        business_id: BusinessId,
    },
}

impl Scope {
    /// Pool type of this scope, if any
    pub fn pool_type(&self) -> Option<PoolType> {
        match self {
            Scope::Global => None,
            Scope::Pool(pool) => Some(*pool),
            Scope::BusinessPool { pool, .. } => Some(*pool),
        }
    }

    /// Free-form pool label for transaction rows (`source_pool`/`destination_pool`)
    pub fn label(&self) -> String {
        match self {
            Scope::Global => "global".to_string(),
            Scope::Pool(pool) => pool.label().to_string(),
            Scope::BusinessPool { pool, business_id } => {
                format!("{}:{}", pool.label(), business_id)
            }
        }
    }

    /// Deterministic key fragment for storage
    pub(crate) fn key_fragment(&self) -> String {
        match self {
            Scope::Global => "G".to_string(),
            Scope::Pool(pool) => format!("P:{}", pool.label()),
            Scope::BusinessPool { pool, business_id } => {
                format!("B:{}:{}", business_id, pool.label())
            }
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Actor role, resolved by the authentication layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Regular platform user
    Citizen,
    /// Business operator
    Business,
    /// Platform administrator
    Admin,
}

/// Authenticated actor descriptor
///
/// The ledger trusts this as given; credential verification happens upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Acting user
    pub user_id: UserId,
    /// Actor role
    pub role: Role,
    /// Business the actor operates, if any
    pub business_id: Option<BusinessId>,
}

impl Identity {
    /// Citizen identity without a business
    pub fn citizen(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            role: Role::Citizen,
            business_id: None,
        }
    }

    /// Business identity
    pub fn business(user_id: impl Into<String>, business_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            role: Role::Business,
            business_id: Some(BusinessId::new(business_id)),
        }
    }

    /// Admin identity
    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            role: Role::Admin,
            business_id: None,
        }
    }
}

/// Transaction type (balance-affecting event kind)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransactionType {
    /// Points issued to a user
    Issue = 1,
    /// Points redeemed by a user
    Redeem = 2,
    /// Points gifted to another user
    Gift = 3,
    /// Points moved between pools
    Transfer = 4,
    /// Points imported from an external pool
    Import = 5,
    /// Points exported to an external pool
    Export = 6,
    /// Points expired
    Expire = 7,
    /// Cashback issued
    CashbackIssue = 8,
    /// Cashback redeemed
    CashbackRedeem = 9,
    /// One-time milestone bonus
    MilestoneBonus = 10,
    /// Tier upgrade bonus
    TierBonus = 11,
}

impl TransactionType {
    /// Stable code used in index keys
    pub(crate) fn code(&self) -> u8 {
        *self as u8
    }

    /// Snake-case wire label
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Issue => "issue",
            TransactionType::Redeem => "redeem",
            TransactionType::Gift => "gift",
            TransactionType::Transfer => "transfer",
            TransactionType::Import => "import",
            TransactionType::Export => "export",
            TransactionType::Expire => "expire",
            TransactionType::CashbackIssue => "cashback_issue",
            TransactionType::CashbackRedeem => "cashback_redeem",
            TransactionType::MilestoneBonus => "milestone_bonus",
            TransactionType::TierBonus => "tier_bonus",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Point type classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointType {
    /// Standard earned points
    Regular,
    /// Promotional bonus points
    Bonus,
    /// Special-event points
    Special,
    /// Welcome grant
    Welcome,
    /// Referral grant
    Referral,
    /// Milestone bonus award
    Milestone,
    /// Tier upgrade award
    Tier,
}

/// Transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Created, not yet settled
    Pending,
    /// Fully applied
    Completed,
    /// Failed before applying
    Failed,
    /// Explicitly cancelled
    Cancelled,
}

/// Immutable transaction record
///
/// Created exactly once per balance-affecting operation, never updated or
/// deleted. A correction is itself a new transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoyaltyTransaction {
    /// Unique transaction ID
    pub transaction_id: TransactionId,

    /// User whose balance this row mutated
    pub user_id: UserId,

    /// Balance scope this row mutated
    pub scope: Scope,

    /// Business involved, if any
    pub business_id: Option<BusinessId>,

    /// Gift recipient, if any
    pub recipient_user_id: Option<UserId>,

    /// Gift recipient email, if any
    pub recipient_email: Option<String>,

    /// Event kind
    pub transaction_type: TransactionType,

    /// Point classifier
    pub point_type: PointType,

    /// Points amount (semantics depend on `transaction_type`)
    pub points_amount: Decimal,

    /// Purchase cash amount, if relevant
    pub cash_amount: Decimal,

    /// Cashback amount, for cashback transactions
    pub cashback_amount: Decimal,

    /// Tier multiplier in force when the row was written
    pub tier_multiplier: Decimal,

    /// Extra bonus points, default zero
    pub bonus_points: Decimal,

    /// Source pool label for import/export/transfer
    pub source_pool: Option<String>,

    /// Destination pool label for import/export/transfer
    pub destination_pool: Option<String>,

    /// Milestone threshold label, set only for milestone bonuses
    pub milestone_reached: Option<String>,

    /// Tier name, set only for tier bonuses
    pub tier_upgraded: Option<String>,

    /// Record status
    pub status: TransactionStatus,

    /// Opaque redemption code payload, if redeemed via QR
    pub qr_code_data: Option<String>,

    /// Human-readable description
    pub description: Option<String>,

    /// Additional metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl LoyaltyTransaction {
    /// Milestone/tier marker this row carries, if any
    pub fn marker(&self) -> Option<&str> {
        match self.transaction_type {
            TransactionType::MilestoneBonus => self.milestone_reached.as_deref(),
            TransactionType::TierBonus => self.tier_upgraded.as_deref(),
            _ => None,
        }
    }
}

/// Builder-free constructor with every optional field defaulted
pub(crate) fn base_transaction(
    user_id: UserId,
    scope: Scope,
    transaction_type: TransactionType,
    point_type: PointType,
    points_amount: Decimal,
    tier_multiplier: Decimal,
) -> LoyaltyTransaction {
    LoyaltyTransaction {
        transaction_id: TransactionId::generate(),
        user_id,
        scope,
        business_id: None,
        recipient_user_id: None,
        recipient_email: None,
        transaction_type,
        point_type,
        points_amount,
        cash_amount: Decimal::ZERO,
        cashback_amount: Decimal::ZERO,
        tier_multiplier,
        bonus_points: Decimal::ZERO,
        source_pool: None,
        destination_pool: None,
        milestone_reached: None,
        tier_upgraded: None,
        status: TransactionStatus::Completed,
        qr_code_data: None,
        description: None,
        metadata: HashMap::new(),
        created_at: Utc::now(),
    }
}

/// Default tier multiplier for brand-new balances
pub(crate) fn default_multiplier() -> Decimal {
    Tier::Bronze.default_multiplier()
}
