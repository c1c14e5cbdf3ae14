//! Configuration for the loyalty ledger

use crate::milestone::MilestoneSchedule;
use crate::tier::TierTable;
use crate::types::PoolType;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Metrics listen address
    pub metrics_listen_addr: String,

    /// Actor mailbox capacity (backpressure bound)
    pub mailbox_capacity: usize,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Default tenant policy, overridable per request
    pub policy: PolicyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/loyalty"),
            service_name: "loyalty-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            metrics_listen_addr: "0.0.0.0:9090".to_string(),
            mailbox_capacity: 1000,
            rocksdb: RocksDBConfig::default(),
            policy: PolicyConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Target file size (MB)
    pub target_file_size_mb: u64,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Level 0 file num compaction trigger
    pub level0_file_num_compaction_trigger: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            target_file_size_mb: 64,
            max_background_jobs: 4,
            level0_file_num_compaction_trigger: 4,
            enable_statistics: false,
        }
    }
}

/// Per-tenant ledger policy
///
/// The hardcoded tier table and milestone schedule of the source system are
/// defaults here; a tenant-specific `PolicyConfig` may be passed with any
/// operation that consults policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Tier thresholds and multipliers
    pub tier_table: TierTable,

    /// Bonus points issued on a tier upgrade (zero disables the bonus)
    pub tier_bonus_points: Decimal,

    /// Milestone thresholds and bonus units
    pub milestone_schedule: MilestoneSchedule,

    /// Multiplier applied to milestone bonus units
    pub milestone_bonus_multiplier: Decimal,

    /// Whether this tenant may import points into the platform pool
    pub allow_import: bool,

    /// Whether this tenant may export points out of the platform pool
    pub allow_export: bool,

    /// Pools in which gifting is permitted (`Scope::Global` is always allowed)
    pub gift_pools: Vec<PoolType>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            tier_table: TierTable::default(),
            tier_bonus_points: Decimal::ZERO,
            milestone_schedule: MilestoneSchedule::default(),
            milestone_bonus_multiplier: Decimal::ONE,
            allow_import: true,
            allow_export: true,
            gift_pools: vec![PoolType::TownTicks],
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("LOYALTY_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(addr) = std::env::var("LOYALTY_METRICS_ADDR") {
            config.metrics_listen_addr = addr;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "loyalty-core");
        assert_eq!(config.mailbox_capacity, 1000);
        assert!(config.policy.allow_import);
        assert_eq!(config.policy.gift_pools, vec![PoolType::TownTicks]);
        assert_eq!(config.policy.milestone_bonus_multiplier, Decimal::ONE);
    }

    #[test]
    fn test_policy_roundtrips_through_toml() {
        let config = Config::default();
        let rendered = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.policy, config.policy);
        assert_eq!(parsed.data_dir, config.data_dir);
    }
}
