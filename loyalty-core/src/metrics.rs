//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `loyalty_operations_total` - Completed operations, labeled by kind
//! - `loyalty_rejections_total` - Rejected operations, labeled by kind
//! - `loyalty_points_issued_total` - Points issued (bonuses included)
//! - `loyalty_points_redeemed_total` - Points redeemed
//! - `loyalty_bonus_points_awarded_total` - Milestone and tier bonus points
//! - `loyalty_operation_duration_seconds` - Histogram of operation latencies
//! - `loyalty_storage_keys` - Storage key-count estimate
//!
//! Every metric lives in the instance registry only, so independent ledgers
//! in one process never collide.

use prometheus::{
    Counter, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Completed operations by kind
    pub operations_total: IntCounterVec,

    /// Rejected operations by kind
    pub rejections_total: IntCounterVec,

    /// Points issued, bonuses included
    pub points_issued_total: Counter,

    /// Points redeemed
    pub points_redeemed_total: Counter,

    /// Milestone and tier bonus points awarded
    pub bonus_points_awarded_total: Counter,

    /// Operation duration histogram
    pub operation_duration: Histogram,

    /// Storage key-count estimate
    pub storage_keys: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let operations_total = IntCounterVec::new(
            Opts::new("loyalty_operations_total", "Completed ledger operations"),
            &["operation"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let rejections_total = IntCounterVec::new(
            Opts::new(
                "loyalty_rejections_total",
                "Rejected ledger operations",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(rejections_total.clone()))?;

        let points_issued_total = Counter::new(
            "loyalty_points_issued_total",
            "Points issued, bonuses included",
        )?;
        registry.register(Box::new(points_issued_total.clone()))?;

        let points_redeemed_total =
            Counter::new("loyalty_points_redeemed_total", "Points redeemed")?;
        registry.register(Box::new(points_redeemed_total.clone()))?;

        let bonus_points_awarded_total = Counter::new(
            "loyalty_bonus_points_awarded_total",
            "Milestone and tier bonus points awarded",
        )?;
        registry.register(Box::new(bonus_points_awarded_total.clone()))?;

        let operation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "loyalty_operation_duration_seconds",
                "Histogram of operation latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let storage_keys = IntGauge::new("loyalty_storage_keys", "Storage key-count estimate")?;
        registry.register(Box::new(storage_keys.clone()))?;

        Ok(Self {
            operations_total,
            rejections_total,
            points_issued_total,
            points_redeemed_total,
            bonus_points_awarded_total,
            operation_duration,
            storage_keys,
            registry,
        })
    }

    /// Record a completed operation
    pub fn record_operation(&self, operation: &str) {
        self.operations_total.with_label_values(&[operation]).inc();
    }

    /// Record a rejected operation
    pub fn record_rejection(&self, operation: &str) {
        self.rejections_total
            .with_label_values(&[operation])
            .inc();
    }

    /// Record issued points
    pub fn record_points_issued(&self, amount: f64) {
        self.points_issued_total.inc_by(amount);
    }

    /// Record redeemed points
    pub fn record_points_redeemed(&self, amount: f64) {
        self.points_redeemed_total.inc_by(amount);
    }

    /// Record awarded bonus points
    pub fn record_bonus_awarded(&self, amount: f64) {
        self.bonus_points_awarded_total.inc_by(amount);
    }

    /// Record operation duration
    pub fn record_operation_duration(&self, duration_seconds: f64) {
        self.operation_duration.observe(duration_seconds);
    }

    /// Update storage key-count estimate
    pub fn update_storage_keys(&self, keys: i64) {
        self.storage_keys.set(keys);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
