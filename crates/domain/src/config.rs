//! Run configuration for the sync engine
//!
//! All configuration is passed explicitly at run start. Nothing in the
//! engine reads configuration from global state.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    COST_CREATE, COST_DELETE, COST_PER_FIELD, COST_UPDATE, DEFAULT_BACKOFF_BASE,
    DEFAULT_BACKOFF_CAP, DEFAULT_BATCH_SIZE, DEFAULT_BUDGET_CAPACITY, DEFAULT_FAILURE_THRESHOLD_PCT,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_WORKERS, DEFAULT_MIN_WORKERS, DEFAULT_REFILL_PER_SEC,
};

/// Dispatch priority for a run's staged changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    High = 0,
    Normal = 1,
    Low = 2,
}

impl From<u8> for Priority {
    fn from(value: u8) -> Self {
        match value {
            0 => Priority::High,
            1 => Priority::Normal,
            _ => Priority::Low,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "High"),
            Priority::Normal => write!(f, "Normal"),
            Priority::Low => write!(f, "Low"),
        }
    }
}

/// Push strategy, trading remote call count against wall-clock time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Maximize workers, dispatch batches as soon as they fill
    Speed,
    /// Minimize call count: fewest workers, largest batches
    Cost,
    /// Middle ground between the two
    Balanced,
}

impl Strategy {
    /// Initial worker count for this strategy, within `[min, max]`
    pub fn initial_workers(self, min: usize, max: usize) -> usize {
        match self {
            Strategy::Speed => max,
            Strategy::Cost => min,
            Strategy::Balanced => min.max(max.div_ceil(2)),
        }
    }

    /// Target number of items per batch for this strategy
    pub fn target_batch_size(self, batch_size: usize) -> usize {
        match self {
            // Smaller batches keep more workers busy in parallel
            Strategy::Speed => batch_size.div_ceil(2).max(1),
            Strategy::Cost | Strategy::Balanced => batch_size.max(1),
        }
    }
}

/// Rate budget settings for the remote endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Maximum cost units the budget can hold
    pub capacity: f64,
    /// Cost units restored per second
    pub refill_per_sec: f64,
    /// First backoff applied after a rate-limit response without a hint
    pub backoff_base: Duration,
    /// Ceiling for the exponential rate-limit backoff
    pub backoff_cap: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BUDGET_CAPACITY,
            refill_per_sec: DEFAULT_REFILL_PER_SEC,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_cap: DEFAULT_BACKOFF_CAP,
        }
    }
}

/// Retry settings shared by the fetch and push paths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Bounded attempt count for transient failures
    pub max_attempts: u32,
    /// Initial backoff delay
    pub base_delay: Duration,
    /// Backoff delay ceiling
    pub max_delay: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BACKOFF_BASE,
            max_delay: DEFAULT_BACKOFF_CAP,
        }
    }
}

/// Cost weights for the default mutation cost model.
///
/// The exact metering formula is a contract detail of the remote API, so the
/// weights are injected rather than hard-coded in the optimizer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CostWeights {
    pub create: u32,
    pub update: u32,
    pub delete: u32,
    pub per_field: u32,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            create: COST_CREATE,
            update: COST_UPDATE,
            delete: COST_DELETE,
            per_field: COST_PER_FIELD,
        }
    }
}

/// Configuration snapshot for one sync run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Lower bound for dynamic worker scaling
    pub min_workers: usize,
    /// Upper bound for dynamic worker scaling
    pub max_workers: usize,
    /// Maximum items a worker pops per batch
    pub batch_size: usize,
    /// Maximum estimated cost per remote call
    pub max_batch_cost: u32,
    /// Dispatch priority for this run's changes
    pub priority: Priority,
    /// Worker/batch sizing strategy
    pub strategy: Strategy,
    /// Rate budget settings for the remote endpoint
    pub rate_limit: RateLimitSettings,
    /// Retry settings for transient failures
    pub retry: RetrySettings,
    /// Cost weights for batch packing
    pub cost_weights: CostWeights,
    /// Run fails when more than this percentage of items failed
    pub failure_threshold_pct: u8,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            min_workers: DEFAULT_MIN_WORKERS,
            max_workers: DEFAULT_MAX_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            max_batch_cost: 500,
            priority: Priority::Normal,
            strategy: Strategy::Balanced,
            rate_limit: RateLimitSettings::default(),
            retry: RetrySettings::default(),
            cost_weights: CostWeights::default(),
            failure_threshold_pct: DEFAULT_FAILURE_THRESHOLD_PCT,
        }
    }
}

impl SyncConfig {
    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.min_workers == 0 {
            return Err("min_workers must be greater than 0".to_string());
        }
        if self.max_workers < self.min_workers {
            return Err("max_workers must be >= min_workers".to_string());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be greater than 0".to_string());
        }
        if self.max_batch_cost == 0 {
            return Err("max_batch_cost must be greater than 0".to_string());
        }
        if self.rate_limit.capacity <= 0.0 {
            return Err("rate_limit.capacity must be greater than 0".to_string());
        }
        if self.rate_limit.refill_per_sec <= 0.0 {
            return Err("rate_limit.refill_per_sec must be greater than 0".to_string());
        }
        if self.retry.max_attempts == 0 {
            return Err("retry.max_attempts must be greater than 0".to_string());
        }
        if self.failure_threshold_pct > 100 {
            return Err("failure_threshold_pct must be between 0 and 100".to_string());
        }
        Ok(())
    }
}
