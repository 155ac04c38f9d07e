//! Sync engine constants
//!
//! Centralized location for all domain-level defaults used throughout the
//! engine. Runtime configuration overrides these per run.

use std::time::Duration;

// Worker pool configuration
pub const DEFAULT_MIN_WORKERS: usize = 1;
pub const DEFAULT_MAX_WORKERS: usize = 4;
pub const DEFAULT_BATCH_SIZE: usize = 50;

// Retry/backoff configuration
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(60);

// Rate budget configuration
pub const DEFAULT_BUDGET_CAPACITY: f64 = 1_000.0;
pub const DEFAULT_REFILL_PER_SEC: f64 = 50.0;

// Run control
pub const DEFAULT_FAILURE_THRESHOLD_PCT: u8 = 50;
pub const MAX_REPORTED_ITEM_ERRORS: usize = 25;
pub const PROGRESS_MIN_INTERVAL: Duration = Duration::from_secs(1);

// Worker scaling heuristics
pub const SCALE_UP_QUEUE_FACTOR: usize = 2;
pub const SCALE_LATENCY_CEILING: Duration = Duration::from_secs(5);
pub const SCALE_DOWN_IDLE_WINDOW: Duration = Duration::from_secs(10);

// Default mutation cost weights
pub const COST_CREATE: u32 = 10;
pub const COST_UPDATE: u32 = 5;
pub const COST_DELETE: u32 = 2;
pub const COST_PER_FIELD: u32 = 1;
