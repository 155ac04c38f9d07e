//! Resilience patterns for fault tolerance
//!
//! This module provides generic building blocks used by the sync engine:
//! - **Backoff**: exponential retry delays with jitter, driven by an
//!   error-classification callback
//! - **Cost bucket**: a token bucket metered in fractional cost units with
//!   continuous refill
//! - **Clock**: time abstraction so both can be tested deterministically

pub mod backoff;
pub mod clock;
pub mod cost_bucket;

pub use backoff::{retry, BackoffPolicy, RetryClass, RetryError};
pub use clock::{Clock, MockClock, SystemClock};
pub use cost_bucket::{CostBucket, CostBucketConfig};
