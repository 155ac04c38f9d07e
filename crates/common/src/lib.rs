//! # SkuBridge Common
//!
//! Generic, reusable resilience primitives shared across the workspace:
//! clock abstraction for deterministic tests, exponential backoff with
//! jitter, and a continuously-refilling cost bucket.
//!
//! Nothing in this crate knows about products, staged changes, or runs;
//! domain coupling lives in `skubridge-core`.

pub mod resilience;

pub use resilience::{
    retry, BackoffPolicy, Clock, CostBucket, CostBucketConfig, MockClock, RetryClass, RetryError,
    SystemClock,
};
