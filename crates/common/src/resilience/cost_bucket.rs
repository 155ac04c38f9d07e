//! Continuously-refilling, cost-metered token bucket
//!
//! Unlike a per-request limiter, callers acquire a *cost* per call and the
//! bucket refills fractionally with elapsed time. All state sits behind one
//! mutex so concurrent acquirers can never jointly overdraw the budget.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use super::clock::{Clock, SystemClock};

/// Configuration for the cost bucket
#[derive(Debug, Clone)]
pub struct CostBucketConfig {
    /// Maximum cost units the bucket can hold
    pub capacity: f64,
    /// Cost units restored per second
    pub refill_per_sec: f64,
}

impl CostBucketConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity <= 0.0 {
            return Err("capacity must be greater than 0".to_string());
        }
        if self.refill_per_sec <= 0.0 {
            return Err("refill_per_sec must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Cost-metered token bucket with continuous refill.
///
/// Cloning shares the underlying state, so one bucket can gate any number
/// of concurrent workers.
pub struct CostBucket<C: Clock = SystemClock> {
    config: CostBucketConfig,
    state: Arc<Mutex<BucketState>>,
    clock: Arc<C>,
}

impl<C: Clock> CostBucket<C> {
    /// Create a new bucket with a custom clock, starting full
    pub fn with_clock(capacity: f64, refill_per_sec: f64, clock: C) -> Result<Self, String> {
        Self::with_shared_clock(capacity, refill_per_sec, Arc::new(clock))
    }

    /// Create a bucket over an already-shared clock handle, starting full.
    ///
    /// Lets a caller keep reading the same clock the bucket refills by.
    pub fn with_shared_clock(
        capacity: f64,
        refill_per_sec: f64,
        clock: Arc<C>,
    ) -> Result<Self, String> {
        let config = CostBucketConfig { capacity, refill_per_sec };
        config.validate()?;

        Ok(Self {
            state: Arc::new(Mutex::new(BucketState {
                tokens: capacity,
                last_refill: clock.now(),
            })),
            clock,
            config,
        })
    }

    fn refill(&self, state: &mut BucketState) {
        let now = self.clock.now();
        let elapsed = now.duration_since(state.last_refill);
        if elapsed.is_zero() {
            return;
        }

        let added = elapsed.as_secs_f64() * self.config.refill_per_sec;
        state.tokens = (state.tokens + added).min(self.config.capacity);
        state.last_refill = now;
    }

    /// Try to acquire `cost` units.
    ///
    /// On success the units are debited. On failure the bucket is left
    /// untouched and the error carries how long the caller must wait for
    /// enough units to accrue.
    pub fn try_acquire(&self, cost: f64) -> Result<(), Duration> {
        let mut state = self.state.lock();
        self.refill(&mut state);

        if state.tokens >= cost {
            state.tokens -= cost;
            debug!(cost = cost, remaining = state.tokens, "Acquired cost units");
            return Ok(());
        }

        let missing = cost - state.tokens;
        let wait = Duration::from_secs_f64(missing / self.config.refill_per_sec);
        debug!(cost = cost, available = state.tokens, wait_ms = wait.as_millis() as u64, "Budget exhausted");
        Err(wait)
    }

    /// Current available units
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.tokens
    }

    /// Drop the available units to zero (rate-limit penalty)
    pub fn drain(&self) {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.tokens = 0.0;
    }

    /// Restore the bucket to full capacity
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.tokens = self.config.capacity;
        state.last_refill = self.clock.now();
    }
}

impl CostBucket<SystemClock> {
    /// Create a new bucket with the system clock
    pub fn new(capacity: f64, refill_per_sec: f64) -> Result<Self, String> {
        Self::with_clock(capacity, refill_per_sec, SystemClock)
    }
}

impl<C: Clock> Clone for CostBucket<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            clock: Arc::clone(&self.clock),
        }
    }
}
