//! Rate budget controller for the remote endpoint
//!
//! One injected instance per run gates every outbound call shared by all
//! workers. The call/cost allowance refills continuously; a rate-limit
//! response from the remote empties it and establishes a backoff-until
//! deadline, taken from the response's retry hint when present, else from
//! an exponential default that doubles per consecutive strike.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use skubridge_common::{Clock, CostBucket, SystemClock};
use skubridge_domain::{RateLimitSettings, SyncError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Outcome of a budget acquisition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The cost was debited; the caller may proceed
    Granted,
    /// Budget exhausted or backing off; retry after the given wait
    RetryAfter(Duration),
}

#[derive(Debug, Default)]
struct PenaltyState {
    backoff_until: Option<Instant>,
    /// Consecutive rate-limit responses without an intervening success
    strikes: u32,
}

/// Shared, serialized call/cost budget for one remote endpoint
pub struct RateBudget<C: Clock = SystemClock> {
    bucket: CostBucket<C>,
    penalty: Mutex<PenaltyState>,
    settings: RateLimitSettings,
    clock: Arc<C>,
}

impl RateBudget<SystemClock> {
    pub fn new(settings: RateLimitSettings) -> Result<Self, String> {
        Self::with_clock(settings, SystemClock)
    }
}

impl<C: Clock> RateBudget<C> {
    pub fn with_clock(settings: RateLimitSettings, clock: C) -> Result<Self, String> {
        let clock = Arc::new(clock);
        let bucket = CostBucket::with_shared_clock(
            settings.capacity,
            settings.refill_per_sec,
            Arc::clone(&clock),
        )?;
        Ok(Self { bucket, penalty: Mutex::new(PenaltyState::default()), settings, clock })
    }

    /// Request permission to spend `cost` units.
    ///
    /// Backoff deadlines take precedence over bucket level: while a
    /// rate-limit penalty is active no cost is admitted at any price.
    pub fn acquire(&self, cost: f64) -> Admission {
        {
            let mut penalty = self.penalty.lock();
            if let Some(until) = penalty.backoff_until {
                let now = self.clock.now();
                if now < until {
                    return Admission::RetryAfter(until - now);
                }
                penalty.backoff_until = None;
            }
        }

        match self.bucket.try_acquire(cost) {
            Ok(()) => Admission::Granted,
            Err(wait) => Admission::RetryAfter(wait),
        }
    }

    /// Acquire, sleeping through wait hints until granted or cancelled
    pub async fn acquire_or_wait(
        &self,
        cost: f64,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            match self.acquire(cost) {
                Admission::Granted => return Ok(()),
                Admission::RetryAfter(wait) => {
                    debug!(wait_ms = wait.as_millis() as u64, "Waiting for rate budget");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }
    }

    /// Record a rate-limit response from the remote.
    ///
    /// Empties the budget and sets the backoff deadline from the retry
    /// hint; without a hint the deadline doubles per consecutive strike,
    /// starting at the configured base and capped at the ceiling.
    pub fn record_rate_limit(&self, retry_after: Option<Duration>) {
        self.bucket.drain();

        let mut penalty = self.penalty.lock();
        let delay = retry_after.unwrap_or_else(|| {
            let exp = penalty.strikes.min(16);
            self.settings
                .backoff_base
                .saturating_mul(2u32.saturating_pow(exp))
                .min(self.settings.backoff_cap)
        });
        penalty.strikes = penalty.strikes.saturating_add(1);
        penalty.backoff_until = Some(self.clock.now() + delay);

        warn!(
            delay_ms = delay.as_millis() as u64,
            strikes = penalty.strikes,
            hinted = retry_after.is_some(),
            "Rate limit received, budget drained"
        );
    }

    /// Record a successful remote call, resetting the strike counter
    pub fn record_success(&self) {
        self.penalty.lock().strikes = 0;
    }

    /// Remaining backoff deadline, if a penalty is active
    pub fn backoff_remaining(&self) -> Option<Duration> {
        let penalty = self.penalty.lock();
        let until = penalty.backoff_until?;
        let now = self.clock.now();
        (now < until).then(|| until - now)
    }

    /// Currently available cost units
    pub fn available(&self) -> f64 {
        self.bucket.available()
    }
}
