//! Exponential backoff with jitter and classification-driven retries
//!
//! One backoff policy object serves every remote call site; callers differ
//! only in how they classify errors. The classifier decides per error
//! whether to retry with the policy's delay, retry after an explicit delay
//! (rate-limit hints), or stop.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur during retry operations
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// All retry attempts have been exhausted
    #[error("All {attempts} retry attempts exhausted: {source}")]
    AttemptsExhausted { attempts: u32, source: E },

    /// The operation failed with a non-retryable error
    #[error("Non-retryable error: {source}")]
    NonRetryable { source: E },
}

impl<E> RetryError<E> {
    /// Consume the wrapper and return the underlying error
    pub fn into_source(self) -> E {
        match self {
            Self::AttemptsExhausted { source, .. } | Self::NonRetryable { source } => source,
        }
    }
}

/// Decision returned by an error classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Retry with the policy's backoff delay
    Retry,
    /// Retry after the given delay instead of the backoff delay
    RetryAfter(Duration),
    /// Don't retry
    Stop,
}

/// Exponential backoff policy with bounded attempts and jitter
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
    /// Fraction of the delay added as random jitter (0.0 disables)
    jitter_factor: f64,
}

impl BackoffPolicy {
    /// Create a policy; delays double from `base_delay` up to `max_delay`
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self { base_delay, max_delay, max_attempts, jitter_factor: 0.25 }
    }

    /// Disable jitter, for deterministic tests
    pub fn without_jitter(mut self) -> Self {
        self.jitter_factor = 0.0;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the given retry, zero-indexed: attempt 0 waits
    /// `base_delay`, each following attempt doubles, capped at `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.min(16);
        let doubled = self.base_delay.saturating_mul(2u32.saturating_pow(exp));
        let capped = doubled.min(self.max_delay);

        if self.jitter_factor <= 0.0 || capped.is_zero() {
            return capped;
        }

        let jitter_bound = capped.mul_f64(self.jitter_factor);
        let jitter = rand::thread_rng().gen_range(Duration::ZERO..=jitter_bound);
        (capped + jitter).min(self.max_delay)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60), 3)
    }
}

/// Run an operation with retries governed by `policy` and `classify`.
///
/// The first execution does not count as a retry: with `max_attempts = 3`
/// the operation runs at most four times. A `RetryAfter` classification
/// sleeps the explicit delay and still consumes an attempt, so a remote
/// that keeps throttling cannot loop forever.
pub async fn retry<T, E, F, Fut, C>(
    policy: &BackoffPolicy,
    classify: C,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryClass,
    E: std::fmt::Display,
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                let class = classify(&error);

                if class == RetryClass::Stop {
                    debug!(error = %error, "Error classified non-retryable");
                    return Err(RetryError::NonRetryable { source: error });
                }

                if attempt >= policy.max_attempts {
                    warn!(attempts = attempt, error = %error, "Retry attempts exhausted");
                    return Err(RetryError::AttemptsExhausted { attempts: attempt, source: error });
                }

                let delay = match class {
                    RetryClass::RetryAfter(explicit) => explicit,
                    _ => policy.delay_for(attempt),
                };

                debug!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %error, "Retrying after delay");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
