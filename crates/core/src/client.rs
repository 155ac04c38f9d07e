//! Remote fetch/push client
//!
//! Wraps the thin transport with the rate budget and the one shared
//! backoff policy. Every outbound call acquires budget first; rate-limit
//! responses feed the budget's penalty state so all workers back off
//! together instead of hammering the remote one by one.

use std::sync::Arc;
use std::time::Duration;

use skubridge_common::{retry, BackoffPolicy, Clock, RetryClass, SystemClock};
use skubridge_domain::{
    Batch, BatchOutcome, ErrorClass, RemotePage, RemoteProduct, RetrySettings, SyncError,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::budget::RateBudget;
use crate::ports::RemoteTransport;

/// Budget cost of one paginated fetch call
const PAGE_COST: f64 = 1.0;

/// Remote catalog client owning retry/backoff for both directions
pub struct CatalogClient<C: Clock = SystemClock> {
    transport: Arc<dyn RemoteTransport>,
    budget: Arc<RateBudget<C>>,
    backoff: BackoffPolicy,
}

impl<C: Clock> CatalogClient<C> {
    pub fn new(
        transport: Arc<dyn RemoteTransport>,
        budget: Arc<RateBudget<C>>,
        retry_settings: &RetrySettings,
    ) -> Self {
        Self {
            transport,
            budget,
            backoff: BackoffPolicy::new(
                retry_settings.base_delay,
                retry_settings.max_delay,
                retry_settings.max_attempts,
            ),
        }
    }

    /// Shared rate budget gating this client's calls
    pub fn budget(&self) -> &Arc<RateBudget<C>> {
        &self.budget
    }

    /// Pull the remote catalog from `start_cursor` to exhaustion.
    ///
    /// Returns the fetched records and the cursor checkpoint where the
    /// next incremental pull should resume.
    #[instrument(skip(self, cancel))]
    pub async fn fetch_all(
        &self,
        start_cursor: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<(Vec<RemoteProduct>, Option<String>), SyncError> {
        let mut records = Vec::new();
        let mut cursor = start_cursor;
        let mut pages: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let page = self.fetch_page(cursor.clone(), cancel).await?;
            pages += 1;
            records.extend(page.records);

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        info!(pages = pages, records = records.len(), "Remote pull complete");
        Ok((records, cursor))
    }

    /// Fetch one page through the budget with retries
    async fn fetch_page(
        &self,
        cursor: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<RemotePage, SyncError> {
        self.budget.acquire_or_wait(PAGE_COST, cancel).await?;

        let transport = Arc::clone(&self.transport);
        let budget = Arc::clone(&self.budget);
        let result = retry(&self.backoff, self.classifier(), move || {
            let transport = Arc::clone(&transport);
            let budget = Arc::clone(&budget);
            let cursor = cursor.clone();
            async move {
                match transport.fetch_page(cursor).await {
                    Ok(page) => {
                        budget.record_success();
                        Ok(page)
                    }
                    Err(err) => {
                        Self::penalize_on_rate_limit(&budget, &err);
                        Err(err)
                    }
                }
            }
        })
        .await;

        result.map_err(skubridge_common::RetryError::into_source)
    }

    /// Push one batch through the budget with retries.
    ///
    /// Validation failures come back inside the `BatchOutcome`, not as a
    /// transport error; only transport-level failures reach the retry
    /// classifier here.
    #[instrument(skip(self, batch, cancel), fields(items = batch.len(), cost = batch.estimated_cost))]
    pub async fn push(
        &self,
        batch: &Batch,
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome, SyncError> {
        self.budget.acquire_or_wait(f64::from(batch.estimated_cost), cancel).await?;

        let transport = Arc::clone(&self.transport);
        let budget = Arc::clone(&self.budget);
        let result = retry(&self.backoff, self.classifier(), move || {
            let transport = Arc::clone(&transport);
            let budget = Arc::clone(&budget);
            async move {
                match transport.push_batch(batch).await {
                    Ok(outcome) => {
                        // A partially throttled response still carries
                        // outcomes; record the signal without failing
                        match outcome.rate_limited {
                            Some(signal) => budget.record_rate_limit(signal.retry_after),
                            None => budget.record_success(),
                        }
                        Ok(outcome)
                    }
                    Err(err) => {
                        Self::penalize_on_rate_limit(&budget, &err);
                        Err(err)
                    }
                }
            }
        })
        .await;

        debug!(items = batch.len(), ok = result.is_ok(), "Batch push attempt finished");
        result.map_err(skubridge_common::RetryError::into_source)
    }

    fn penalize_on_rate_limit(budget: &RateBudget<C>, err: &SyncError) {
        if err.class() == ErrorClass::RateLimit {
            budget.record_rate_limit(err.retry_after_secs().map(Duration::from_secs));
        }
    }

    /// The one error classification shared by fetch and push
    fn classifier(&self) -> impl Fn(&SyncError) -> RetryClass + '_ {
        let budget = Arc::clone(&self.budget);
        move |err: &SyncError| match err.class() {
            ErrorClass::Transient => RetryClass::Retry,
            ErrorClass::RateLimit => {
                // Honor the penalty deadline the budget just established
                let wait = budget
                    .backoff_remaining()
                    .or_else(|| err.retry_after_secs().map(Duration::from_secs))
                    .unwrap_or(Duration::from_secs(1));
                RetryClass::RetryAfter(wait)
            }
            ErrorClass::Validation
            | ErrorClass::Auth
            | ErrorClass::Conflict
            | ErrorClass::Permanent => RetryClass::Stop,
        }
    }
}
