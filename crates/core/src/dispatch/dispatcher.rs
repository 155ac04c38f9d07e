//! Worker pool dispatcher
//!
//! Drains the approved-change queue through a bounded, dynamically-sized
//! pool of workers. A supervisor loop tracks queue depth and recent batch
//! latency to size the pool between the configured bounds; workers retire
//! themselves after a sustained idle window. Cancellation is cooperative:
//! workers stop popping, in-flight batches run to completion, and
//! undispatched items are marked cancelled.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use skubridge_common::{Clock, SystemClock};
use skubridge_domain::constants::{
    SCALE_DOWN_IDLE_WINDOW, SCALE_LATENCY_CEILING, SCALE_UP_QUEUE_FACTOR,
};
use skubridge_domain::{
    Batch, BatchOutcome, ChangeKind, ChangeStatus, ItemError, ItemOutcome, ProductRecord,
    RunCounts, RunPhase, RunResult, StagedChange, SyncConfig, SyncError,
};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::queue::{Pop, TaskQueue};
use crate::batch::BatchOptimizer;
use crate::client::CatalogClient;
use crate::ports::{ProductStore, StagingStore};
use crate::progress::ProgressReporter;

/// Supervisor tick for pool sizing decisions
const SUPERVISE_INTERVAL: Duration = Duration::from_millis(100);
/// Idle worker poll interval while waiting for re-admitted items
const IDLE_POLL: Duration = Duration::from_millis(50);

#[derive(Default)]
struct DispatchMetrics {
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    conflicted: AtomicU64,
    latency_ms_sum: AtomicU64,
    latency_samples: AtomicU64,
}

impl DispatchMetrics {
    fn record_latency(&self, elapsed: Duration) {
        self.latency_ms_sum.fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    fn avg_latency(&self) -> Option<Duration> {
        let samples = self.latency_samples.load(Ordering::Relaxed);
        if samples == 0 {
            return None;
        }
        Some(Duration::from_millis(self.latency_ms_sum.load(Ordering::Relaxed) / samples))
    }

    fn counts(&self, total: u64) -> RunCounts {
        RunCounts {
            total,
            processed: self.processed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            conflicted: self.conflicted.load(Ordering::Relaxed),
        }
    }
}

/// Shared context handed to every worker and the supervisor
struct WorkerContext<C: Clock> {
    queue: TaskQueue,
    client: Arc<CatalogClient<C>>,
    optimizer: Arc<BatchOptimizer>,
    staging: Arc<dyn StagingStore>,
    products: Arc<dyn ProductStore>,
    metrics: DispatchMetrics,
    result: Mutex<RunResult>,
    fatal: Mutex<Option<SyncError>>,
    /// Stops workers from pulling new batches; child of the run token so a
    /// fatal error can halt dispatch without cancelling the caller's token
    work_cancel: CancellationToken,
    config: SyncConfig,
    target_batch: usize,
    total: u64,
    desired_workers: AtomicUsize,
    live_workers: AtomicUsize,
    worker_seq: AtomicUsize,
    done: Notify,
    progress: Arc<ProgressReporter>,
}

impl<C: Clock> WorkerContext<C> {
    fn fatal_is_set(&self) -> bool {
        self.fatal.lock().is_some()
    }

    fn set_fatal(&self, err: SyncError) {
        let mut fatal = self.fatal.lock();
        if fatal.is_none() {
            *fatal = Some(err);
        }
        drop(fatal);
        self.work_cancel.cancel();
    }
}

/// Bounded, dynamically-sized worker pool draining approved changes
pub struct Dispatcher<C: Clock = SystemClock> {
    staging: Arc<dyn StagingStore>,
    products: Arc<dyn ProductStore>,
    client: Arc<CatalogClient<C>>,
    optimizer: Arc<BatchOptimizer>,
}

impl<C: Clock> Dispatcher<C> {
    pub fn new(
        staging: Arc<dyn StagingStore>,
        products: Arc<dyn ProductStore>,
        client: Arc<CatalogClient<C>>,
        optimizer: Arc<BatchOptimizer>,
    ) -> Self {
        Self { staging, products, client, optimizer }
    }

    /// Push the approved changes of one run through the worker pool.
    ///
    /// Returns the per-run result once the queue drains or the run is
    /// cancelled. A fatal error (authentication) aborts dispatch and is
    /// returned as `Err`; no further batches go out after it.
    #[instrument(skip_all, fields(run = %run_id, items = approved.len()))]
    pub async fn run(
        &self,
        run_id: Uuid,
        approved: Vec<StagedChange>,
        config: &SyncConfig,
        cancel: &CancellationToken,
        progress: Arc<ProgressReporter>,
    ) -> Result<RunResult, SyncError> {
        config.validate().map_err(SyncError::InvalidInput)?;

        let queue = TaskQueue::new();
        let metrics = DispatchMetrics::default();
        let mut total: u64 = 0;

        for change in approved {
            // Idempotence gate: only approved changes dispatch; re-running
            // a push over already-pushed rows is a no-op
            if change.status != ChangeStatus::Approved {
                debug!(change = %change.id, status = %change.status, "Skipping non-approved change");
                continue;
            }
            // Conflicted changes are excluded from push and stay visible
            // for manual re-review
            if change.conflict {
                metrics.conflicted.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            queue.push(change, config.priority);
            total += 1;
        }

        let initial_workers =
            config.strategy.initial_workers(config.min_workers, config.max_workers);
        let ctx = Arc::new(WorkerContext {
            queue,
            client: Arc::clone(&self.client),
            optimizer: Arc::clone(&self.optimizer),
            staging: Arc::clone(&self.staging),
            products: Arc::clone(&self.products),
            metrics,
            result: Mutex::new(RunResult::new(run_id)),
            fatal: Mutex::new(None),
            work_cancel: cancel.child_token(),
            config: config.clone(),
            target_batch: config.strategy.target_batch_size(config.batch_size),
            total,
            desired_workers: AtomicUsize::new(initial_workers),
            live_workers: AtomicUsize::new(0),
            worker_seq: AtomicUsize::new(0),
            done: Notify::new(),
            progress,
        });

        info!(total = total, workers = initial_workers, "Dispatch starting");

        for _ in 0..initial_workers {
            Self::spawn_worker(&ctx);
        }
        let supervisor = tokio::spawn(Self::supervise(Arc::clone(&ctx)));

        // Wait for the pool to wind down; the sleep arm covers the window
        // where the last worker notifies between the check and the wait
        while ctx.live_workers.load(Ordering::Acquire) > 0 {
            tokio::select! {
                _ = ctx.done.notified() => {}
                _ = tokio::time::sleep(IDLE_POLL) => {}
            }
        }
        supervisor.abort();

        // Anything still queued was never dispatched
        let leftover = ctx.queue.drain_remaining();
        for change in &leftover {
            if let Err(err) = ctx
                .staging
                .mark_status(change.id, ChangeStatus::Cancelled, None)
                .await
            {
                warn!(change = %change.id, error = %err, "Failed to mark change cancelled");
            }
        }
        if !leftover.is_empty() {
            info!(count = leftover.len(), "Marked undispatched changes cancelled");
        }

        if let Some(err) = ctx.fatal.lock().take() {
            return Err(err);
        }

        let mut result = std::mem::replace(&mut *ctx.result.lock(), RunResult::new(run_id));
        result.counts = ctx.metrics.counts(total);
        ctx.progress.emit_now(
            RunPhase::Pushing,
            result.counts.processed,
            total,
            result.counts.failed,
        );

        info!(
            succeeded = result.counts.succeeded,
            failed = result.counts.failed,
            conflicted = result.counts.conflicted,
            "Dispatch finished"
        );
        Ok(result)
    }

    fn spawn_worker(ctx: &Arc<WorkerContext<C>>) {
        ctx.live_workers.fetch_add(1, Ordering::AcqRel);
        let id = ctx.worker_seq.fetch_add(1, Ordering::Relaxed);
        let ctx = Arc::clone(ctx);
        tokio::spawn(async move {
            Self::worker_loop(&ctx, id).await;
            ctx.live_workers.fetch_sub(1, Ordering::AcqRel);
            ctx.done.notify_waiters();
        });
    }

    /// Supervisor: sizes the pool to the backlog each tick.
    ///
    /// Scale up while queue depth exceeds a multiple of in-flight capacity
    /// and batches are completing under the latency ceiling; shrink the
    /// target back toward the minimum as the backlog drains (idle workers
    /// retire themselves against that target).
    async fn supervise(ctx: Arc<WorkerContext<C>>) {
        loop {
            tokio::select! {
                _ = ctx.work_cancel.cancelled() => break,
                _ = tokio::time::sleep(SUPERVISE_INTERVAL) => {}
            }

            let live = ctx.live_workers.load(Ordering::Acquire);
            if live == 0 {
                break;
            }

            let depth = ctx.queue.depth();
            let capacity = live.max(1) * ctx.target_batch;
            let latency_ok =
                ctx.metrics.avg_latency().map_or(true, |l| l < SCALE_LATENCY_CEILING);

            let mut desired = ctx.desired_workers.load(Ordering::Acquire);
            if depth > SCALE_UP_QUEUE_FACTOR * capacity && latency_ok {
                desired = (desired + 1).min(ctx.config.max_workers);
            } else if depth == 0 {
                desired = ctx.config.min_workers;
            }
            ctx.desired_workers.store(desired, Ordering::Release);

            while ctx.live_workers.load(Ordering::Acquire) < desired
                && !ctx.work_cancel.is_cancelled()
            {
                debug!(desired = desired, "Scaling worker pool up");
                Self::spawn_worker(&ctx);
            }
        }
    }

    async fn worker_loop(ctx: &Arc<WorkerContext<C>>, worker_id: usize) {
        debug!(worker = worker_id, "Worker started");
        let mut idle_since: Option<Instant> = None;

        loop {
            if ctx.work_cancel.is_cancelled() {
                break;
            }

            match ctx.queue.pop_batch(ctx.target_batch) {
                Pop::Items(items) => {
                    idle_since = None;
                    Self::process_items(ctx, items).await;
                }
                Pop::Drained => break,
                Pop::Wait => {
                    let since = *idle_since.get_or_insert_with(Instant::now);
                    if since.elapsed() >= SCALE_DOWN_IDLE_WINDOW
                        && ctx.live_workers.load(Ordering::Acquire) > ctx.config.min_workers
                    {
                        debug!(worker = worker_id, "Idle worker retiring");
                        break;
                    }
                    tokio::select! {
                        _ = ctx.work_cancel.cancelled() => break,
                        _ = ctx.queue.wait_for_work() => {}
                        _ = tokio::time::sleep(IDLE_POLL) => {}
                    }
                }
            }
        }
        debug!(worker = worker_id, "Worker stopped");
    }

    /// Pack popped items into cost-bounded batches and push each
    async fn process_items(ctx: &Arc<WorkerContext<C>>, items: Vec<StagedChange>) {
        let batches =
            ctx.optimizer.pack(items, ctx.config.max_batch_cost, ctx.config.batch_size);

        for batch in batches {
            let products: Vec<_> = batch.changes.iter().map(|c| c.product_id.clone()).collect();

            if ctx.work_cancel.is_cancelled() {
                // Popped but never dispatched
                for change in &batch.changes {
                    Self::mark(ctx, change, ChangeStatus::Cancelled, None).await;
                }
                ctx.queue.complete(products);
                continue;
            }

            let started = Instant::now();
            let outcome = ctx.client.push(&batch, &ctx.work_cancel).await;
            ctx.metrics.record_latency(started.elapsed());

            match outcome {
                Ok(result) => Self::apply_outcome(ctx, &batch, result, true).await,
                Err(err) => Self::handle_batch_error(ctx, &batch, err).await,
            }

            ctx.queue.complete(products);
            let counts = ctx.metrics.counts(ctx.total);
            ctx.progress.emit(RunPhase::Pushing, counts.processed, ctx.total, counts.failed);
        }
    }

    /// Apply per-item outcomes; retryable failures inside a multi-item
    /// batch get one split retry as singleton batches before giving up.
    async fn apply_outcome(
        ctx: &Arc<WorkerContext<C>>,
        batch: &Batch,
        outcome: BatchOutcome,
        allow_split: bool,
    ) {
        let by_id: BTreeMap<Uuid, &StagedChange> =
            batch.changes.iter().map(|c| (c.id, c)).collect();
        let mut retry_items: Vec<StagedChange> = Vec::new();
        let mut seen: Vec<Uuid> = Vec::new();

        for (id, item_outcome) in outcome.items {
            let Some(change) = by_id.get(&id) else {
                warn!(change = %id, "Outcome for unknown change id");
                continue;
            };
            seen.push(id);

            match item_outcome {
                ItemOutcome::Pushed { remote_id } => {
                    Self::mark(ctx, change, ChangeStatus::Pushed, None).await;
                    Self::reconcile_local(ctx, change, remote_id).await;
                    ctx.metrics.succeeded.fetch_add(1, Ordering::Relaxed);
                    ctx.metrics.processed.fetch_add(1, Ordering::Relaxed);
                }
                ItemOutcome::Failed { message, retryable } => {
                    if retryable && allow_split && batch.len() > 1 {
                        retry_items.push((*change).clone());
                    } else {
                        Self::fail_item(ctx, change, message).await;
                    }
                }
            }
        }

        // Items the remote response never mentioned cannot be assumed
        // applied
        for change in batch.changes.iter().filter(|c| !seen.contains(&c.id)) {
            Self::fail_item(ctx, change, "no outcome reported for item".to_string()).await;
        }

        if !retry_items.is_empty() {
            Self::split_retry(ctx, retry_items).await;
        }
    }

    /// Whole-batch failure: isolate the faulty item by retrying the batch
    /// once as single-item batches; fatal errors abort dispatch instead.
    async fn handle_batch_error(ctx: &Arc<WorkerContext<C>>, batch: &Batch, err: SyncError) {
        if matches!(err, SyncError::Cancelled) {
            for change in &batch.changes {
                Self::mark(ctx, change, ChangeStatus::Cancelled, None).await;
            }
            return;
        }

        if err.is_fatal() {
            warn!(error = %err, "Fatal error, aborting dispatch");
            for change in &batch.changes {
                Self::fail_item(ctx, change, err.to_string()).await;
            }
            ctx.set_fatal(err);
            return;
        }

        if batch.len() > 1 {
            debug!(items = batch.len(), error = %err, "Batch failed, splitting into single items");
            Self::split_retry(ctx, batch.changes.clone()).await;
        } else {
            for change in &batch.changes {
                Self::fail_item(ctx, change, err.to_string()).await;
            }
        }
    }

    /// Push each item as its own batch; no further splitting
    async fn split_retry(ctx: &Arc<WorkerContext<C>>, items: Vec<StagedChange>) {
        for change in items {
            let cost = ctx.optimizer.estimate(&change);
            let singleton = Batch { changes: vec![change], estimated_cost: cost };

            if ctx.work_cancel.is_cancelled() {
                for c in &singleton.changes {
                    Self::mark(ctx, c, ChangeStatus::Cancelled, None).await;
                }
                continue;
            }

            let started = Instant::now();
            match ctx.client.push(&singleton, &ctx.work_cancel).await {
                Ok(outcome) => {
                    ctx.metrics.record_latency(started.elapsed());
                    Box::pin(Self::apply_outcome(ctx, &singleton, outcome, false)).await;
                }
                Err(err) if err.is_fatal() => {
                    for c in &singleton.changes {
                        Self::fail_item(ctx, c, err.to_string()).await;
                    }
                    ctx.set_fatal(err);
                    return;
                }
                Err(err) => {
                    for c in &singleton.changes {
                        Self::fail_item(ctx, c, err.to_string()).await;
                    }
                }
            }
        }
    }

    async fn fail_item(ctx: &Arc<WorkerContext<C>>, change: &StagedChange, message: String) {
        Self::mark(ctx, change, ChangeStatus::Failed, Some(message.clone())).await;
        ctx.metrics.failed.fetch_add(1, Ordering::Relaxed);
        ctx.metrics.processed.fetch_add(1, Ordering::Relaxed);
        ctx.result.lock().record_error(ItemError {
            change_id: change.id,
            product_id: change.product_id.clone(),
            message,
        });
    }

    async fn mark(
        ctx: &Arc<WorkerContext<C>>,
        change: &StagedChange,
        status: ChangeStatus,
        error: Option<String>,
    ) {
        if let Err(err) = ctx.staging.mark_status(change.id, status, error).await {
            warn!(change = %change.id, error = %err, "Failed to persist status transition");
        }
    }

    /// Converge the local record on the pushed values so the next pull
    /// fingerprints clean. Workers never touch catalog state directly;
    /// everything goes through the store's atomic per-record upsert.
    async fn reconcile_local(
        ctx: &Arc<WorkerContext<C>>,
        change: &StagedChange,
        remote_id: Option<String>,
    ) {
        let result = async {
            match change.kind {
                ChangeKind::Create | ChangeKind::Update => {
                    let mut record = ctx
                        .products
                        .get_product(&change.product_id)
                        .await?
                        .unwrap_or_else(|| {
                            ProductRecord::new(change.product_id.clone(), BTreeMap::new())
                        });
                    for delta in &change.diff {
                        match &delta.new {
                            Some(value) => record.set_field(delta.field.clone(), value.clone()),
                            None => record.remove_field(&delta.field),
                        }
                    }
                    if let Some(rid) = remote_id {
                        record.remote_id = Some(rid);
                    }
                    ctx.products.upsert_product(record).await
                }
                ChangeKind::Delete => {
                    if let Some(mut record) =
                        ctx.products.get_product(&change.product_id).await?
                    {
                        record.remote_id = None;
                        ctx.products.upsert_product(record).await?;
                    }
                    Ok(())
                }
            }
        }
        .await;

        if let Err(err) = result {
            warn!(product = %change.product_id, error = %err, "Local reconcile failed");
        }
    }
}
