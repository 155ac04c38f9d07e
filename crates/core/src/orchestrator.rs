//! Sync run orchestration
//!
//! Drives one run through pull -> stage -> awaiting approval -> push.
//! The orchestrator returns control at the approval gate instead of
//! blocking: run state round-trips through the run store, so a process
//! restart (or a different process) can resume the push once the external
//! approval actor has marked changes approved.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use skubridge_common::{Clock, SystemClock};
use skubridge_domain::{
    ProductId, RunPhase, RunResult, SyncConfig, SyncError, SyncRun,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::batch::{BatchOptimizer, WeightedCostModel};
use crate::budget::RateBudget;
use crate::client::CatalogClient;
use crate::diff::{DiffEngine, DiffOutcome};
use crate::dispatch::Dispatcher;
use crate::ports::{ProductStore, ProgressSink, RemoteTransport, RunStore, StagingStore};
use crate::progress::ProgressReporter;

/// Orchestrates the pull/stage/push workflow for catalog sync runs
pub struct SyncOrchestrator<C: Clock = SystemClock> {
    products: Arc<dyn ProductStore>,
    staging: Arc<dyn StagingStore>,
    runs: Arc<dyn RunStore>,
    transport: Arc<dyn RemoteTransport>,
    sink: Arc<dyn ProgressSink>,
    clock: Arc<C>,
    /// Cancellation tokens of runs currently executing in this process
    active: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl SyncOrchestrator<SystemClock> {
    pub fn new(
        products: Arc<dyn ProductStore>,
        staging: Arc<dyn StagingStore>,
        runs: Arc<dyn RunStore>,
        transport: Arc<dyn RemoteTransport>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self::with_clock(products, staging, runs, transport, sink, SystemClock)
    }
}

impl<C: Clock> SyncOrchestrator<C> {
    pub fn with_clock(
        products: Arc<dyn ProductStore>,
        staging: Arc<dyn StagingStore>,
        runs: Arc<dyn RunStore>,
        transport: Arc<dyn RemoteTransport>,
        sink: Arc<dyn ProgressSink>,
        clock: C,
    ) -> Self {
        Self {
            products,
            staging,
            runs,
            transport,
            sink,
            clock: Arc::new(clock),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Start a run: pull the remote catalog, stage diffs, and stop at the
    /// approval gate.
    ///
    /// The returned run is persisted in its final phase for this call:
    /// `AwaitingApproval` on success, `Cancelled` or `Failed` otherwise
    /// (with the failure recorded on the run). `Err` is reserved for
    /// invalid configuration and store failures.
    #[instrument(skip_all, fields(full_pull = full_pull))]
    pub async fn start_run(
        &self,
        config: SyncConfig,
        full_pull: bool,
    ) -> Result<SyncRun, SyncError> {
        config.validate().map_err(SyncError::InvalidInput)?;

        let mut run = SyncRun::new(config, full_pull);
        let cancel = CancellationToken::new();
        self.active.lock().insert(run.id, cancel.clone());
        self.runs.save_run(&run).await?;

        info!(run = %run.id, "Run started");
        let reporter = Arc::new(ProgressReporter::new(Arc::clone(&self.sink), run.id));

        let outcome = self.pull_and_stage(&mut run, &cancel, &reporter).await;
        self.active.lock().remove(&run.id);

        match outcome {
            Ok(()) => {
                run.transition(RunPhase::AwaitingApproval)?;
            }
            Err(SyncError::Cancelled) => {
                info!(run = %run.id, "Run cancelled during pull/stage");
                run.transition(RunPhase::Cancelled)?;
            }
            Err(err) => {
                warn!(run = %run.id, error = %err, "Run failed during pull/stage");
                run.error = Some(err.to_string());
                run.transition(RunPhase::Failed)?;
            }
        }

        self.runs.save_run(&run).await?;
        reporter.emit_now(run.phase, run.counts.processed, run.counts.total, 0);
        Ok(run)
    }

    /// Resume a run past the approval gate and push the approved changes.
    ///
    /// Accepts runs in `AwaitingApproval` (the normal path) and `Pushing`
    /// (crash recovery: statuses already pushed are skipped by the
    /// dispatcher's idempotence gate). The run completes when the queue
    /// drains, or fails when the configured fraction of items failed or a
    /// fatal error aborted dispatch.
    #[instrument(skip(self), fields(run = %run_id))]
    pub async fn resume_push(&self, run_id: Uuid) -> Result<RunResult, SyncError> {
        let mut run = self
            .runs
            .load_run(run_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("run {run_id}")))?;

        match run.phase {
            RunPhase::AwaitingApproval => {
                run.transition(RunPhase::Pushing)?;
                self.runs.save_run(&run).await?;
            }
            RunPhase::Pushing => {
                debug!(run = %run_id, "Resuming interrupted push");
            }
            other => {
                return Err(SyncError::InvalidInput(format!(
                    "run {run_id} is {other}, not awaiting approval"
                )));
            }
        }

        let cancel = CancellationToken::new();
        self.active.lock().insert(run.id, cancel.clone());
        let reporter = Arc::new(ProgressReporter::new(Arc::clone(&self.sink), run.id));

        let outcome = self.push_approved(&run, &cancel, Arc::clone(&reporter)).await;
        self.active.lock().remove(&run.id);

        match outcome {
            Err(err) => {
                warn!(run = %run.id, error = %err, "Push aborted");
                run.error = Some(err.to_string());
                run.transition(RunPhase::Failed)?;
                self.runs.save_run(&run).await?;
                Err(err)
            }
            Ok(result) => {
                run.counts = result.counts;
                if cancel.is_cancelled() {
                    run.transition(RunPhase::Cancelled)?;
                } else if Self::over_failure_threshold(&run) {
                    run.error = Some(format!(
                        "{} of {} items failed, over the {}% threshold",
                        run.counts.failed, run.counts.total, run.config.failure_threshold_pct
                    ));
                    run.transition(RunPhase::Failed)?;
                } else {
                    run.transition(RunPhase::Completed)?;
                }
                self.runs.save_run(&run).await?;
                reporter.emit_now(
                    run.phase,
                    run.counts.processed,
                    run.counts.total,
                    run.counts.failed,
                );
                info!(run = %run.id, phase = %run.phase, "Push finished");
                Ok(result)
            }
        }
    }

    /// Signal cancellation to a run executing in this process.
    ///
    /// Cooperative: workers stop at the next queue-pop or budget-acquire
    /// boundary and in-flight remote calls complete.
    pub fn cancel(&self, run_id: Uuid) -> bool {
        match self.active.lock().get(&run_id) {
            Some(token) => {
                info!(run = %run_id, "Cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Load the persisted state of a run
    pub async fn status(&self, run_id: Uuid) -> Result<SyncRun, SyncError> {
        self.runs
            .load_run(run_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("run {run_id}")))
    }

    async fn pull_and_stage(
        &self,
        run: &mut SyncRun,
        cancel: &CancellationToken,
        reporter: &ProgressReporter,
    ) -> Result<(), SyncError> {
        let client = self.build_client(&run.config)?;

        let start_cursor = if run.full_pull {
            None
        } else {
            self.runs.latest_checkpoint().await?
        };
        let (records, checkpoint) = client.fetch_all(start_cursor, cancel).await?;
        run.checkpoint = checkpoint;

        run.transition(RunPhase::Staging)?;
        self.runs.save_run(run).await?;

        let diff = DiffEngine::new(Arc::clone(&self.staging));
        let total = records.len() as u64;
        let mut seen: HashSet<ProductId> = HashSet::with_capacity(records.len());
        let mut staged: u64 = 0;
        let mut conflicted: u64 = 0;

        for (index, remote) in records.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            seen.insert(remote.product_id.clone());
            let local = self.products.get_product(&remote.product_id).await?;
            match diff.stage_remote(run.id, remote, local.as_ref()).await? {
                DiffOutcome::Unchanged => {}
                DiffOutcome::Staged(_) => staged += 1,
                DiffOutcome::ConflictFlagged(_) => conflicted += 1,
            }

            reporter.emit(RunPhase::Staging, index as u64 + 1, total, 0);
        }

        // Local-side scan: export creates for records the remote has never
        // seen, and deletions for records whose remote counterpart vanished
        // from a full pull. Partial pulls never stage deletions.
        for id in self.products.list_ids().await? {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            if seen.contains(&id) {
                continue;
            }
            let Some(record) = self.products.get_product(&id).await? else {
                continue;
            };

            let outcome = match record.remote_id {
                None => diff.stage_export_create(run.id, &record).await?,
                Some(_) if run.full_pull => diff.stage_deletion(run.id, &record).await?,
                Some(_) => continue,
            };
            match outcome {
                DiffOutcome::Unchanged => {}
                DiffOutcome::Staged(_) => staged += 1,
                DiffOutcome::ConflictFlagged(_) => conflicted += 1,
            }
        }

        run.counts.total = staged;
        run.counts.conflicted = conflicted;
        info!(run = %run.id, staged = staged, conflicted = conflicted, "Staging complete");
        Ok(())
    }

    async fn push_approved(
        &self,
        run: &SyncRun,
        cancel: &CancellationToken,
        reporter: Arc<ProgressReporter>,
    ) -> Result<RunResult, SyncError> {
        let client = Arc::new(self.build_client(&run.config)?);
        let optimizer = Arc::new(BatchOptimizer::new(Arc::new(WeightedCostModel::new(
            run.config.cost_weights,
        ))));
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.staging),
            Arc::clone(&self.products),
            client,
            optimizer,
        );

        let approved = self.staging.list_approved(run.id).await?;
        info!(run = %run.id, approved = approved.len(), "Pushing approved changes");
        dispatcher.run(run.id, approved, &run.config, cancel, reporter).await
    }

    /// One budget and client per run, shared by every worker of that run
    fn build_client(&self, config: &SyncConfig) -> Result<CatalogClient<Arc<C>>, SyncError> {
        let budget = RateBudget::with_clock(config.rate_limit.clone(), Arc::clone(&self.clock))
            .map_err(SyncError::Internal)?;
        Ok(CatalogClient::new(
            Arc::clone(&self.transport),
            Arc::new(budget),
            &config.retry,
        ))
    }

    fn over_failure_threshold(run: &SyncRun) -> bool {
        if run.counts.total == 0 {
            return false;
        }
        run.counts.failed * 100 > run.counts.total * u64::from(run.config.failure_threshold_pct)
    }
}
