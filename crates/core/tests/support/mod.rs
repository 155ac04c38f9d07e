//! Shared test helpers for `skubridge-core` integration tests.
//!
//! In-memory implementations of the engine's ports plus a scriptable
//! remote transport, so dispatcher and orchestrator tests can focus on
//! behaviour instead of boilerplate.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use skubridge_core::ports::{
    ProductStore, ProgressSink, RemoteTransport, RunStore, StagingStore,
};
use skubridge_domain::{
    Batch, BatchOutcome, ChangeKind, ChangeStatus, FieldDelta, ItemOutcome, ProductId,
    ProductRecord, ProgressEvent, RemotePage, RemoteProduct, Result as DomainResult, StagedChange,
    SyncError, SyncRun,
};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Fixture builders
// ---------------------------------------------------------------------------

pub fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

pub fn product(sku: &str, price: &str) -> ProductRecord {
    ProductRecord::new(sku, fields(&[("price", price)]))
}

pub fn remote(sku: &str, remote_id: &str, price: &str) -> RemoteProduct {
    RemoteProduct {
        remote_id: remote_id.to_string(),
        product_id: ProductId::new(sku),
        fields: fields(&[("price", price)]),
    }
}

pub fn approved_update(sku: &str, run_id: Uuid) -> StagedChange {
    let mut change = StagedChange::new(
        ProductId::new(sku),
        ChangeKind::Update,
        vec![FieldDelta::new("price", Some("10.00".into()), Some("12.50".into()))],
        run_id,
    );
    change.status = ChangeStatus::Approved;
    change
}

// ---------------------------------------------------------------------------
// In-memory product store
// ---------------------------------------------------------------------------

/// In-memory mock for `ProductStore`
#[derive(Default, Clone)]
pub struct MemoryProductStore {
    records: Arc<Mutex<BTreeMap<ProductId, ProductRecord>>>,
}

impl MemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product(self, record: ProductRecord) -> Self {
        self.records.lock().insert(record.id.clone(), record);
        self
    }

    pub fn get(&self, sku: &str) -> Option<ProductRecord> {
        self.records.lock().get(&ProductId::new(sku)).cloned()
    }
}

#[async_trait]
impl ProductStore for MemoryProductStore {
    async fn get_product(&self, id: &ProductId) -> DomainResult<Option<ProductRecord>> {
        Ok(self.records.lock().get(id).cloned())
    }

    async fn upsert_product(&self, record: ProductRecord) -> DomainResult<()> {
        self.records.lock().insert(record.id.clone(), record);
        Ok(())
    }

    async fn list_ids(&self) -> DomainResult<Vec<ProductId>> {
        Ok(self.records.lock().keys().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// In-memory staging store
// ---------------------------------------------------------------------------

/// In-memory mock for `StagingStore` that enforces the status lifecycle
#[derive(Default, Clone)]
pub struct MemoryStagingStore {
    changes: Arc<Mutex<HashMap<Uuid, StagedChange>>>,
}

impl MemoryStagingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_change(self, change: StagedChange) -> Self {
        self.changes.lock().insert(change.id, change);
        self
    }

    pub fn all(&self) -> Vec<StagedChange> {
        self.changes.lock().values().cloned().collect()
    }

    pub fn by_product(&self, sku: &str) -> Vec<StagedChange> {
        let id = ProductId::new(sku);
        self.changes.lock().values().filter(|c| c.product_id == id).cloned().collect()
    }

    pub fn get(&self, id: Uuid) -> Option<StagedChange> {
        self.changes.lock().get(&id).cloned()
    }

    /// Mark every pending change of the given run approved
    pub fn approve_all(&self, run_id: Uuid) -> usize {
        let mut approved = 0;
        for change in self.changes.lock().values_mut() {
            if change.source_run == run_id && change.status == ChangeStatus::Pending {
                change.status = ChangeStatus::Approved;
                approved += 1;
            }
        }
        approved
    }

    pub fn count_with_status(&self, status: ChangeStatus) -> usize {
        self.changes.lock().values().filter(|c| c.status == status).count()
    }
}

#[async_trait]
impl StagingStore for MemoryStagingStore {
    async fn create_change(&self, change: StagedChange) -> DomainResult<()> {
        self.changes.lock().insert(change.id, change);
        Ok(())
    }

    async fn get_change(&self, id: Uuid) -> DomainResult<Option<StagedChange>> {
        Ok(self.changes.lock().get(&id).cloned())
    }

    async fn get_unresolved(&self, product_id: &ProductId) -> DomainResult<Option<StagedChange>> {
        Ok(self
            .changes
            .lock()
            .values()
            .find(|c| &c.product_id == product_id && c.is_unresolved())
            .cloned())
    }

    async fn list_approved(&self, run_id: Uuid) -> DomainResult<Vec<StagedChange>> {
        Ok(self
            .changes
            .lock()
            .values()
            .filter(|c| c.source_run == run_id && c.status == ChangeStatus::Approved)
            .cloned()
            .collect())
    }

    async fn mark_status(
        &self,
        id: Uuid,
        status: ChangeStatus,
        error: Option<String>,
    ) -> DomainResult<()> {
        let mut changes = self.changes.lock();
        let change = changes
            .get_mut(&id)
            .ok_or_else(|| SyncError::NotFound(format!("change {id}")))?;
        if !change.status.can_transition_to(status) {
            return Err(SyncError::Storage(format!(
                "invalid status transition {} -> {status} for change {id}",
                change.status
            )));
        }
        change.status = status;
        change.error = error;
        change.resolved_at = Some(Utc::now());
        Ok(())
    }

    async fn mark_conflict(&self, id: Uuid, remote_side: Vec<FieldDelta>) -> DomainResult<()> {
        let mut changes = self.changes.lock();
        let change = changes
            .get_mut(&id)
            .ok_or_else(|| SyncError::NotFound(format!("change {id}")))?;
        change.conflict = true;
        change.diff.extend(remote_side);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory run store
// ---------------------------------------------------------------------------

/// In-memory mock for `RunStore`
#[derive(Default, Clone)]
pub struct MemoryRunStore {
    runs: Arc<Mutex<HashMap<Uuid, SyncRun>>>,
    checkpoint: Arc<Mutex<Option<String>>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_checkpoint(&self, cursor: &str) {
        *self.checkpoint.lock() = Some(cursor.to_string());
    }

    pub fn get(&self, id: Uuid) -> Option<SyncRun> {
        self.runs.lock().get(&id).cloned()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn save_run(&self, run: &SyncRun) -> DomainResult<()> {
        if let Some(cursor) = &run.checkpoint {
            *self.checkpoint.lock() = Some(cursor.clone());
        }
        self.runs.lock().insert(run.id, run.clone());
        Ok(())
    }

    async fn load_run(&self, id: Uuid) -> DomainResult<Option<SyncRun>> {
        Ok(self.runs.lock().get(&id).cloned())
    }

    async fn latest_checkpoint(&self) -> DomainResult<Option<String>> {
        Ok(self.checkpoint.lock().clone())
    }
}

// ---------------------------------------------------------------------------
// Progress sink
// ---------------------------------------------------------------------------

/// Progress sink collecting every published event
#[derive(Default, Clone)]
pub struct VecSink {
    pub events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }
}

impl ProgressSink for VecSink {
    fn publish(&self, event: ProgressEvent) {
        self.events.lock().push(event);
    }
}

// ---------------------------------------------------------------------------
// Scriptable remote transport
// ---------------------------------------------------------------------------

/// Behaviour of `push_batch` calls
#[derive(Clone)]
pub enum PushMode {
    /// Every push succeeds
    Success,
    /// Any batch containing one of these products is rejected whole with a
    /// validation error (the remote refuses the request)
    RejectProducts(Vec<ProductId>),
    /// The first push is rate limited with the given retry hint
    RateLimitOnce { retry_after_secs: Option<u64> },
    /// Every push fails authentication
    AuthFail,
    /// The first `n` pushes fail with a network error
    TransientTimes(u32),
}

/// Behaviour of `fetch_page` calls
#[derive(Clone)]
pub enum FetchMode {
    Success,
    /// The first fetch is rate limited with the given retry hint
    RateLimitOnce { retry_after_secs: Option<u64> },
    AuthFail,
}

/// Scriptable `RemoteTransport` recording every interaction
pub struct ScriptedTransport {
    pages: Vec<RemotePage>,
    push_mode: PushMode,
    fetch_mode: FetchMode,
    push_delay: Option<Duration>,
    pub push_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub fetch_cursors: Mutex<Vec<Option<String>>>,
    pub batch_sizes: Mutex<Vec<usize>>,
    /// Set if two pushes ever carried the same product concurrently
    pub overlap_detected: AtomicBool,
    /// High-water mark of concurrently executing pushes
    pub max_concurrent: AtomicUsize,
    in_flight: Mutex<HashSet<ProductId>>,
    concurrent: AtomicUsize,
    one_shot_fired: AtomicBool,
}

impl ScriptedTransport {
    /// Build a transport serving the given records split into pages
    pub fn with_catalog(records: Vec<RemoteProduct>, page_size: usize) -> Self {
        let chunks: Vec<Vec<RemoteProduct>> =
            records.chunks(page_size.max(1)).map(<[RemoteProduct]>::to_vec).collect();
        let page_count = chunks.len();
        let pages = chunks
            .into_iter()
            .enumerate()
            .map(|(i, records)| RemotePage {
                records,
                next_cursor: (i + 1 < page_count).then(|| (i + 1).to_string()),
            })
            .collect();
        Self::from_pages(pages)
    }

    pub fn empty() -> Self {
        Self::from_pages(Vec::new())
    }

    fn from_pages(pages: Vec<RemotePage>) -> Self {
        Self {
            pages,
            push_mode: PushMode::Success,
            fetch_mode: FetchMode::Success,
            push_delay: None,
            push_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            fetch_cursors: Mutex::new(Vec::new()),
            batch_sizes: Mutex::new(Vec::new()),
            overlap_detected: AtomicBool::new(false),
            max_concurrent: AtomicUsize::new(0),
            in_flight: Mutex::new(HashSet::new()),
            concurrent: AtomicUsize::new(0),
            one_shot_fired: AtomicBool::new(false),
        }
    }

    pub fn with_push_mode(mut self, mode: PushMode) -> Self {
        self.push_mode = mode;
        self
    }

    pub fn with_fetch_mode(mut self, mode: FetchMode) -> Self {
        self.fetch_mode = mode;
        self
    }

    /// Hold every push for the given duration, to surface concurrency
    pub fn with_push_delay(mut self, delay: Duration) -> Self {
        self.push_delay = Some(delay);
        self
    }

    pub fn pushes(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteTransport for ScriptedTransport {
    async fn fetch_page(&self, cursor: Option<String>) -> DomainResult<RemotePage> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetch_cursors.lock().push(cursor.clone());

        match &self.fetch_mode {
            FetchMode::AuthFail => {
                return Err(SyncError::Auth("token rejected".to_string()));
            }
            FetchMode::RateLimitOnce { retry_after_secs } => {
                if !self.one_shot_fired.swap(true, Ordering::SeqCst) {
                    return Err(SyncError::RateLimited {
                        message: "throttled".to_string(),
                        retry_after_secs: *retry_after_secs,
                    });
                }
            }
            FetchMode::Success => {}
        }

        let index = match cursor {
            None => 0,
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| SyncError::InvalidInput(format!("bad cursor {c}")))?,
        };
        Ok(self.pages.get(index).cloned().unwrap_or(RemotePage {
            records: Vec::new(),
            next_cursor: None,
        }))
    }

    async fn push_batch(&self, batch: &Batch) -> DomainResult<BatchOutcome> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes.lock().push(batch.len());

        // Track per-product overlap across concurrent pushes
        {
            let mut in_flight = self.in_flight.lock();
            for change in &batch.changes {
                if !in_flight.insert(change.product_id.clone()) {
                    self.overlap_detected.store(true, Ordering::SeqCst);
                }
            }
        }
        let live = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(live, Ordering::SeqCst);

        if let Some(delay) = self.push_delay {
            tokio::time::sleep(delay).await;
        }

        let result = match &self.push_mode {
            PushMode::AuthFail => Err(SyncError::Auth("token rejected".to_string())),
            PushMode::RateLimitOnce { retry_after_secs } => {
                if !self.one_shot_fired.swap(true, Ordering::SeqCst) {
                    Err(SyncError::RateLimited {
                        message: "throttled".to_string(),
                        retry_after_secs: *retry_after_secs,
                    })
                } else {
                    Ok(Self::success_outcome(batch))
                }
            }
            PushMode::TransientTimes(n) => {
                if self.push_calls.load(Ordering::SeqCst) <= *n as usize {
                    Err(SyncError::Network("connection reset".to_string()))
                } else {
                    Ok(Self::success_outcome(batch))
                }
            }
            PushMode::RejectProducts(bad) => {
                match batch.changes.iter().find(|c| bad.contains(&c.product_id)) {
                    Some(culprit) => Err(SyncError::Validation(format!(
                        "malformed record {}",
                        culprit.product_id
                    ))),
                    None => Ok(Self::success_outcome(batch)),
                }
            }
            PushMode::Success => Ok(Self::success_outcome(batch)),
        };

        self.concurrent.fetch_sub(1, Ordering::SeqCst);
        {
            let mut in_flight = self.in_flight.lock();
            for change in &batch.changes {
                in_flight.remove(&change.product_id);
            }
        }

        result
    }
}

impl ScriptedTransport {
    fn success_outcome(batch: &Batch) -> BatchOutcome {
        BatchOutcome {
            items: batch
                .changes
                .iter()
                .map(|c| {
                    (c.id, ItemOutcome::Pushed {
                        remote_id: Some(format!("rid-{}", c.product_id)),
                    })
                })
                .collect(),
            rate_limited: None,
        }
    }
}
