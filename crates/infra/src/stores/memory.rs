//! In-memory implementations of the engine's store ports
//!
//! Backed by mutex-guarded maps. Upserts are atomic per record and the
//! staging store enforces the status lifecycle, so engine behaviour over
//! these adapters matches a conforming persistent store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use skubridge_core::ports::{ProductStore, RunStore, StagingStore};
use skubridge_domain::{
    ChangeStatus, FieldDelta, ProductId, ProductRecord, Result as DomainResult, StagedChange,
    SyncError, SyncRun,
};
use uuid::Uuid;

/// In-memory `ProductStore`
#[derive(Default, Clone)]
pub struct MemoryProductStore {
    records: Arc<Mutex<BTreeMap<ProductId, ProductRecord>>>,
}

impl MemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record (builder style, for wiring up dry runs)
    pub fn with_product(self, record: ProductRecord) -> Self {
        self.records.lock().insert(record.id.clone(), record);
        self
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
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

/// In-memory `StagingStore` enforcing the change lifecycle
#[derive(Default, Clone)]
pub struct MemoryStagingStore {
    changes: Arc<Mutex<HashMap<Uuid, StagedChange>>>,
}

impl MemoryStagingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored change, in no particular order
    pub fn all(&self) -> Vec<StagedChange> {
        self.changes.lock().values().cloned().collect()
    }

    /// Approve every pending change of a run, returning how many moved.
    ///
    /// Stands in for the external approval actor in dry runs and tests.
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
        let change =
            changes.get_mut(&id).ok_or_else(|| SyncError::NotFound(format!("change {id}")))?;
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
        let change =
            changes.get_mut(&id).ok_or_else(|| SyncError::NotFound(format!("change {id}")))?;
        change.conflict = true;
        change.diff.extend(remote_side);
        Ok(())
    }
}

/// In-memory `RunStore`
#[derive(Default, Clone)]
pub struct MemoryRunStore {
    runs: Arc<Mutex<HashMap<Uuid, SyncRun>>>,
    checkpoint: Arc<Mutex<Option<String>>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
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
