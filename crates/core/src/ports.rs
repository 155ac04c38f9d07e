//! Port interfaces for the collaborators the engine consumes
//!
//! The relational schema, the staging persistence, the remote wire
//! protocol, and the dashboard/event layer all live outside this crate;
//! the engine reaches them only through these traits.

use async_trait::async_trait;
use skubridge_domain::{
    Batch, BatchOutcome, ChangeStatus, FieldDelta, ProductId, ProductRecord, ProgressEvent,
    RemotePage, Result, StagedChange, SyncRun,
};
use uuid::Uuid;

/// Trait for the local product catalog store
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Fetch one product record
    async fn get_product(&self, id: &ProductId) -> Result<Option<ProductRecord>>;

    /// Insert or replace a product record (atomic per record)
    async fn upsert_product(&self, record: ProductRecord) -> Result<()>;

    /// List every known product id
    async fn list_ids(&self) -> Result<Vec<ProductId>>;
}

/// Trait for the staged-change store
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Persist a newly created staged change
    async fn create_change(&self, change: StagedChange) -> Result<()>;

    /// Fetch one staged change by id
    async fn get_change(&self, id: Uuid) -> Result<Option<StagedChange>>;

    /// The unresolved (pending or approved, not yet pushed) change for a
    /// product, if one exists
    async fn get_unresolved(&self, product_id: &ProductId) -> Result<Option<StagedChange>>;

    /// Approved changes produced by the given run
    async fn list_approved(&self, run_id: Uuid) -> Result<Vec<StagedChange>>;

    /// Transition a change's status, recording an error message for failures
    async fn mark_status(
        &self,
        id: Uuid,
        status: ChangeStatus,
        error: Option<String>,
    ) -> Result<()>;

    /// Flag a change as conflicted, appending the newly observed remote
    /// side to its diff so both sides stay visible for manual review
    async fn mark_conflict(&self, id: Uuid, remote_side: Vec<FieldDelta>) -> Result<()>;
}

/// Trait for persisting run state across process restarts
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persist the run record (insert or replace)
    async fn save_run(&self, run: &SyncRun) -> Result<()>;

    /// Load a run by id
    async fn load_run(&self, id: Uuid) -> Result<Option<SyncRun>>;

    /// Checkpoint cursor of the most recent successfully pulled run
    async fn latest_checkpoint(&self) -> Result<Option<String>>;
}

/// Thin transport to the remote catalog API.
///
/// Implementations translate wire-level failures into the domain error
/// taxonomy; retry, backoff, and budget handling stay in the engine.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Fetch one page of the remote catalog
    async fn fetch_page(&self, cursor: Option<String>) -> Result<RemotePage>;

    /// Apply a batch of approved changes remotely, reported per item
    async fn push_batch(&self, batch: &Batch) -> Result<BatchOutcome>;
}

/// Sink for structured progress events.
///
/// Implementations must be non-blocking; the engine fires and forgets.
pub trait ProgressSink: Send + Sync {
    fn publish(&self, event: ProgressEvent);
}
