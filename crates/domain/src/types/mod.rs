//! Domain types and models

pub mod batch;
pub mod change;
pub mod product;
pub mod run;

pub use batch::{Batch, BatchOutcome, ItemOutcome, RateLimitSignal, RemotePage};
pub use change::{ChangeKind, ChangeStatus, FieldDelta, StagedChange};
pub use product::{ProductId, ProductRecord, RemoteProduct};
pub use run::{ItemError, ProgressEvent, RunCounts, RunPhase, RunResult, SyncRun};
