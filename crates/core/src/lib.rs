//! # SkuBridge Core
//!
//! The staged bulk synchronization engine: pull remote catalog state,
//! stage per-entity diffs for human approval, then push approved changes
//! through a bounded worker pool that respects the remote API's rate and
//! cost limits.
//!
//! ## Architecture Principles
//! - Only depends on `skubridge-common` and `skubridge-domain`
//! - No database, HTTP, or platform code
//! - All external collaborators (stores, transport, progress) via traits
//! - Pure, testable engine logic

pub mod batch;
pub mod budget;
pub mod client;
pub mod diff;
pub mod dispatch;
pub mod orchestrator;
pub mod ports;
pub mod progress;

// Re-export specific items to avoid ambiguity
pub use batch::{BatchOptimizer, CostModel, WeightedCostModel};
pub use budget::{Admission, RateBudget};
pub use client::CatalogClient;
pub use diff::{DiffEngine, DiffOutcome};
pub use dispatch::Dispatcher;
pub use orchestrator::SyncOrchestrator;
pub use ports::{ProductStore, ProgressSink, RemoteTransport, RunStore, StagingStore};
pub use progress::ProgressReporter;
