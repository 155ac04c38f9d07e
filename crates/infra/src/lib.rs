//! # SkuBridge Infrastructure
//!
//! Infrastructure implementations of the core engine's ports.
//!
//! This crate contains:
//! - HTTP transport for the remote catalog API (reqwest)
//! - Access-token providers for request authentication
//! - Progress sinks (tracing, bounded channel)
//! - In-memory store adapters for dry runs and tests
//!
//! ## Architecture
//! - Implements traits defined in `skubridge-core`
//! - Depends on `skubridge-domain` and `skubridge-core`
//! - Contains all "impure" code (network I/O)

pub mod api;
pub mod progress;
pub mod stores;

// Re-export commonly used items
pub use api::{
    AccessTokenProvider, ApiError, ApiErrorCategory, HttpCatalogTransport, HttpTransportConfig,
    StaticTokenProvider,
};
pub use progress::{ChannelProgressSink, TracingProgressSink};
pub use stores::{MemoryProductStore, MemoryRunStore, MemoryStagingStore};
