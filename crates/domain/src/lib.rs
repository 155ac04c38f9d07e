//! # SkuBridge Domain
//!
//! Business domain types and models for the catalog sync engine.
//!
//! This crate contains:
//! - Domain data types (ProductRecord, StagedChange, SyncRun, Batch)
//! - Domain error types and Result definitions
//! - Run configuration structures
//! - Field normalization and fingerprint utilities
//!
//! ## Architecture
//! - No dependencies on other SkuBridge crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;
pub mod utils;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
pub use utils::normalize::{fingerprint_fields, normalize_value};
