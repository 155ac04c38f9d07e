//! Diff computation and change staging

mod engine;

pub use engine::{DiffEngine, DiffOutcome};
