//! Batch packing for cost-metered remote calls

mod optimizer;

pub use optimizer::{BatchOptimizer, CostModel, WeightedCostModel};
