//! Greedy cost-bounded batch packing
//!
//! Groups pending operations into request batches that stay under the
//! remote API's per-call cost and size limits while minimizing call count.
//! Cost estimation is injected: the exact metering formula belongs to the
//! remote API contract, not to this optimizer.

use std::sync::Arc;

use skubridge_domain::{Batch, ChangeKind, CostWeights, StagedChange};
use tracing::debug;

/// Estimates the remote cost of one staged change
pub trait CostModel: Send + Sync {
    fn estimate(&self, change: &StagedChange) -> u32;
}

/// Cost model charging per change kind plus per changed field.
///
/// Creates cost more than updates, updates more than deletes; the exact
/// weights come from configuration.
#[derive(Debug, Clone)]
pub struct WeightedCostModel {
    weights: CostWeights,
}

impl WeightedCostModel {
    pub fn new(weights: CostWeights) -> Self {
        Self { weights }
    }
}

impl CostModel for WeightedCostModel {
    fn estimate(&self, change: &StagedChange) -> u32 {
        let base = match change.kind {
            ChangeKind::Create => self.weights.create,
            ChangeKind::Update => self.weights.update,
            ChangeKind::Delete => self.weights.delete,
        };
        base.saturating_add(self.weights.per_field.saturating_mul(change.diff.len() as u32))
    }
}

/// Greedy bin packer over staged changes
pub struct BatchOptimizer {
    cost_model: Arc<dyn CostModel>,
}

impl BatchOptimizer {
    pub fn new(cost_model: Arc<dyn CostModel>) -> Self {
        Self { cost_model }
    }

    /// Estimated cost of one change under the injected model
    pub fn estimate(&self, change: &StagedChange) -> u32 {
        self.cost_model.estimate(change)
    }

    /// Pack items into batches bounded by `max_cost` and `max_count`.
    ///
    /// Items are taken in order; a batch closes as soon as adding the next
    /// item would exceed either bound. An item whose lone cost exceeds
    /// `max_cost` still ships as its own batch so one expensive change can
    /// never wedge the queue; the remote's verdict on it comes back as a
    /// normal per-item outcome.
    pub fn pack(&self, items: Vec<StagedChange>, max_cost: u32, max_count: usize) -> Vec<Batch> {
        let mut batches = Vec::new();
        let mut current: Vec<StagedChange> = Vec::new();
        let mut current_cost: u32 = 0;

        for item in items {
            let cost = self.cost_model.estimate(&item);

            let over_cost = current_cost.saturating_add(cost) > max_cost;
            let over_count = current.len() >= max_count;
            if !current.is_empty() && (over_cost || over_count) {
                batches.push(Batch { changes: std::mem::take(&mut current), estimated_cost: current_cost });
                current_cost = 0;
            }

            current_cost = current_cost.saturating_add(cost);
            current.push(item);
        }

        if !current.is_empty() {
            batches.push(Batch { changes: current, estimated_cost: current_cost });
        }

        debug!(batches = batches.len(), "Packed change batches");
        batches
    }
}

#[cfg(test)]
mod tests {
    use skubridge_domain::{FieldDelta, ProductId};
    use uuid::Uuid;

    use super::*;

    fn change(kind: ChangeKind, fields: usize) -> StagedChange {
        let diff = (0..fields)
            .map(|i| FieldDelta::new(format!("f{i}"), None, Some("v".to_string())))
            .collect();
        StagedChange::new(ProductId::new("SKU-1"), kind, diff, Uuid::new_v4())
    }

    fn optimizer() -> BatchOptimizer {
        BatchOptimizer::new(Arc::new(WeightedCostModel::new(CostWeights::default())))
    }

    #[test]
    fn test_weighted_cost_model() {
        let model = WeightedCostModel::new(CostWeights::default());
        // create=10, update=5, delete=2, +1 per field
        assert_eq!(model.estimate(&change(ChangeKind::Create, 3)), 13);
        assert_eq!(model.estimate(&change(ChangeKind::Update, 1)), 6);
        assert_eq!(model.estimate(&change(ChangeKind::Delete, 0)), 2);
    }

    #[test]
    fn test_pack_respects_both_bounds() {
        let items: Vec<_> = (0..40).map(|_| change(ChangeKind::Update, 4)).collect();
        let model = WeightedCostModel::new(CostWeights::default());
        let batches = optimizer().pack(items, 50, 10);

        assert!(!batches.is_empty());
        for batch in &batches {
            assert!(batch.estimated_cost <= 50);
            assert!(batch.len() <= 10);
            let recomputed: u32 = batch.changes.iter().map(|c| model.estimate(c)).sum();
            assert_eq!(batch.estimated_cost, recomputed);
        }
        let total: usize = batches.iter().map(Batch::len).sum();
        assert_eq!(total, 40);
    }

    #[test]
    fn test_pack_closes_on_count_limit() {
        let items: Vec<_> = (0..237).map(|_| change(ChangeKind::Delete, 0)).collect();
        let batches = optimizer().pack(items, u32::MAX, 50);

        assert_eq!(batches.len(), 5);
        assert_eq!(batches[0].len(), 50);
        assert_eq!(batches[4].len(), 37);
    }

    #[test]
    fn test_pack_closes_on_cost_limit() {
        // Each update with 4 fields costs 9; only 2 fit under 20
        let items: Vec<_> = (0..5).map(|_| change(ChangeKind::Update, 4)).collect();
        let batches = optimizer().pack(items, 20, 100);

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 2);
        assert_eq!(batches[2].len(), 1);
    }

    #[test]
    fn test_oversized_item_ships_alone() {
        let items = vec![change(ChangeKind::Update, 0), change(ChangeKind::Create, 50), change(ChangeKind::Update, 0)];
        let batches = optimizer().pack(items, 10, 100);

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[1].len(), 1);
        assert!(batches[1].estimated_cost > 10);
    }

    #[test]
    fn test_pack_empty_input() {
        assert!(optimizer().pack(Vec::new(), 10, 10).is_empty());
    }

    #[test]
    fn test_preserves_input_order() {
        let items: Vec<_> = (0..7).map(|_| change(ChangeKind::Update, 1)).collect();
        let ids: Vec<_> = items.iter().map(|c| c.id).collect();
        let batches = optimizer().pack(items, u32::MAX, 3);

        let repacked: Vec<_> = batches.iter().flat_map(|b| b.change_ids()).collect();
        assert_eq!(repacked, ids);
    }
}
