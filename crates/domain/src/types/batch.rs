//! Transient batch grouping and remote call outcomes

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::change::StagedChange;
use super::product::RemoteProduct;

/// A group of approved changes sent together in one remote call.
///
/// Batches are assembled by the optimizer and never persisted; their
/// outcome updates each member through the staging store.
#[derive(Debug, Clone)]
pub struct Batch {
    pub changes: Vec<StagedChange>,
    pub estimated_cost: u32,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn change_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.changes.iter().map(|c| c.id)
    }
}

/// Rate-limit signal attached to a remote response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSignal {
    /// Retry hint from the response, when the remote provided one
    pub retry_after: Option<Duration>,
}

/// Per-item result of a batched mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// The mutation was applied; carries the assigned remote id for creates
    Pushed { remote_id: Option<String> },
    /// The mutation failed; `retryable` distinguishes transient failures
    /// from validation rejections
    Failed { message: String, retryable: bool },
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Pushed { .. })
    }
}

/// Result of one batched push call, reported per item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Outcome per staged change id, in batch order
    pub items: Vec<(Uuid, ItemOutcome)>,
    /// Set when the response carried a throttling signal
    pub rate_limited: Option<RateLimitSignal>,
}

impl BatchOutcome {
    /// Outcome with every item pushed
    pub fn all_pushed(ids: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            items: ids
                .into_iter()
                .map(|id| (id, ItemOutcome::Pushed { remote_id: None }))
                .collect(),
            rate_limited: None,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|(_, o)| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }
}

/// One page of a paginated remote fetch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotePage {
    pub records: Vec<RemoteProduct>,
    /// Cursor for the next page; `None` when the collection is exhausted
    pub next_cursor: Option<String>,
}
