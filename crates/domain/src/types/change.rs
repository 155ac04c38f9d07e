//! Staged changes: proposed, approval-gated catalog mutations

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::product::ProductId;

/// Kind of mutation a staged change applies to the remote catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Create => write!(f, "create"),
            ChangeKind::Update => write!(f, "update"),
            ChangeKind::Delete => write!(f, "delete"),
        }
    }
}

/// Staged change lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Pending,
    Approved,
    Rejected,
    Pushed,
    Failed,
    Cancelled,
}

impl ChangeStatus {
    /// Terminal statuses never transition again
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Pushed | Self::Failed | Self::Cancelled)
    }

    /// Whether a change in this status still blocks new diffs for its product
    pub fn is_unresolved(self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }

    /// Check a status transition against the lifecycle
    /// `pending -> approved|rejected|cancelled`, `approved -> pushed|failed|cancelled`
    pub fn can_transition_to(self, next: ChangeStatus) -> bool {
        match self {
            Self::Pending => {
                matches!(next, Self::Approved | Self::Rejected | Self::Cancelled)
            }
            Self::Approved => matches!(next, Self::Pushed | Self::Failed | Self::Cancelled),
            _ => false,
        }
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeStatus::Pending => "pending",
            ChangeStatus::Approved => "approved",
            ChangeStatus::Rejected => "rejected",
            ChangeStatus::Pushed => "pushed",
            ChangeStatus::Failed => "failed",
            ChangeStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One field-level difference inside a staged change.
///
/// `old` is absent for fields the local record never had; `new` is absent
/// for fields removed on the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDelta {
    pub field: String,
    pub old: Option<String>,
    pub new: Option<String>,
}

impl FieldDelta {
    pub fn new(field: impl Into<String>, old: Option<String>, new: Option<String>) -> Self {
        Self { field: field.into(), old, new }
    }
}

/// A proposed, not-yet-applied modification to one product.
///
/// Immutable once created: corrections are new rows referencing the prior
/// one through `supersedes`. Status transitions happen through the staging
/// store, which owns persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedChange {
    pub id: Uuid,
    pub product_id: ProductId,
    pub kind: ChangeKind,
    /// Ordered field-level diff
    pub diff: Vec<FieldDelta>,
    /// The pull run that produced this change
    pub source_run: Uuid,
    pub status: ChangeStatus,
    /// Set when a newer diff for the same product arrived before resolution
    pub conflict: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Prior staged change this row corrects, if any
    pub supersedes: Option<Uuid>,
}

impl StagedChange {
    /// Create a pending staged change
    pub fn new(
        product_id: ProductId,
        kind: ChangeKind,
        diff: Vec<FieldDelta>,
        source_run: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id,
            kind,
            diff,
            source_run,
            status: ChangeStatus::Pending,
            conflict: false,
            error: None,
            created_at: Utc::now(),
            resolved_at: None,
            supersedes: None,
        }
    }

    /// Reference the staged change this one corrects
    pub fn with_supersedes(mut self, prior: Uuid) -> Self {
        self.supersedes = Some(prior);
        self
    }

    /// Names of the fields this change touches
    pub fn changed_fields(&self) -> impl Iterator<Item = &str> {
        self.diff.iter().map(|d| d.field.as_str())
    }

    /// Whether this change still blocks new diffs for its product
    pub fn is_unresolved(&self) -> bool {
        self.status.is_unresolved()
    }
}
