//! Sync run records and progress reporting

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::product::ProductId;
use crate::config::SyncConfig;
use crate::constants::MAX_REPORTED_ITEM_ERRORS;
use crate::errors::SyncError;

/// Phase of the pull -> stage -> approve -> push workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Pulling,
    Staging,
    AwaitingApproval,
    Pushing,
    Completed,
    Failed,
    Cancelled,
}

impl RunPhase {
    /// Terminal phases never transition again
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check a phase transition against the workflow.
    ///
    /// `Failed` and `Cancelled` are reachable from any non-terminal phase;
    /// forward progress follows the pull -> stage -> approve -> push order.
    pub fn can_transition_to(self, next: RunPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        if matches!(next, Self::Failed | Self::Cancelled) {
            return true;
        }
        matches!(
            (self, next),
            (Self::Pulling, Self::Staging)
                | (Self::Staging, Self::AwaitingApproval)
                | (Self::AwaitingApproval, Self::Pushing)
                | (Self::Pushing, Self::Completed)
        )
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::Pulling => "pulling",
            RunPhase::Staging => "staging",
            RunPhase::AwaitingApproval => "awaiting_approval",
            RunPhase::Pushing => "pushing",
            RunPhase::Completed => "completed",
            RunPhase::Failed => "failed",
            RunPhase::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Item counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub total: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub conflicted: u64,
}

/// One execution of the pull/push workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: Uuid,
    pub phase: RunPhase,
    pub counts: RunCounts,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Configuration snapshot taken at run start
    pub config: SyncConfig,
    /// Cursor where the next incremental pull resumes
    pub checkpoint: Option<String>,
    /// Whether the pull covered the whole remote catalog
    pub full_pull: bool,
    pub error: Option<String>,
}

impl SyncRun {
    /// Create a run entering the pulling phase
    pub fn new(config: SyncConfig, full_pull: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: RunPhase::Pulling,
            counts: RunCounts::default(),
            started_at: Utc::now(),
            finished_at: None,
            config,
            checkpoint: None,
            full_pull,
            error: None,
        }
    }

    /// Transition to the next phase, enforcing the workflow rules
    pub fn transition(&mut self, next: RunPhase) -> Result<(), SyncError> {
        if !self.phase.can_transition_to(next) {
            return Err(SyncError::InvalidInput(format!(
                "invalid run transition: {} -> {}",
                self.phase, next
            )));
        }
        self.phase = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }
}

/// A single item failure surfaced in the run summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemError {
    pub change_id: Uuid,
    pub product_id: ProductId,
    pub message: String,
}

/// Outcome of the push phase of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub counts: RunCounts,
    /// Bounded list of per-item error messages
    pub errors: Vec<ItemError>,
    /// Count of errors dropped once the bound was reached
    pub truncated_errors: u64,
}

impl RunResult {
    pub fn new(run_id: Uuid) -> Self {
        Self { run_id, counts: RunCounts::default(), errors: Vec::new(), truncated_errors: 0 }
    }

    /// Record an item failure, keeping the reported list bounded
    pub fn record_error(&mut self, error: ItemError) {
        if self.errors.len() < MAX_REPORTED_ITEM_ERRORS {
            self.errors.push(error);
        } else {
            self.truncated_errors += 1;
        }
    }
}

/// Structured progress event emitted through the progress sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub run_id: Uuid,
    pub phase: RunPhase,
    pub processed: u64,
    pub total: u64,
    pub errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        let mut run = SyncRun::new(SyncConfig::default(), true);
        assert_eq!(run.phase, RunPhase::Pulling);
        run.transition(RunPhase::Staging).unwrap();
        run.transition(RunPhase::AwaitingApproval).unwrap();
        run.transition(RunPhase::Pushing).unwrap();
        run.transition(RunPhase::Completed).unwrap();
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn test_cancel_reachable_from_non_terminal() {
        for phase in [RunPhase::Pulling, RunPhase::Staging, RunPhase::AwaitingApproval, RunPhase::Pushing] {
            let mut run = SyncRun::new(SyncConfig::default(), false);
            run.phase = phase;
            run.transition(RunPhase::Cancelled).unwrap();
            assert_eq!(run.phase, RunPhase::Cancelled);
        }
    }

    #[test]
    fn test_terminal_phases_are_immutable() {
        for phase in [RunPhase::Completed, RunPhase::Failed, RunPhase::Cancelled] {
            let mut run = SyncRun::new(SyncConfig::default(), false);
            run.phase = phase;
            assert!(run.transition(RunPhase::Pushing).is_err());
            assert!(run.transition(RunPhase::Cancelled).is_err());
        }
    }

    #[test]
    fn test_skipping_approval_is_rejected() {
        let mut run = SyncRun::new(SyncConfig::default(), false);
        run.transition(RunPhase::Staging).unwrap();
        assert!(run.transition(RunPhase::Pushing).is_err());
    }

    #[test]
    fn test_run_result_bounds_errors() {
        let mut result = RunResult::new(Uuid::new_v4());
        for i in 0..40 {
            result.record_error(ItemError {
                change_id: Uuid::new_v4(),
                product_id: ProductId::new(format!("SKU-{i}")),
                message: "boom".to_string(),
            });
        }
        assert_eq!(result.errors.len(), MAX_REPORTED_ITEM_ERRORS);
        assert_eq!(result.truncated_errors, 40 - MAX_REPORTED_ITEM_ERRORS as u64);
    }
}
