//! Diff/staging engine
//!
//! Compares pulled remote records against local truth and stages at most
//! one immutable change per product. The fingerprint short-circuit is the
//! primary cost saver on large catalogs: records whose normalized content
//! matches produce no staging work at all.
//!
//! Diff orientation: `old` holds the current local value, `new` the value
//! the change proposes. Pull-produced updates propose adopting the remote
//! values; export creates propose publishing the local record.

use std::collections::BTreeSet;
use std::sync::Arc;

use skubridge_domain::utils::normalize::values_equal;
use skubridge_domain::{ChangeKind, FieldDelta, ProductRecord, RemoteProduct, StagedChange};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::ports::StagingStore;

/// Result of one staging decision
#[derive(Debug, Clone)]
pub enum DiffOutcome {
    /// Fingerprints matched or every field compared equal
    Unchanged,
    /// A new change was created and persisted
    Staged(StagedChange),
    /// An unresolved change for this product already existed; it was
    /// flagged conflicted instead of creating a duplicate
    ConflictFlagged(Uuid),
}

/// Stages per-entity diffs through the staging store
pub struct DiffEngine {
    staging: Arc<dyn StagingStore>,
}

impl DiffEngine {
    pub fn new(staging: Arc<dyn StagingStore>) -> Self {
        Self { staging }
    }

    /// Diff a pulled remote record against the local record, staging an
    /// update toward remote truth when they diverge.
    #[instrument(skip(self, remote, local), fields(product = %remote.product_id))]
    pub async fn stage_remote(
        &self,
        run_id: Uuid,
        remote: &RemoteProduct,
        local: Option<&ProductRecord>,
    ) -> skubridge_domain::Result<DiffOutcome> {
        if let Some(record) = local {
            if record.fingerprint == remote.fingerprint() {
                return Ok(DiffOutcome::Unchanged);
            }
        }

        let diff = Self::field_diff(local, remote);
        if diff.is_empty() {
            return Ok(DiffOutcome::Unchanged);
        }

        self.stage(StagedChange::new(
            remote.product_id.clone(),
            ChangeKind::Update,
            diff,
            run_id,
        ))
        .await
    }

    /// Stage a create publishing a local-only record to the remote
    #[instrument(skip(self, local), fields(product = %local.id))]
    pub async fn stage_export_create(
        &self,
        run_id: Uuid,
        local: &ProductRecord,
    ) -> skubridge_domain::Result<DiffOutcome> {
        let diff = local
            .fields
            .iter()
            .map(|(field, value)| FieldDelta::new(field.clone(), None, Some(value.clone())))
            .collect();

        self.stage(StagedChange::new(local.id.clone(), ChangeKind::Create, diff, run_id)).await
    }

    /// Stage a deletion for a local record whose remote counterpart
    /// disappeared. Callers must only invoke this after a *full* pull;
    /// absence from a partial or filtered pull proves nothing.
    #[instrument(skip(self, local), fields(product = %local.id))]
    pub async fn stage_deletion(
        &self,
        run_id: Uuid,
        local: &ProductRecord,
    ) -> skubridge_domain::Result<DiffOutcome> {
        let diff = local
            .fields
            .iter()
            .map(|(field, value)| FieldDelta::new(field.clone(), Some(value.clone()), None))
            .collect();

        self.stage(StagedChange::new(local.id.clone(), ChangeKind::Delete, diff, run_id)).await
    }

    /// Persist a change unless an unresolved one already exists for the
    /// product. A second diff never creates a duplicate row: the existing
    /// change is flagged conflicted with the newly observed side appended,
    /// so both sides stay visible for manual resolution.
    async fn stage(&self, change: StagedChange) -> skubridge_domain::Result<DiffOutcome> {
        if let Some(existing) = self.staging.get_unresolved(&change.product_id).await? {
            let existing_fields: BTreeSet<&str> = existing.changed_fields().collect();
            let overlapping = change.changed_fields().any(|f| existing_fields.contains(f));

            debug!(
                product = %change.product_id,
                existing = %existing.id,
                overlapping = overlapping,
                "Unresolved change already staged, flagging conflict"
            );
            self.staging.mark_conflict(existing.id, change.diff).await?;
            return Ok(DiffOutcome::ConflictFlagged(existing.id));
        }

        self.staging.create_change(change.clone()).await?;
        Ok(DiffOutcome::Staged(change))
    }

    /// Field-level diff between the local record and the remote one, in
    /// remote field order, with local-only fields appended. Values that
    /// compare equal after normalization produce no delta.
    fn field_diff(local: Option<&ProductRecord>, remote: &RemoteProduct) -> Vec<FieldDelta> {
        let mut diff = Vec::new();

        for (field, remote_value) in &remote.fields {
            let local_value = local.and_then(|r| r.fields.get(field));
            match local_value {
                Some(value) if values_equal(value, remote_value) => {}
                Some(value) => diff.push(FieldDelta::new(
                    field.clone(),
                    Some(value.clone()),
                    Some(remote_value.clone()),
                )),
                None => diff.push(FieldDelta::new(field.clone(), None, Some(remote_value.clone()))),
            }
        }

        if let Some(record) = local {
            for (field, local_value) in &record.fields {
                if !remote.fields.contains_key(field) {
                    diff.push(FieldDelta::new(field.clone(), Some(local_value.clone()), None));
                }
            }
        }

        diff
    }
}
