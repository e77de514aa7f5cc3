//! Catalog convergence engine.
//!
//! Converges the locally persisted, source-owned catalog items with what the
//! provider currently reports for that source. One [`sync`] call is one full
//! pass: list owned records, ask the provider (passing the current records
//! as a refetch hint), diff, then apply creates, replaces, and deletes.
//!
//! A provider-list failure aborts the pass and is surfaced verbatim.
//! Persistence failures never abort: they are collected per item, all
//! remaining operations still run, and one aggregate error is returned at
//! the end. There is no rollback; convergence resumes on the next pass.
//!
//! [`sync`]: CatalogSyncer::sync

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use virtop_core::{CoreError, ItemId, Result};
use virtop_provider::{CatalogItem, ItemListing, Provider, Source};

use crate::diff::{self, DiffItem, DiffKey};
use crate::store::ObjectStore;

/// Converges a source-owned catalog against the provider's current report.
pub struct CatalogSyncer<S, P> {
    store: Arc<S>,
    provider: Arc<P>,
}

impl<S: ObjectStore, P: ItemListing> CatalogSyncer<S, P> {
    /// Create a new syncer over the given collaborators.
    pub fn new(store: Arc<S>, provider: Arc<P>) -> Self {
        Self { store, provider }
    }

    /// Run one convergence pass for a source.
    #[instrument(skip(self, cancel, source), fields(source = %source.name))]
    pub async fn sync(&self, cancel: &CancellationToken, source: &Source) -> Result<()> {
        if !self.provider.is_healthy() {
            return Err(CoreError::provider_unavailable(format!(
                "provider {} is unhealthy",
                self.provider.display_name()
            )));
        }

        let persisted = self.store.list_items_owned(source.id).await?;

        let current_by_id: HashMap<ItemId, CatalogItem> = persisted
            .iter()
            .filter_map(|item| {
                item.item_id
                    .clone()
                    .filter(|id| !id.is_empty())
                    .map(|id| (id, item.clone()))
            })
            .collect();

        let reported = self
            .provider
            .list_items(cancel, source, &current_by_id)
            .await?;
        let reported = resolve_display_names(reported, &current_by_id);

        let delta = diff::diff(&persisted, &reported);
        if delta.is_empty() {
            debug!(source_id = %source.id, "Catalog already converged");
            return Ok(());
        }

        let revisions: HashMap<DiffKey, u64> = persisted
            .iter()
            .map(|item| (item.diff_key(), item.revision))
            .collect();

        info!(
            source_id = %source.id,
            added = delta.added.len(),
            removed = delta.removed.len(),
            updated = delta.updated.len(),
            "Converging catalog"
        );

        let mut errors = Vec::new();
        self.create_items(cancel, &delta.added, &mut errors).await;
        self.update_items(cancel, &delta.updated, &revisions, &mut errors)
            .await;
        self.delete_items(cancel, &delta.removed, &mut errors).await;
        CoreError::aggregate(errors)
    }

    /// Persist newly reported items. Display-name collisions across distinct
    /// sources are permitted; identity is source plus item ID, not name.
    async fn create_items(
        &self,
        cancel: &CancellationToken,
        items: &[CatalogItem],
        errors: &mut Vec<CoreError>,
    ) {
        for item in items {
            if cancel.is_cancelled() {
                errors.push(CoreError::Cancelled);
                return;
            }
            match self.store.create_item(item).await {
                Ok(_) => debug!(item = %item.name, "Created catalog item"),
                Err(err) => {
                    warn!(item = %item.name, error = %err, "Failed to create catalog item");
                    errors.push(err);
                }
            }
        }
    }

    /// Replace diverged items wholesale: spec, annotations, and owner
    /// relation all take the provider-reported values.
    async fn update_items(
        &self,
        cancel: &CancellationToken,
        items: &[CatalogItem],
        revisions: &HashMap<DiffKey, u64>,
        errors: &mut Vec<CoreError>,
    ) {
        for item in items {
            if cancel.is_cancelled() {
                errors.push(CoreError::Cancelled);
                return;
            }
            let mut replacement = item.clone();
            replacement.revision = revisions.get(&item.diff_key()).copied().unwrap_or(0);
            match self.store.update_item(&replacement).await {
                Ok(_) => debug!(item = %item.name, "Updated catalog item"),
                Err(err) => {
                    warn!(item = %item.name, error = %err, "Failed to update catalog item");
                    errors.push(err);
                }
            }
        }
    }

    /// Delete items the provider no longer reports. Deleting an already
    /// absent record is a no-op, not an error.
    async fn delete_items(
        &self,
        cancel: &CancellationToken,
        items: &[CatalogItem],
        errors: &mut Vec<CoreError>,
    ) {
        for item in items {
            if cancel.is_cancelled() {
                errors.push(CoreError::Cancelled);
                return;
            }
            match self.store.delete_item(item).await {
                Ok(_) => debug!(item = %item.name, "Deleted catalog item"),
                Err(err) if err.is_not_found() => {
                    debug!(item = %item.name, "Catalog item already gone");
                }
                Err(err) => {
                    warn!(item = %item.name, error = %err, "Failed to delete catalog item");
                    errors.push(err);
                }
            }
        }
    }
}

/// Prefer the provider-reported display name; fall back to the persisted
/// record's own name when the provider omitted it.
fn resolve_display_names(
    reported: Vec<CatalogItem>,
    current_by_id: &HashMap<ItemId, CatalogItem>,
) -> Vec<CatalogItem> {
    reported
        .into_iter()
        .map(|mut item| {
            if item.name.is_empty() {
                if let Some(existing) = item
                    .item_id
                    .as_ref()
                    .and_then(|id| current_by_id.get(id))
                {
                    item.name = existing.name.clone();
                }
            }
            item
        })
        .collect()
}
