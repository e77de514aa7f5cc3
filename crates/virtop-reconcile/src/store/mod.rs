//! Persistence collaborator boundary.
//!
//! The engines read and write records exclusively through [`ObjectStore`].
//! Writes use optimistic concurrency: an update fails with
//! [`Conflict`](virtop_core::CoreError::Conflict) when the underlying record
//! changed since it was read, and the caller retries the entire pass.
//! Owner relations are explicit foreign-key attributes queryable by listing,
//! never ownership pointers.

pub mod memory;

use async_trait::async_trait;
use std::collections::BTreeMap;

use virtop_core::{ResourceKey, Result, SourceId};
use virtop_provider::{CatalogItem, ManagedResource, PlacementPolicy, ResourceClass};

/// Declarative object store consumed by the engines.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get a managed resource by key.
    async fn get_resource(&self, key: &ResourceKey) -> Result<ManagedResource>;

    /// Create a managed resource record.
    async fn create_resource(&self, resource: &ManagedResource) -> Result<ManagedResource>;

    /// Write spec and metadata (finalizers, deletion marker) of a resource.
    ///
    /// Fails with Conflict when `resource.revision` is stale. Returns the
    /// stored record with its new revision.
    async fn update_resource(&self, resource: &ManagedResource) -> Result<ManagedResource>;

    /// Write only the status of a resource, with the same conflict semantics
    /// as [`update_resource`](Self::update_resource).
    async fn update_resource_status(&self, resource: &ManagedResource) -> Result<ManagedResource>;

    /// Delete a managed resource record.
    async fn delete_resource(&self, key: &ResourceKey) -> Result<()>;

    /// List the catalog items whose owner relation is the given source.
    async fn list_items_owned(&self, owner: SourceId) -> Result<Vec<CatalogItem>>;

    /// Persist a new catalog item.
    async fn create_item(&self, item: &CatalogItem) -> Result<CatalogItem>;

    /// Replace a persisted catalog item (spec, annotations, owner relation).
    ///
    /// Fails with Conflict when `item.revision` is stale.
    async fn update_item(&self, item: &CatalogItem) -> Result<CatalogItem>;

    /// Delete a persisted catalog item.
    ///
    /// Fails with NotFound when absent; callers decide whether that matters.
    async fn delete_item(&self, item: &CatalogItem) -> Result<()>;

    /// Resolve a resource class by name.
    async fn get_class(&self, name: &str) -> Result<ResourceClass>;

    /// Resolve the metadata payload from a named config object.
    async fn get_metadata_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, String>>;

    /// Resolve a placement policy by namespace and name.
    async fn get_policy(&self, namespace: &str, name: &str) -> Result<PlacementPolicy>;

    /// Resolve the storage policy ID backing a storage class.
    async fn get_storage_policy_id(&self, storage_class: &str) -> Result<String>;
}
