//! In-memory object store.
//!
//! Backs tests and embeddable callers with the same optimistic-concurrency
//! semantics a real store provides: every write checks the revision it was
//! read at and bumps it on success.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use virtop_core::{CoreError, ResourceKey, Result, SourceId};
use virtop_provider::{CatalogItem, ManagedResource, PlacementPolicy, ResourceClass};

use super::ObjectStore;

#[derive(Debug, Default)]
struct Inner {
    resources: HashMap<ResourceKey, ManagedResource>,
    items: HashMap<(SourceId, String), CatalogItem>,
    classes: HashMap<String, ResourceClass>,
    metadata_configs: HashMap<(String, String), BTreeMap<String, String>>,
    policies: HashMap<(String, String), PlacementPolicy>,
    storage_policies: HashMap<String, String>,
}

/// Identity of an item within its owner: provider ID, name fallback.
fn item_ident(item: &CatalogItem) -> String {
    match &item.item_id {
        Some(id) if !id.is_empty() => format!("id:{id}"),
        _ => format!("name:{}", item.name),
    }
}

/// `RwLock<HashMap>`-backed [`ObjectStore`] implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a resource class.
    pub async fn put_class(&self, class: ResourceClass) {
        self.inner
            .write()
            .await
            .classes
            .insert(class.name.clone(), class);
    }

    /// Seed a metadata config object.
    pub async fn put_metadata_config(
        &self,
        namespace: &str,
        name: &str,
        data: BTreeMap<String, String>,
    ) {
        self.inner
            .write()
            .await
            .metadata_configs
            .insert((namespace.to_string(), name.to_string()), data);
    }

    /// Seed a placement policy.
    pub async fn put_policy(&self, namespace: &str, policy: PlacementPolicy) {
        self.inner
            .write()
            .await
            .policies
            .insert((namespace.to_string(), policy.name.clone()), policy);
    }

    /// Seed a storage-class to storage-policy mapping.
    pub async fn put_storage_policy(&self, storage_class: &str, policy_id: &str) {
        self.inner
            .write()
            .await
            .storage_policies
            .insert(storage_class.to_string(), policy_id.to_string());
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_resource(&self, key: &ResourceKey) -> Result<ManagedResource> {
        self.inner
            .read()
            .await
            .resources
            .get(key)
            .cloned()
            .ok_or_else(|| CoreError::not_found("ManagedResource", key.to_string()))
    }

    async fn create_resource(&self, resource: &ManagedResource) -> Result<ManagedResource> {
        let mut inner = self.inner.write().await;
        if inner.resources.contains_key(&resource.key) {
            return Err(CoreError::conflict(
                "ManagedResource",
                resource.key.to_string(),
            ));
        }
        let mut stored = resource.clone();
        stored.revision = 1;
        inner.resources.insert(stored.key.clone(), stored.clone());
        Ok(stored)
    }

    async fn update_resource(&self, resource: &ManagedResource) -> Result<ManagedResource> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .resources
            .get_mut(&resource.key)
            .ok_or_else(|| CoreError::not_found("ManagedResource", resource.key.to_string()))?;
        if stored.revision != resource.revision {
            return Err(CoreError::conflict(
                "ManagedResource",
                resource.key.to_string(),
            ));
        }
        stored.spec = resource.spec.clone();
        stored.finalizers = resource.finalizers.clone();
        stored.deletion_timestamp = resource.deletion_timestamp;
        stored.revision += 1;
        Ok(stored.clone())
    }

    async fn update_resource_status(&self, resource: &ManagedResource) -> Result<ManagedResource> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .resources
            .get_mut(&resource.key)
            .ok_or_else(|| CoreError::not_found("ManagedResource", resource.key.to_string()))?;
        if stored.revision != resource.revision {
            return Err(CoreError::conflict(
                "ManagedResource",
                resource.key.to_string(),
            ));
        }
        stored.status = resource.status.clone();
        stored.revision += 1;
        Ok(stored.clone())
    }

    async fn delete_resource(&self, key: &ResourceKey) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .resources
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| CoreError::not_found("ManagedResource", key.to_string()))
    }

    async fn list_items_owned(&self, owner: SourceId) -> Result<Vec<CatalogItem>> {
        let inner = self.inner.read().await;
        let mut owned: Vec<CatalogItem> = inner
            .items
            .values()
            .filter(|item| item.owner == owner)
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(owned)
    }

    async fn create_item(&self, item: &CatalogItem) -> Result<CatalogItem> {
        let mut inner = self.inner.write().await;
        let key = (item.owner, item_ident(item));
        if inner.items.contains_key(&key) {
            return Err(CoreError::conflict("CatalogItem", item.name.clone()));
        }
        let mut stored = item.clone();
        stored.revision = 1;
        inner.items.insert(key, stored.clone());
        Ok(stored)
    }

    async fn update_item(&self, item: &CatalogItem) -> Result<CatalogItem> {
        let mut inner = self.inner.write().await;
        let key = (item.owner, item_ident(item));
        let stored = inner
            .items
            .get_mut(&key)
            .ok_or_else(|| CoreError::not_found("CatalogItem", item.name.clone()))?;
        if stored.revision != item.revision {
            return Err(CoreError::conflict("CatalogItem", item.name.clone()));
        }
        let revision = stored.revision + 1;
        *stored = item.clone();
        stored.revision = revision;
        Ok(stored.clone())
    }

    async fn delete_item(&self, item: &CatalogItem) -> Result<()> {
        let mut inner = self.inner.write().await;
        let key = (item.owner, item_ident(item));
        inner
            .items
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| CoreError::not_found("CatalogItem", item.name.clone()))
    }

    async fn get_class(&self, name: &str) -> Result<ResourceClass> {
        self.inner
            .read()
            .await
            .classes
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::not_found("ResourceClass", name))
    }

    async fn get_metadata_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, String>> {
        self.inner
            .read()
            .await
            .metadata_configs
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| CoreError::not_found("MetadataConfig", format!("{namespace}/{name}")))
    }

    async fn get_policy(&self, namespace: &str, name: &str) -> Result<PlacementPolicy> {
        self.inner
            .read()
            .await
            .policies
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| CoreError::not_found("PlacementPolicy", format!("{namespace}/{name}")))
    }

    async fn get_storage_policy_id(&self, storage_class: &str) -> Result<String> {
        self.inner
            .read()
            .await
            .storage_policies
            .get(storage_class)
            .cloned()
            .ok_or_else(|| CoreError::not_found("StorageClass", storage_class))
    }
}
