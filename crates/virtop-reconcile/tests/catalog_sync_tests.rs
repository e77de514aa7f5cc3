//! End-to-end catalog convergence tests against the in-memory store and the
//! closure-overridable fake provider.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use virtop_core::{CoreError, ItemId, ResourceKey, Result, SourceId};
use virtop_provider::fake::FakeProvider;
use virtop_provider::{
    CatalogItem, ManagedResource, PlacementPolicy, ProviderError, ResourceClass, Source,
};
use virtop_reconcile::{CatalogSyncer, MemoryStore, ObjectStore};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn item(owner: SourceId, id: &str, name: &str) -> CatalogItem {
    CatalogItem::new(owner, name)
        .with_item_id(id)
        .with_type_tag("ovf")
}

#[tokio::test]
async fn test_sync_persists_reported_items() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(FakeProvider::new());
    let source = Source::new(SourceId::new(), "content-library");

    provider.set_list_items_fn({
        let owner = source.id;
        move |_, _| Ok(vec![item(owner, "i-1", "ubuntu"), item(owner, "i-2", "centos")])
    });

    let syncer = CatalogSyncer::new(store.clone(), provider);
    syncer
        .sync(&CancellationToken::new(), &source)
        .await
        .unwrap();

    let persisted = store.list_items_owned(source.id).await.unwrap();
    assert_eq!(persisted.len(), 2);
    assert!(persisted.iter().all(|i| i.revision == 1));
}

#[tokio::test]
async fn test_second_sync_is_noop_and_passes_current_items_as_hint() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(FakeProvider::new());
    let source = Source::new(SourceId::new(), "content-library");

    let hint_sizes = Arc::new(Mutex::new(Vec::new()));
    provider.set_list_items_fn({
        let owner = source.id;
        let hint_sizes = hint_sizes.clone();
        move |_, current: &HashMap<ItemId, CatalogItem>| {
            hint_sizes.lock().unwrap().push(current.len());
            Ok(vec![item(owner, "i-1", "ubuntu")])
        }
    });

    let syncer = CatalogSyncer::new(store.clone(), provider);
    let cancel = CancellationToken::new();
    syncer.sync(&cancel, &source).await.unwrap();
    syncer.sync(&cancel, &source).await.unwrap();

    // the first pass sees an empty store, the second gets the persisted item
    assert_eq!(*hint_sizes.lock().unwrap(), vec![0, 1]);

    // an unchanged report writes nothing, so revisions stay at 1
    let persisted = store.list_items_owned(source.id).await.unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].revision, 1);
}

#[tokio::test]
async fn test_changed_item_is_replaced_and_vanished_item_removed() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(FakeProvider::new());
    let source = Source::new(SourceId::new(), "content-library");

    provider.set_list_items_fn({
        let owner = source.id;
        move |_, _| Ok(vec![item(owner, "i-1", "ubuntu"), item(owner, "i-2", "centos")])
    });
    let syncer = CatalogSyncer::new(store.clone(), Arc::clone(&provider));
    let cancel = CancellationToken::new();
    syncer.sync(&cancel, &source).await.unwrap();

    // i-1 changes its type tag, i-2 disappears
    provider.set_list_items_fn({
        let owner = source.id;
        move |_, _| Ok(vec![item(owner, "i-1", "ubuntu").with_type_tag("iso")])
    });
    syncer.sync(&cancel, &source).await.unwrap();

    let persisted = store.list_items_owned(source.id).await.unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].type_tag, "iso");
    assert_eq!(persisted[0].revision, 2);
}

#[tokio::test]
async fn test_same_display_name_under_different_sources_both_persist() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(FakeProvider::new());
    let source_a = Source::new(SourceId::new(), "library-a");
    let source_b = Source::new(SourceId::new(), "library-b");

    provider.set_list_items_fn(move |source: &Source, _| {
        Ok(vec![CatalogItem::new(source.id, "ubuntu")])
    });

    let syncer = CatalogSyncer::new(store.clone(), provider);
    let cancel = CancellationToken::new();
    syncer.sync(&cancel, &source_a).await.unwrap();
    syncer.sync(&cancel, &source_b).await.unwrap();

    assert_eq!(store.list_items_owned(source_a.id).await.unwrap().len(), 1);
    assert_eq!(store.list_items_owned(source_b.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unhealthy_provider_fails_fast() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(FakeProvider::new());
    provider.set_healthy(false);
    let source = Source::new(SourceId::new(), "content-library");

    let syncer = CatalogSyncer::new(store, provider.clone());
    let err = syncer
        .sync(&CancellationToken::new(), &source)
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    // the pass never reached the provider listing
    assert!(provider.state().ops.is_empty());
}

#[tokio::test]
async fn test_provider_list_error_aborts_pass() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(FakeProvider::new());
    let source = Source::new(SourceId::new(), "content-library");

    provider.set_list_items_fn(|_, _| Err(ProviderError::unavailable("endpoint flapping")));

    let syncer = CatalogSyncer::new(store.clone(), provider);
    let err = syncer
        .sync(&CancellationToken::new(), &source)
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert!(store.list_items_owned(source.id).await.unwrap().is_empty());
}

/// Store wrapper failing `create_item` for one specific display name while
/// delegating everything else.
struct FlakyStore {
    inner: MemoryStore,
    reject_name: String,
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn get_resource(&self, key: &ResourceKey) -> Result<ManagedResource> {
        self.inner.get_resource(key).await
    }
    async fn create_resource(&self, resource: &ManagedResource) -> Result<ManagedResource> {
        self.inner.create_resource(resource).await
    }
    async fn update_resource(&self, resource: &ManagedResource) -> Result<ManagedResource> {
        self.inner.update_resource(resource).await
    }
    async fn update_resource_status(&self, resource: &ManagedResource) -> Result<ManagedResource> {
        self.inner.update_resource_status(resource).await
    }
    async fn delete_resource(&self, key: &ResourceKey) -> Result<()> {
        self.inner.delete_resource(key).await
    }
    async fn list_items_owned(&self, owner: SourceId) -> Result<Vec<CatalogItem>> {
        self.inner.list_items_owned(owner).await
    }
    async fn create_item(&self, item: &CatalogItem) -> Result<CatalogItem> {
        if item.name == self.reject_name {
            return Err(CoreError::internal("simulated write failure"));
        }
        self.inner.create_item(item).await
    }
    async fn update_item(&self, item: &CatalogItem) -> Result<CatalogItem> {
        self.inner.update_item(item).await
    }
    async fn delete_item(&self, item: &CatalogItem) -> Result<()> {
        self.inner.delete_item(item).await
    }
    async fn get_class(&self, name: &str) -> Result<ResourceClass> {
        self.inner.get_class(name).await
    }
    async fn get_metadata_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, String>> {
        self.inner.get_metadata_config(namespace, name).await
    }
    async fn get_policy(&self, namespace: &str, name: &str) -> Result<PlacementPolicy> {
        self.inner.get_policy(namespace, name).await
    }
    async fn get_storage_policy_id(&self, storage_class: &str) -> Result<String> {
        self.inner.get_storage_policy_id(storage_class).await
    }
}

#[tokio::test]
async fn test_one_failed_write_does_not_abort_the_rest() {
    init_tracing();
    let store = Arc::new(FlakyStore {
        inner: MemoryStore::new(),
        reject_name: "centos".to_string(),
    });
    let provider = Arc::new(FakeProvider::new());
    let source = Source::new(SourceId::new(), "content-library");

    provider.set_list_items_fn({
        let owner = source.id;
        move |_, _| {
            Ok(vec![
                item(owner, "i-1", "ubuntu"),
                item(owner, "i-2", "centos"),
                item(owner, "i-3", "debian"),
            ])
        }
    });

    let syncer = CatalogSyncer::new(store.clone(), provider);
    let err = syncer
        .sync(&CancellationToken::new(), &source)
        .await
        .unwrap_err();
    assert!(!err.is_retryable());

    // the failing item is reported, the others are still applied
    let persisted = store.list_items_owned(source.id).await.unwrap();
    let names: Vec<&str> = persisted.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["debian", "ubuntu"]);
}
