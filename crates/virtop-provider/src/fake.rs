//! Closure-overridable provider test double.
//!
//! `FakeProvider` satisfies the same capability traits as a production
//! client, so it is injected through the same constructors instead of being
//! recovered from an interface value by type assertion. Tests can override
//! any single operation with a closure; everything else keeps the default
//! in-memory behavior.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use virtop_core::{ItemId, ResourceKey};

use crate::error::{ProviderError, ProviderResult};
use crate::traits::{AuxiliaryAttach, ItemListing, Provider, ResourceLifecycle};
use crate::types::{
    AttachmentIntent, AttachmentRecord, CatalogItem, ConfigArgs, ManagedResource, PlacementPolicy,
    PowerState, Source,
};

type ListItemsFn = dyn Fn(&Source, &HashMap<ItemId, CatalogItem>) -> ProviderResult<Vec<CatalogItem>>
    + Send
    + Sync;
type MutateFn = dyn Fn(&mut ManagedResource, &ConfigArgs) -> ProviderResult<()> + Send + Sync;
type DeleteFn = dyn Fn(&ManagedResource) -> ProviderResult<()> + Send + Sync;
type ExistsFn = dyn Fn(&ManagedResource) -> ProviderResult<bool> + Send + Sync;
type AttachFn = dyn Fn(&ManagedResource, &[AttachmentIntent]) -> ProviderResult<()> + Send + Sync;

/// Observable in-memory platform state the fake maintains by default.
#[derive(Debug, Default)]
pub struct FakeState {
    /// Keys of resources that currently exist on the fake platform.
    pub created: HashSet<ResourceKey>,
    /// Attachments per resource.
    pub attachments: HashMap<ResourceKey, Vec<AttachmentIntent>>,
    /// Explicit per-policy readiness; policies not listed count as ready.
    pub policy_ready: HashMap<String, bool>,
    /// Chronological log of operations, for assertions.
    pub ops: Vec<String>,
}

/// Provider test double with per-operation closure overrides.
#[derive(Default)]
pub struct FakeProvider {
    state: Mutex<FakeState>,
    address: Mutex<Option<String>>,
    unhealthy: Mutex<bool>,
    list_items_fn: Mutex<Option<Box<ListItemsFn>>>,
    create_fn: Mutex<Option<Box<MutateFn>>>,
    update_fn: Mutex<Option<Box<MutateFn>>>,
    delete_fn: Mutex<Option<Box<DeleteFn>>>,
    exists_fn: Mutex<Option<Box<ExistsFn>>>,
    attach_fn: Mutex<Option<Box<AttachFn>>>,
    detach_fn: Mutex<Option<Box<AttachFn>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Access the fake platform state for seeding or assertions.
    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        lock(&self.state)
    }

    /// Network address handed out once a resource is powered on.
    pub fn set_address(&self, address: Option<&str>) {
        *lock(&self.address) = address.map(ToString::to_string);
    }

    /// Mark a placement policy as (not) actualized.
    pub fn set_policy_ready(&self, name: &str, ready: bool) {
        self.state().policy_ready.insert(name.to_string(), ready);
    }

    /// Flip the health report.
    pub fn set_healthy(&self, healthy: bool) {
        *lock(&self.unhealthy) = !healthy;
    }

    pub fn set_list_items_fn(&self, f: impl Fn(&Source, &HashMap<ItemId, CatalogItem>) -> ProviderResult<Vec<CatalogItem>> + Send + Sync + 'static) {
        *lock(&self.list_items_fn) = Some(Box::new(f));
    }

    pub fn set_create_fn(&self, f: impl Fn(&mut ManagedResource, &ConfigArgs) -> ProviderResult<()> + Send + Sync + 'static) {
        *lock(&self.create_fn) = Some(Box::new(f));
    }

    pub fn set_update_fn(&self, f: impl Fn(&mut ManagedResource, &ConfigArgs) -> ProviderResult<()> + Send + Sync + 'static) {
        *lock(&self.update_fn) = Some(Box::new(f));
    }

    pub fn set_delete_fn(&self, f: impl Fn(&ManagedResource) -> ProviderResult<()> + Send + Sync + 'static) {
        *lock(&self.delete_fn) = Some(Box::new(f));
    }

    pub fn set_exists_fn(&self, f: impl Fn(&ManagedResource) -> ProviderResult<bool> + Send + Sync + 'static) {
        *lock(&self.exists_fn) = Some(Box::new(f));
    }

    pub fn set_attach_fn(&self, f: impl Fn(&ManagedResource, &[AttachmentIntent]) -> ProviderResult<()> + Send + Sync + 'static) {
        *lock(&self.attach_fn) = Some(Box::new(f));
    }

    pub fn set_detach_fn(&self, f: impl Fn(&ManagedResource, &[AttachmentIntent]) -> ProviderResult<()> + Send + Sync + 'static) {
        *lock(&self.detach_fn) = Some(Box::new(f));
    }

    /// Drop all overrides and platform state.
    pub fn reset(&self) {
        *self.state() = FakeState::default();
        *lock(&self.address) = None;
        *lock(&self.unhealthy) = false;
        *lock(&self.list_items_fn) = None;
        *lock(&self.create_fn) = None;
        *lock(&self.update_fn) = None;
        *lock(&self.delete_fn) = None;
        *lock(&self.exists_fn) = None;
        *lock(&self.attach_fn) = None;
        *lock(&self.detach_fn) = None;
    }

    fn log(&self, op: impl Into<String>) {
        self.state().ops.push(op.into());
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn display_name(&self) -> &str {
        "fake-provider"
    }

    fn is_healthy(&self) -> bool {
        !*lock(&self.unhealthy)
    }
}

#[async_trait]
impl ItemListing for FakeProvider {
    async fn list_items(
        &self,
        _cancel: &CancellationToken,
        source: &Source,
        current: &HashMap<ItemId, CatalogItem>,
    ) -> ProviderResult<Vec<CatalogItem>> {
        self.log(format!("list_items {}", source.name));
        if let Some(f) = lock(&self.list_items_fn).as_ref() {
            return f(source, current);
        }
        Ok(Vec::new())
    }
}

#[async_trait]
impl ResourceLifecycle for FakeProvider {
    async fn create_resource(
        &self,
        _cancel: &CancellationToken,
        resource: &mut ManagedResource,
        args: &ConfigArgs,
    ) -> ProviderResult<()> {
        self.log(format!("create {}", resource.key));
        if let Some(f) = lock(&self.create_fn).as_ref() {
            return f(resource, args);
        }
        let mut state = self.state();
        if !state.created.insert(resource.key.clone()) {
            return Err(ProviderError::ObjectAlreadyExists {
                identifier: resource.key.to_string(),
            });
        }
        Ok(())
    }

    async fn update_resource(
        &self,
        _cancel: &CancellationToken,
        resource: &mut ManagedResource,
        args: &ConfigArgs,
    ) -> ProviderResult<()> {
        self.log(format!("update {}", resource.key));
        if let Some(f) = lock(&self.update_fn).as_ref() {
            return f(resource, args);
        }
        if !self.state().created.contains(&resource.key) {
            return Err(ProviderError::not_found(resource.key.to_string()));
        }
        resource.status.power_state = Some(resource.spec.power_state);
        if resource.spec.power_state == PowerState::PoweredOn {
            resource.status.address = lock(&self.address).clone();
        }
        Ok(())
    }

    async fn delete_resource(
        &self,
        _cancel: &CancellationToken,
        resource: &ManagedResource,
    ) -> ProviderResult<()> {
        self.log(format!("delete {}", resource.key));
        if let Some(f) = lock(&self.delete_fn).as_ref() {
            return f(resource);
        }
        let mut state = self.state();
        if !state.created.remove(&resource.key) {
            return Err(ProviderError::not_found(resource.key.to_string()));
        }
        state.attachments.remove(&resource.key);
        Ok(())
    }

    async fn resource_exists(
        &self,
        _cancel: &CancellationToken,
        resource: &ManagedResource,
    ) -> ProviderResult<bool> {
        self.log(format!("exists {}", resource.key));
        if let Some(f) = lock(&self.exists_fn).as_ref() {
            return f(resource);
        }
        Ok(self.state().created.contains(&resource.key))
    }

    async fn policy_ready(
        &self,
        _cancel: &CancellationToken,
        policy: &PlacementPolicy,
    ) -> ProviderResult<bool> {
        Ok(self
            .state()
            .policy_ready
            .get(&policy.name)
            .copied()
            .unwrap_or(true))
    }
}

#[async_trait]
impl AuxiliaryAttach for FakeProvider {
    async fn attach_auxiliary(
        &self,
        _cancel: &CancellationToken,
        resource: &ManagedResource,
        attach: &[AttachmentIntent],
    ) -> ProviderResult<()> {
        self.log(format!("attach {} x{}", resource.key, attach.len()));
        if let Some(f) = lock(&self.attach_fn).as_ref() {
            return f(resource, attach);
        }
        let mut state = self.state();
        let entries = state.attachments.entry(resource.key.clone()).or_default();
        for intent in attach {
            if !entries.iter().any(|a| a.name == intent.name) {
                entries.push(intent.clone());
            }
        }
        Ok(())
    }

    async fn detach_auxiliary(
        &self,
        _cancel: &CancellationToken,
        resource: &ManagedResource,
        detach: &[AttachmentIntent],
    ) -> ProviderResult<()> {
        self.log(format!("detach {} x{}", resource.key, detach.len()));
        if let Some(f) = lock(&self.detach_fn).as_ref() {
            return f(resource, detach);
        }
        let mut state = self.state();
        if let Some(entries) = state.attachments.get_mut(&resource.key) {
            entries.retain(|a| !detach.iter().any(|d| d.name == a.name));
        }
        Ok(())
    }

    async fn refresh_auxiliary_status(
        &self,
        _cancel: &CancellationToken,
        resource: &mut ManagedResource,
    ) -> ProviderResult<()> {
        self.log(format!("refresh_attachments {}", resource.key));
        let state = self.state();
        let entries = state
            .attachments
            .get(&resource.key)
            .cloned()
            .unwrap_or_default();
        resource.status.attachments = entries
            .iter()
            .map(|a| AttachmentRecord {
                name: a.name.clone(),
                claim_name: a.claim_name.clone(),
                attached: true,
                error: None,
            })
            .collect();
        Ok(())
    }
}
