//! Provider capability traits
//!
//! Capability-based trait definitions for infrastructure providers. The
//! engines depend on exactly the capabilities they use, and test doubles
//! implement the same traits as production clients.
//!
//! Every operation threads a [`CancellationToken`]; cancellation is
//! cooperative and partially applied work simply remains applied until the
//! next pass converges it.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use virtop_core::ItemId;

use crate::error::ProviderResult;
use crate::types::{AttachmentIntent, CatalogItem, ConfigArgs, ManagedResource, PlacementPolicy, Source};

/// Base trait for all providers.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Get the display name for this provider instance.
    fn display_name(&self) -> &str;

    /// Check if the provider is currently healthy.
    ///
    /// A lightweight check; implementations may report cached state.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Capability for listing the catalog items a source currently reports.
#[async_trait]
pub trait ItemListing: Provider {
    /// List the items the provider currently reports for a source.
    ///
    /// # Arguments
    /// * `current` - The locally persisted items keyed by provider item ID.
    ///   Providers may use this as a hint to skip refetching unchanged items;
    ///   they are free to ignore it.
    ///
    /// # Returns
    /// The full current item list for the source.
    async fn list_items(
        &self,
        cancel: &CancellationToken,
        source: &Source,
        current: &HashMap<ItemId, CatalogItem>,
    ) -> ProviderResult<Vec<CatalogItem>>;
}

/// Capability for managing the external counterpart of a managed resource.
#[async_trait]
pub trait ResourceLifecycle: Provider {
    /// Create the external counterpart.
    ///
    /// Implementations fill provider-observed status fields on `resource`.
    async fn create_resource(
        &self,
        cancel: &CancellationToken,
        resource: &mut ManagedResource,
        args: &ConfigArgs,
    ) -> ProviderResult<()>;

    /// Re-apply the desired state to the external counterpart.
    ///
    /// Must be idempotent: the orchestrator calls this on every pass.
    /// Implementations refresh provider-observed status fields on `resource`.
    async fn update_resource(
        &self,
        cancel: &CancellationToken,
        resource: &mut ManagedResource,
        args: &ConfigArgs,
    ) -> ProviderResult<()>;

    /// Delete the external counterpart.
    ///
    /// Returns [`ObjectNotFound`](crate::ProviderError::ObjectNotFound) when
    /// it is already gone; callers treat that as success.
    async fn delete_resource(
        &self,
        cancel: &CancellationToken,
        resource: &ManagedResource,
    ) -> ProviderResult<()>;

    /// Check whether the external counterpart exists.
    async fn resource_exists(
        &self,
        cancel: &CancellationToken,
        resource: &ManagedResource,
    ) -> ProviderResult<bool>;

    /// Check whether a placement policy has been actualized on the platform.
    ///
    /// A policy that is referenced but not yet actualized blocks creation.
    async fn policy_ready(
        &self,
        cancel: &CancellationToken,
        policy: &PlacementPolicy,
    ) -> ProviderResult<bool>;
}

/// Capability for reconciling auxiliary attachments (volumes).
#[async_trait]
pub trait AuxiliaryAttach: Provider {
    /// Attach the given auxiliary resources.
    async fn attach_auxiliary(
        &self,
        cancel: &CancellationToken,
        resource: &ManagedResource,
        attach: &[AttachmentIntent],
    ) -> ProviderResult<()>;

    /// Detach the given auxiliary resources.
    async fn detach_auxiliary(
        &self,
        cancel: &CancellationToken,
        resource: &ManagedResource,
        detach: &[AttachmentIntent],
    ) -> ProviderResult<()>;

    /// Refresh the observed attachment records on `resource` from the
    /// platform's current view.
    async fn refresh_auxiliary_status(
        &self,
        cancel: &CancellationToken,
        resource: &mut ManagedResource,
    ) -> ProviderResult<()>;
}
