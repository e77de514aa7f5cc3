//! # Provider Framework
//!
//! Core abstractions for connecting virtop to an external infrastructure
//! provider (a virtualization platform and its content-catalog service).
//!
//! The reconciliation engines never talk to a concrete platform; they consume
//! the capability traits defined here, and both production clients and test
//! doubles satisfy them identically.
//!
//! ## Architecture
//!
//! The framework uses a capability-based trait system:
//!
//! - [`Provider`] - Base trait all providers implement
//! - [`ItemListing`] - List catalog items a source currently reports
//! - [`ResourceLifecycle`] - Create/update/delete/exists for managed resources
//! - [`AuxiliaryAttach`] - Attach/detach auxiliary resources (volumes)
//!
//! ## Crate Organization
//!
//! - [`types`] - Domain types (`CatalogItem`, `ManagedResource`, ...)
//! - [`error`] - Provider errors with transient/permanent classification
//! - [`traits`] - Provider capability traits
//! - [`fake`] - Closure-overridable test double

pub mod error;
pub mod fake;
pub mod traits;
pub mod types;

pub use error::{ProviderError, ProviderResult};
pub use fake::FakeProvider;
pub use traits::{AuxiliaryAttach, ItemListing, Provider, ResourceLifecycle};
pub use types::{
    AttachmentIntent, AttachmentRecord, CatalogItem, ConfigArgs, ManagedResource, PlacementPolicy,
    PowerState, ResourceClass, ResourcePhase, ResourceSpec, ResourceStatus, Source, VolumeSpec,
};
