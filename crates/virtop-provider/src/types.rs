//! Domain types shared by the provider boundary and the engines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use virtop_core::conditions::Condition;
use virtop_core::{ItemId, ResourceKey, SourceId};

/// An external catalog from which derived items are synced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Local identity of the source.
    pub id: SourceId,
    /// Display name of the source.
    pub name: String,
    /// Provider-side identifier of the backing catalog, when known.
    pub external_id: Option<String>,
}

impl Source {
    pub fn new(id: SourceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            external_id: None,
        }
    }
}

/// A locally persisted record for something the provider reports for a source.
///
/// Identity is (owner, item ID), with the display name as a documented
/// fallback when the provider did not assign an ID. Display names may collide
/// across distinct sources; that is not a conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Provider-assigned item ID; absent when the provider reported none.
    pub item_id: Option<ItemId>,
    /// Display name.
    pub name: String,
    /// Item type tag (e.g. an image format).
    pub type_tag: String,
    /// Spec payload, opaque to the engines.
    pub spec: serde_json::Value,
    /// Free-form annotations.
    pub annotations: BTreeMap<String, String>,
    /// Owner relation: the source this item was synced from. A queryable
    /// foreign key, never an ownership pointer.
    pub owner: SourceId,
    /// Server-assigned revision counter. Volatile; excluded from diff
    /// equality.
    #[serde(default)]
    pub revision: u64,
}

impl CatalogItem {
    pub fn new(owner: SourceId, name: impl Into<String>) -> Self {
        Self {
            item_id: None,
            name: name.into(),
            type_tag: String::new(),
            spec: serde_json::Value::Null,
            annotations: BTreeMap::new(),
            owner,
            revision: 0,
        }
    }

    /// Builder-style setter for the provider-assigned item ID.
    pub fn with_item_id(mut self, id: impl Into<ItemId>) -> Self {
        self.item_id = Some(id.into());
        self
    }

    /// Builder-style setter for the type tag.
    pub fn with_type_tag(mut self, tag: impl Into<String>) -> Self {
        self.type_tag = tag.into();
        self
    }

    /// Builder-style setter for the spec payload.
    pub fn with_spec(mut self, spec: serde_json::Value) -> Self {
        self.spec = spec;
        self
    }

    /// Builder-style setter for a single annotation.
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

/// Desired power state of a managed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
}

/// Lifecycle phase of a managed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourcePhase {
    /// No external counterpart exists yet.
    Absent,
    /// External create has been issued.
    Creating,
    /// External counterpart exists; every pass re-applies an idempotent
    /// update.
    Converging,
    /// Deletion marker observed; external teardown in progress.
    Deleting,
    /// External counterpart confirmed gone. Terminal.
    Deleted,
}

impl Default for ResourcePhase {
    fn default() -> Self {
        ResourcePhase::Absent
    }
}

impl fmt::Display for ResourcePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourcePhase::Absent => "Absent",
            ResourcePhase::Creating => "Creating",
            ResourcePhase::Converging => "Converging",
            ResourcePhase::Deleting => "Deleting",
            ResourcePhase::Deleted => "Deleted",
        };
        write!(f, "{s}")
    }
}

/// A named auxiliary volume a resource wants attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    /// Volume name, unique within the resource.
    pub name: String,
    /// Claim backing the volume.
    pub claim_name: String,
}

/// Desired attachment of one auxiliary resource, diffed against
/// [`AttachmentRecord`]s with the same identity discipline as catalog items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentIntent {
    pub name: String,
    pub claim_name: String,
}

impl From<&VolumeSpec> for AttachmentIntent {
    fn from(volume: &VolumeSpec) -> Self {
        Self {
            name: volume.name.clone(),
            claim_name: volume.claim_name.clone(),
        }
    }
}

/// Observed attachment state of one auxiliary resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub name: String,
    pub claim_name: String,
    /// Whether the provider reports the attachment as established.
    pub attached: bool,
    /// Provider-reported attachment error, if any.
    pub error: Option<String>,
}

impl From<&AttachmentRecord> for AttachmentIntent {
    fn from(record: &AttachmentRecord) -> Self {
        Self {
            name: record.name.clone(),
            claim_name: record.claim_name.clone(),
        }
    }
}

/// Desired state of a managed resource. Immutable input to a reconcile pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Resource class (sizing template) to create from.
    pub class_name: String,
    /// Catalog image to create from.
    pub image_name: String,
    /// Name of the config object holding the metadata payload, if any.
    pub metadata_config_name: Option<String>,
    /// Placement/resource-pool policy name, if any.
    pub policy_name: Option<String>,
    /// Storage class to resolve into a storage policy, if any.
    pub storage_class: Option<String>,
    /// Desired power state.
    pub power_state: PowerState,
    /// Auxiliary volumes to keep attached.
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
}

/// Observed state of a managed resource.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceStatus {
    /// Lifecycle phase.
    #[serde(default)]
    pub phase: ResourcePhase,
    /// Provider-reported power state.
    pub power_state: Option<PowerState>,
    /// Provider-reported network address. Eventually available once the
    /// resource is powered on.
    pub address: Option<String>,
    /// Observed auxiliary attachments.
    #[serde(default)]
    pub attachments: Vec<AttachmentRecord>,
    /// Conditions, at most one per type.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// A managed virtual-machine resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedResource {
    /// Namespaced identity.
    pub key: ResourceKey,
    /// Server-assigned revision; writes fail when it changed since the read.
    #[serde(default)]
    pub revision: u64,
    /// Finalizer markers blocking record removal until external cleanup is
    /// confirmed.
    #[serde(default)]
    pub finalizers: Vec<String>,
    /// Set when deletion has been requested.
    pub deletion_timestamp: Option<DateTime<Utc>>,
    /// Desired state.
    pub spec: ResourceSpec,
    /// Observed state.
    #[serde(default)]
    pub status: ResourceStatus,
}

impl ManagedResource {
    pub fn new(key: ResourceKey, spec: ResourceSpec) -> Self {
        Self {
            key,
            revision: 0,
            finalizers: Vec::new(),
            deletion_timestamp: None,
            spec,
            status: ResourceStatus::default(),
        }
    }

    /// Whether a deletion marker is set.
    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    /// Add a finalizer if not already present.
    pub fn add_finalizer(&mut self, finalizer: &str) {
        if !self.has_finalizer(finalizer) {
            self.finalizers.push(finalizer.to_string());
        }
    }

    pub fn remove_finalizer(&mut self, finalizer: &str) {
        self.finalizers.retain(|f| f != finalizer);
    }

    /// Desired attachments derived from the spec volumes.
    pub fn desired_attachments(&self) -> Vec<AttachmentIntent> {
        self.spec.volumes.iter().map(AttachmentIntent::from).collect()
    }

    /// Attachments currently observed in status.
    pub fn observed_attachments(&self) -> Vec<AttachmentIntent> {
        self.status
            .attachments
            .iter()
            .map(AttachmentIntent::from)
            .collect()
    }
}

/// A sizing template resolved as a create prerequisite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceClass {
    pub name: String,
    pub cpus: u32,
    pub memory_mib: u64,
}

/// A placement/resource-pool policy resolved as a create prerequisite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementPolicy {
    pub name: String,
    pub resource_pool: String,
    pub folder: String,
}

/// All prerequisites resolved before issuing an external create or update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigArgs {
    /// Resolved resource class.
    pub class: ResourceClass,
    /// Metadata payload from the referenced config object.
    pub metadata: BTreeMap<String, String>,
    /// Resolved placement policy, when the spec names one.
    pub policy: Option<PlacementPolicy>,
    /// Storage policy ID resolved from the storage class, when named.
    pub storage_policy_id: Option<String>,
}
