//! Pure diff engine.
//!
//! Computes added/removed/updated sets between two keyed collections in
//! O(n+m) via a map keyed by identity. No side effects, no external calls.
//!
//! Identity is the stable provider ID, falling back to the display name when
//! the provider did not assign one. The two key forms never compare equal,
//! so an empty ID cannot collide with a name. The fallback itself is
//! ambiguous by design: two genuinely distinct items with empty IDs and the
//! same name collapse to one key. That case is logged, not resolved.

use std::collections::{HashMap, HashSet};
use tracing::warn;

use virtop_core::ItemId;
use virtop_provider::{AttachmentIntent, CatalogItem};

/// Identity key used to pair items across the two sides of a diff.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DiffKey {
    /// Stable provider-assigned ID.
    Id(ItemId),
    /// Display-name fallback for items without an ID.
    Name(String),
}

/// An item the diff engine can key and compare.
pub trait DiffItem {
    /// Identity key; stable across both sides of the diff.
    fn diff_key(&self) -> DiffKey;

    /// Structural deep-equality over everything that matters for an update,
    /// excluding volatile server-assigned fields.
    fn content_eq(&self, other: &Self) -> bool;
}

impl DiffItem for CatalogItem {
    fn diff_key(&self) -> DiffKey {
        match &self.item_id {
            Some(id) if !id.is_empty() => DiffKey::Id(id.clone()),
            _ => DiffKey::Name(self.name.clone()),
        }
    }

    fn content_eq(&self, other: &Self) -> bool {
        self.type_tag == other.type_tag
            && self.spec == other.spec
            && self.annotations == other.annotations
            && self.owner == other.owner
    }
}

impl DiffItem for AttachmentIntent {
    fn diff_key(&self) -> DiffKey {
        DiffKey::Name(self.name.clone())
    }

    fn content_eq(&self, other: &Self) -> bool {
        self.claim_name == other.claim_name
    }
}

/// Outcome of a diff: the delta that converges left into right.
#[derive(Debug, Clone)]
pub struct DiffResult<T> {
    /// Present on the right only.
    pub added: Vec<T>,
    /// Present on the left only.
    pub removed: Vec<T>,
    /// Present on both sides with differing content; carries the right-side
    /// (authoritative) version.
    pub updated: Vec<T>,
}

impl<T> DiffResult<T> {
    /// True when the two sides already converge.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

/// Diff two keyed collections.
///
/// Duplicate keys within one side are resolved stably: the first occurrence
/// wins and later ones are dropped with a warning. Added and removed are
/// disjoint; every left item ends up either kept or removed, every right
/// item either kept or added.
pub fn diff<T: DiffItem + Clone>(left: &[T], right: &[T]) -> DiffResult<T> {
    let mut left_by_key: HashMap<DiffKey, &T> = HashMap::with_capacity(left.len());
    let mut left_order: Vec<DiffKey> = Vec::with_capacity(left.len());
    for item in left {
        let key = item.diff_key();
        if left_by_key.contains_key(&key) {
            warn!(?key, "Duplicate identity key on left side, keeping first occurrence");
            continue;
        }
        left_order.push(key.clone());
        left_by_key.insert(key, item);
    }

    let mut added = Vec::new();
    let mut updated = Vec::new();
    let mut seen: HashSet<DiffKey> = HashSet::with_capacity(right.len());
    for item in right {
        let key = item.diff_key();
        if !seen.insert(key.clone()) {
            warn!(?key, "Duplicate identity key on right side, keeping first occurrence");
            continue;
        }
        match left_by_key.get(&key) {
            Some(existing) => {
                if !existing.content_eq(item) {
                    updated.push(item.clone());
                }
            }
            None => added.push(item.clone()),
        }
    }

    let removed = left_order
        .into_iter()
        .filter(|key| !seen.contains(key))
        .filter_map(|key| left_by_key.get(&key).map(|item| (*item).clone()))
        .collect();

    DiffResult {
        added,
        removed,
        updated,
    }
}
