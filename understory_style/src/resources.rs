// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Resource dictionaries and resource lookup.
//!
//! Setters may reference a resource by [`ResourceKey`] instead of carrying a
//! literal. The reference is resolved when the setter is applied: first
//! against the dictionaries attached to the cascade (most derived first),
//! then against the host's [`ResourceLookup`].

use core::fmt;
use std::sync::Arc;

use understory_property::{ErasedValue, PropertyValue};
use understory_scene::{NodeId, SceneTree};

use crate::error::StyleResult;
use crate::seal::SealCell;

/// A key for looking up resources in a [`ResourceDictionary`].
///
/// Resource keys are simple u16 identifiers, typically defined as constants
/// at the application level.
///
/// # Example
///
/// ```rust
/// use understory_style::ResourceKey;
///
/// const ACCENT_COLOR: ResourceKey = ResourceKey::new(0);
/// const FONT_SIZE: ResourceKey = ResourceKey::new(1);
/// assert_eq!(FONT_SIZE.index(), 1);
/// ```
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey(u16);

impl ResourceKey {
    /// Creates a new resource key with the given index.
    #[must_use]
    #[inline]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Returns the underlying index of this resource key.
    #[must_use]
    #[inline]
    pub const fn index(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResourceKey").field(&self.0).finish()
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceKey({})", self.0)
    }
}

type Entries = Vec<(ResourceKey, ErasedValue)>;

/// A shared table of resources, writable until frozen.
///
/// Cloning is cheap and clones share storage. Sealing a cascade freezes the
/// dictionary attached to it.
///
/// # Example
///
/// ```rust
/// use understory_style::{ResourceDictionary, ResourceKey};
///
/// const ACCENT: ResourceKey = ResourceKey::new(0);
///
/// let resources = ResourceDictionary::new();
/// resources.insert(ACCENT, 0x0078D4_u32).unwrap();
/// assert_eq!(resources.get::<u32>(ACCENT), Some(0x0078D4));
///
/// resources.freeze();
/// assert!(resources.insert(ACCENT, 0_u32).is_err());
/// ```
#[derive(Clone, Debug)]
pub struct ResourceDictionary {
    inner: Arc<SealCell<Entries, Box<[(ResourceKey, ErasedValue)]>>>,
}

impl ResourceDictionary {
    /// Creates an empty, writable dictionary.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SealCell::new("resource dictionary", Vec::new())),
        }
    }

    /// Inserts or replaces a resource.
    pub fn insert<T: PropertyValue>(&self, key: ResourceKey, value: T) -> StyleResult<()> {
        self.insert_erased(key, ErasedValue::new(value))
    }

    /// Inserts or replaces an already erased resource.
    pub fn insert_erased(&self, key: ResourceKey, value: ErasedValue) -> StyleResult<()> {
        self.inner.edit(|entries| {
            match entries.binary_search_by_key(&key, |(k, _)| *k) {
                Ok(idx) => entries[idx].1 = value,
                Err(idx) => entries.insert(idx, (key, value)),
            }
            Ok(())
        })
    }

    /// Returns the resource stored under `key`.
    #[must_use]
    pub fn get_erased(&self, key: ResourceKey) -> Option<ErasedValue> {
        match self.inner.sealed() {
            Some(frozen) => find(frozen, key),
            None => self.inner.read(|entries| find(entries, key)),
        }
    }

    /// Returns a typed copy of the resource stored under `key`.
    #[must_use]
    pub fn get<T: PropertyValue>(&self, key: ResourceKey) -> Option<T> {
        self.get_erased(key)
            .and_then(|value| value.downcast_ref::<T>().cloned())
    }

    /// Returns `true` if the dictionary has a value for `key`.
    #[must_use]
    pub fn contains(&self, key: ResourceKey) -> bool {
        self.get_erased(key).is_some()
    }

    /// Returns the number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        match self.inner.sealed() {
            Some(frozen) => frozen.len(),
            None => self.inner.read(Vec::len),
        }
    }

    /// Returns `true` if the dictionary holds no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Makes the dictionary read-only. Freezing twice is a no-op.
    pub fn freeze(&self) {
        // Freezing cannot fail.
        let _ = self.inner.seal_with(|entries| Ok(entries.clone().into_boxed_slice()));
    }

    /// Returns `true` once the dictionary has been frozen.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.inner.is_sealed()
    }
}

impl Default for ResourceDictionary {
    fn default() -> Self {
        Self::new()
    }
}

fn find(entries: &[(ResourceKey, ErasedValue)], key: ResourceKey) -> Option<ErasedValue> {
    entries
        .binary_search_by_key(&key, |(k, _)| *k)
        .ok()
        .map(|idx| entries[idx].1.clone())
}

/// Host-provided resource resolution, consulted after a cascade's own dictionaries.
///
/// Implemented for closures taking `(tree, node, key)`.
pub trait ResourceLookup {
    /// Finds the resource `key` as seen from `node`.
    fn find_resource(&self, tree: &SceneTree, node: NodeId, key: ResourceKey) -> Option<ErasedValue>;
}

impl<F> ResourceLookup for F
where
    F: Fn(&SceneTree, NodeId, ResourceKey) -> Option<ErasedValue>,
{
    fn find_resource(&self, tree: &SceneTree, node: NodeId, key: ResourceKey) -> Option<ErasedValue> {
        self(tree, node, key)
    }
}

impl ResourceLookup for ResourceDictionary {
    fn find_resource(&self, _: &SceneTree, _: NodeId, key: ResourceKey) -> Option<ErasedValue> {
        self.get_erased(key)
    }
}

/// A lookup that never finds anything.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoResources;

impl ResourceLookup for NoResources {
    fn find_resource(&self, _: &SceneTree, _: NodeId, _: ResourceKey) -> Option<ErasedValue> {
        None
    }
}

/// Dictionaries searched in order, then a fallback lookup.
pub(crate) struct ResourceChain<'a> {
    pub(crate) dictionaries: &'a [ResourceDictionary],
    pub(crate) fallback: &'a dyn ResourceLookup,
}

impl ResourceLookup for ResourceChain<'_> {
    fn find_resource(&self, tree: &SceneTree, node: NodeId, key: ResourceKey) -> Option<ErasedValue> {
        self.dictionaries
            .iter()
            .find_map(|dictionary| dictionary.get_erased(key))
            .or_else(|| self.fallback.find_resource(tree, node, key))
    }
}

#[cfg(test)]
mod tests {
    use understory_property::PropertyRegistry;
    use understory_scene::{NodeKind, NodeType};

    use super::*;

    const ACCENT: ResourceKey = ResourceKey::new(0);
    const MARGIN: ResourceKey = ResourceKey::new(1);

    #[test]
    fn insert_replaces_and_keeps_order() {
        let resources = ResourceDictionary::new();
        resources.insert(MARGIN, 4.0_f64).unwrap();
        resources.insert(ACCENT, 1_u32).unwrap();
        resources.insert(ACCENT, 2_u32).unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources.get::<u32>(ACCENT), Some(2));
        assert_eq!(resources.get::<f64>(ACCENT), None);
    }

    #[test]
    fn clones_share_storage_and_freeze() {
        let resources = ResourceDictionary::new();
        let alias = resources.clone();
        alias.insert(ACCENT, 7_u32).unwrap();
        assert!(resources.contains(ACCENT));
        resources.freeze();
        assert!(alias.is_frozen());
        assert!(alias.insert(MARGIN, 1.0_f64).is_err());
        assert_eq!(alias.get::<u32>(ACCENT), Some(7));
    }

    #[test]
    fn chain_prefers_dictionaries_over_fallback() {
        let mut tree = SceneTree::new(Arc::new(PropertyRegistry::new()));
        let node = tree.create_node(&NodeType::builder("Leaf", NodeKind::Visual).build());
        let own = ResourceDictionary::new();
        own.insert(ACCENT, 1_u32).unwrap();
        let host = |_: &SceneTree, _: NodeId, key: ResourceKey| {
            (key == MARGIN).then(|| ErasedValue::new(9.0_f64))
        };
        let chain = ResourceChain {
            dictionaries: &[own],
            fallback: &host,
        };
        let accent = chain.find_resource(&tree, node, ACCENT).unwrap();
        assert_eq!(accent.downcast_ref::<u32>(), Some(&1));
        let margin = chain.find_resource(&tree, node, MARGIN).unwrap();
        assert_eq!(margin.downcast_ref::<f64>(), Some(&9.0));
        assert!(chain.find_resource(&tree, node, ResourceKey::new(5)).is_none());
    }
}
