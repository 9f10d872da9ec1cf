// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-object sparse, layered property storage.
//!
//! [`PropertyStore`] keeps one value per `(property, layer)` pair in a sorted
//! `SmallVec`, so most nodes never touch the heap for their property values.
//!
//! # Layers
//!
//! Values are written by different producers and resolved in a fixed order,
//! highest first:
//!
//! | Layer | Written by |
//! |-------|------------|
//! | [`ValueLayer::Local`] | the application |
//! | [`ValueLayer::Trigger`] | active conditional rules of the node's style |
//! | [`ValueLayer::TemplateTrigger`] | active conditional rules of the templated parent's template |
//! | [`ValueLayer::Style`] | the node's (merged, based-on) style cascade |
//! | [`ValueLayer::Template`] | the template factory that created the node |
//!
//! Below all layers sits the registry default.

use smallvec::SmallVec;

use crate::id::{Property, PropertyId, PropertyValue};
use crate::registry::PropertyRegistry;
use crate::value::ErasedValue;

/// Default inline capacity for property entries.
const INLINE_CAPACITY: usize = 8;

/// A value source within a [`PropertyStore`], ordered by precedence.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueLayer {
    /// Values assigned by a template factory when the node was built.
    Template = 0,
    /// Values from the node's style cascade.
    Style = 1,
    /// Values from active template rules.
    TemplateTrigger = 2,
    /// Values from active style rules.
    Trigger = 3,
    /// Values set directly on the node.
    Local = 4,
}

impl ValueLayer {
    /// All layers from highest to lowest precedence.
    pub const BY_PRECEDENCE: [Self; 5] = [
        Self::Local,
        Self::Trigger,
        Self::TemplateTrigger,
        Self::Style,
        Self::Template,
    ];
}

/// Per-object sparse storage for layered property values.
///
/// # Example
///
/// ```rust
/// use understory_property::{PropertyMetadataBuilder, PropertyRegistry, PropertyStore, ValueLayer};
///
/// let mut registry = PropertyRegistry::new();
/// let width = registry.register("Width", PropertyMetadataBuilder::new(0.0_f64).build());
///
/// let mut store = PropertyStore::<u32>::new(1);
/// assert_eq!(store.get_effective(width, &registry), 0.0);
///
/// store.set(width, ValueLayer::Style, 50.0);
/// assert_eq!(store.get_effective(width, &registry), 50.0);
///
/// // Local values win over style values.
/// store.set(width, ValueLayer::Local, 100.0);
/// assert_eq!(store.get_effective(width, &registry), 100.0);
/// assert_eq!(store.effective_layer(width.id()), Some(ValueLayer::Local));
/// ```
#[derive(Clone, Debug)]
pub struct PropertyStore<K> {
    /// Sorted by `(PropertyId, ValueLayer)` for binary search lookup.
    entries: SmallVec<[(PropertyId, ValueLayer, ErasedValue); INLINE_CAPACITY]>,
    owner: K,
}

impl<K: Copy + Eq> PropertyStore<K> {
    /// Creates a new property store for the given owner key.
    #[must_use]
    pub fn new(owner: K) -> Self {
        Self {
            entries: SmallVec::new(),
            owner,
        }
    }

    /// Returns the owner key of this store.
    #[must_use]
    #[inline]
    pub fn owner(&self) -> K {
        self.owner
    }

    /// Returns `true` if no values are stored in any layer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of stored `(property, layer)` values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns the distinct property IDs that have a value in any layer.
    pub fn property_ids(&self) -> impl Iterator<Item = PropertyId> + '_ {
        let mut last = None;
        self.entries.iter().filter_map(move |(id, _, _)| {
            if last == Some(*id) {
                None
            } else {
                last = Some(*id);
                Some(*id)
            }
        })
    }

    #[inline]
    fn find(&self, id: PropertyId, layer: ValueLayer) -> Result<usize, usize> {
        self.entries
            .binary_search_by_key(&(id, layer), |(pid, l, _)| (*pid, *l))
    }

    /// Gets the erased value stored in one layer.
    #[must_use]
    pub fn get_erased(&self, id: PropertyId, layer: ValueLayer) -> Option<&ErasedValue> {
        self.find(id, layer).ok().map(|idx| &self.entries[idx].2)
    }

    /// Stores an erased value in one layer, returning the previous value.
    ///
    /// The value is not type-checked; callers go through the registry first.
    pub fn set_erased(
        &mut self,
        id: PropertyId,
        layer: ValueLayer,
        value: ErasedValue,
    ) -> Option<ErasedValue> {
        match self.find(id, layer) {
            Ok(idx) => Some(core::mem::replace(&mut self.entries[idx].2, value)),
            Err(idx) => {
                self.entries.insert(idx, (id, layer, value));
                None
            }
        }
    }

    /// Removes the value stored in one layer.
    pub fn clear(&mut self, id: PropertyId, layer: ValueLayer) -> Option<ErasedValue> {
        self.find(id, layer)
            .ok()
            .map(|idx| self.entries.remove(idx).2)
    }

    /// Removes every value of one layer, returning the affected properties.
    pub fn clear_layer(&mut self, layer: ValueLayer) -> SmallVec<[PropertyId; 4]> {
        let mut removed = SmallVec::new();
        self.entries.retain(|(id, l, _)| {
            if *l == layer {
                removed.push(*id);
                false
            } else {
                true
            }
        });
        removed
    }

    /// Returns the highest-precedence stored value and its layer.
    #[must_use]
    pub fn effective_erased(&self, id: PropertyId) -> Option<(&ErasedValue, ValueLayer)> {
        // Entries for one property are contiguous and sorted by ascending layer,
        // so the last one in the run is the winner.
        let end = self
            .entries
            .partition_point(|(pid, _, _)| *pid <= id);
        let (pid, layer, value) = self.entries[..end].last()?;
        (*pid == id).then_some((value, *layer))
    }

    /// Returns the layer that currently supplies the effective value.
    #[must_use]
    pub fn effective_layer(&self, id: PropertyId) -> Option<ValueLayer> {
        self.effective_erased(id).map(|(_, layer)| layer)
    }

    /// Gets a typed value from one layer.
    #[must_use]
    pub fn get<T: PropertyValue>(&self, property: Property<T>, layer: ValueLayer) -> Option<&T> {
        self.get_erased(property.id(), layer)
            .and_then(ErasedValue::downcast_ref)
    }

    /// Stores a typed value in one layer.
    pub fn set<T: PropertyValue>(&mut self, property: Property<T>, layer: ValueLayer, value: T) {
        self.set_erased(property.id(), layer, ErasedValue::new(value));
    }

    /// Resolves the effective typed value, falling back to the registry default.
    ///
    /// # Panics
    ///
    /// Panics if the property is not registered with type `T`.
    #[must_use]
    pub fn get_effective<T: PropertyValue>(
        &self,
        property: Property<T>,
        registry: &PropertyRegistry,
    ) -> T {
        if let Some((value, _)) = self.effective_erased(property.id())
            && let Some(value) = value.downcast_ref::<T>()
        {
            return value.clone();
        }
        match registry.get_metadata(property) {
            Some(metadata) => metadata.default_value().clone(),
            None => panic!("Property {:?} not found in registry", property.id()),
        }
    }

    /// Returns `true` if the property has a value in any layer.
    #[must_use]
    pub fn has_value(&self, id: PropertyId) -> bool {
        self.effective_erased(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::PropertyMetadataBuilder;
    use alloc::boxed::Box;
    use alloc::vec::Vec;

    fn setup_registry() -> (PropertyRegistry, Property<f64>, Property<i32>) {
        let mut registry = PropertyRegistry::new();
        let width = registry.register("Width", PropertyMetadataBuilder::new(0.0_f64).build());
        let count = registry.register("Count", PropertyMetadataBuilder::new(0_i32).build());
        (registry, width, count)
    }

    #[test]
    fn layers_resolve_by_precedence() {
        let (registry, width, _) = setup_registry();
        let mut store = PropertyStore::<u32>::new(1);

        store.set(width, ValueLayer::Template, 1.0);
        assert_eq!(store.get_effective(width, &registry), 1.0);
        store.set(width, ValueLayer::Trigger, 3.0);
        store.set(width, ValueLayer::Style, 2.0);
        assert_eq!(store.get_effective(width, &registry), 3.0);
        assert_eq!(store.effective_layer(width.id()), Some(ValueLayer::Trigger));

        store.set(width, ValueLayer::Local, 4.0);
        assert_eq!(store.get_effective(width, &registry), 4.0);

        store.clear(width.id(), ValueLayer::Local);
        store.clear(width.id(), ValueLayer::Trigger);
        assert_eq!(store.get_effective(width, &registry), 2.0);
    }

    #[test]
    fn effective_ignores_neighbouring_properties() {
        let (registry, width, count) = setup_registry();
        let mut store = PropertyStore::<u32>::new(1);

        store.set(count, ValueLayer::Local, 7);
        assert_eq!(store.effective_erased(width.id()), None);
        assert_eq!(store.get_effective(width, &registry), 0.0);
        assert_eq!(store.get_effective(count, &registry), 7);
    }

    #[test]
    fn clear_layer_reports_properties() {
        let (_, width, count) = setup_registry();
        let mut store = PropertyStore::<u32>::new(1);

        store.set(width, ValueLayer::Style, 10.0);
        store.set(count, ValueLayer::Style, 2);
        store.set(count, ValueLayer::Local, 3);

        let removed = store.clear_layer(ValueLayer::Style);
        assert_eq!(removed.as_slice(), &[width.id(), count.id()]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(count, ValueLayer::Local), Some(&3));
    }

    #[test]
    fn set_erased_returns_previous() {
        let (_, width, _) = setup_registry();
        let mut store = PropertyStore::<u32>::new(1);

        assert!(store
            .set_erased(width.id(), ValueLayer::Local, ErasedValue::new(1.0_f64))
            .is_none());
        let previous = store.set_erased(width.id(), ValueLayer::Local, ErasedValue::new(2.0_f64));
        assert_eq!(previous, Some(ErasedValue::new(1.0_f64)));
    }

    #[test]
    fn property_ids_are_distinct_and_sorted() {
        let mut registry = PropertyRegistry::new();
        let props: Vec<Property<i32>> = (0..12)
            .map(|i| {
                registry.register(
                    Box::leak(alloc::format!("Prop{i}").into_boxed_str()),
                    PropertyMetadataBuilder::new(0).build(),
                )
            })
            .collect();

        let mut store = PropertyStore::<u32>::new(1);
        for prop in props.iter().rev() {
            store.set(*prop, ValueLayer::Local, 1);
            store.set(*prop, ValueLayer::Style, 2);
        }

        let ids: Vec<_> = store.property_ids().collect();
        assert_eq!(ids.len(), 12);
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }
}
