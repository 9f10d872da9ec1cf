// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Global property registry.
//!
//! This module provides [`PropertyRegistry`] for registering properties and
//! answering the questions the styling engine asks about them: is it
//! read-only, is it reserved, is this value acceptable, what is the default.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::any::{Any, TypeId};
use hashbrown::HashMap;

use crate::id::{Property, PropertyId, PropertyValue};
use crate::metadata::{PropertyMetadata, PropertyRole};
use crate::value::ErasedValue;

/// A registration entry for a property.
pub struct PropertyRegistration {
    name: &'static str,
    type_id: TypeId,
    metadata: Box<dyn ErasedMetadata>,
}

impl PropertyRegistration {
    /// Returns the property name.
    #[must_use]
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the [`TypeId`] of the property's value type.
    #[must_use]
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns whether the property is read-only.
    #[must_use]
    #[inline]
    pub fn read_only(&self) -> bool {
        self.metadata.read_only()
    }

    /// Returns the structural role of the property.
    #[must_use]
    #[inline]
    pub fn role(&self) -> PropertyRole {
        self.metadata.role()
    }

    /// Returns the default value, erased.
    #[must_use]
    pub fn default_value(&self) -> ErasedValue {
        self.metadata.default_erased()
    }

    /// Checks an erased value against the property's type and validator.
    #[must_use]
    pub fn is_valid_value(&self, value: &ErasedValue) -> bool {
        value.type_id() == self.type_id && self.metadata.validate_erased(value)
    }
}

impl core::fmt::Debug for PropertyRegistration {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PropertyRegistration")
            .field("name", &self.name)
            .field("read_only", &self.read_only())
            .field("role", &self.role())
            .finish_non_exhaustive()
    }
}

/// A registry for dependency properties.
///
/// Properties are registered once at startup; the registry is then usually
/// shared (behind an `Arc`) by every tree and cascade that refers to it.
///
/// # Example
///
/// ```rust
/// use understory_property::{ErasedValue, PropertyMetadataBuilder, PropertyRegistry, PropertyRole};
///
/// let mut registry = PropertyRegistry::new();
/// let name = registry.register(
///     "Name",
///     PropertyMetadataBuilder::new(String::new()).role(PropertyRole::Identity).build(),
/// );
/// let width = registry.register(
///     "Width",
///     PropertyMetadataBuilder::new(0.0_f64).validate(|w| *w >= 0.0).build(),
/// );
///
/// assert_eq!(registry.role(name.id()), Some(PropertyRole::Identity));
/// assert!(registry.is_valid_value(width.id(), &ErasedValue::new(10.0_f64)));
/// assert!(!registry.is_valid_value(width.id(), &ErasedValue::new(-1.0_f64)));
/// assert!(!registry.is_valid_value(width.id(), &ErasedValue::new(10_i32)));
/// ```
#[derive(Default)]
pub struct PropertyRegistry {
    properties: Vec<PropertyRegistration>,
    by_name: HashMap<&'static str, PropertyId>,
}

impl PropertyRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new property with the given name and metadata.
    ///
    /// # Panics
    ///
    /// Panics if a property with the same name is already registered,
    /// or if more than 65,535 properties are registered.
    pub fn register<T: PropertyValue>(
        &mut self,
        name: &'static str,
        metadata: PropertyMetadata<T>,
    ) -> Property<T> {
        assert!(
            !self.by_name.contains_key(name),
            "Property '{name}' is already registered"
        );
        assert!(
            self.properties.len() < u16::MAX as usize,
            "Too many properties registered (max {})",
            u16::MAX
        );

        #[expect(clippy::cast_possible_truncation, reason = "checked above")]
        let id = PropertyId::new(self.properties.len() as u16);

        self.properties.push(PropertyRegistration {
            name,
            type_id: TypeId::of::<T>(),
            metadata: Box::new(metadata),
        });
        self.by_name.insert(name, id);

        Property::from_id(id)
    }

    /// Returns the number of registered properties.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Returns `true` if no properties are registered.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Looks up a property by name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<PropertyId> {
        self.by_name.get(name).copied()
    }

    /// Returns the name of a property.
    #[must_use]
    pub fn name(&self, id: PropertyId) -> Option<&'static str> {
        self.get(id).map(PropertyRegistration::name)
    }

    /// Returns the registration for a property.
    #[must_use]
    pub fn get(&self, id: PropertyId) -> Option<&PropertyRegistration> {
        self.properties.get(id.index() as usize)
    }

    /// Returns whether a property is read-only.
    ///
    /// Unknown properties report `false`; callers validate existence separately.
    #[must_use]
    pub fn is_read_only(&self, id: PropertyId) -> bool {
        self.get(id).is_some_and(PropertyRegistration::read_only)
    }

    /// Returns the role of a property, or `None` if it is not registered.
    #[must_use]
    pub fn role(&self, id: PropertyId) -> Option<PropertyRole> {
        self.get(id).map(PropertyRegistration::role)
    }

    /// Checks an erased value for type and validator compatibility.
    ///
    /// Returns `false` for unknown properties.
    #[must_use]
    pub fn is_valid_value(&self, id: PropertyId, value: &ErasedValue) -> bool {
        self.get(id).is_some_and(|r| r.is_valid_value(value))
    }

    /// Returns the erased default value of a property.
    #[must_use]
    pub fn default_value(&self, id: PropertyId) -> Option<ErasedValue> {
        self.get(id).map(PropertyRegistration::default_value)
    }

    /// Returns the metadata for a typed property.
    ///
    /// Returns `None` if the property is not registered or the type doesn't match.
    #[must_use]
    pub fn get_metadata<T: PropertyValue>(
        &self,
        property: Property<T>,
    ) -> Option<&PropertyMetadata<T>> {
        self.get(property.id())
            .and_then(|r| r.metadata.as_any().downcast_ref())
    }

    /// Returns an iterator over all registered properties.
    pub fn iter(&self) -> impl Iterator<Item = (PropertyId, &PropertyRegistration)> {
        self.properties.iter().enumerate().map(|(i, r)| {
            #[expect(clippy::cast_possible_truncation, reason = "index < len < u16::MAX")]
            (PropertyId::new(i as u16), r)
        })
    }
}

impl core::fmt::Debug for PropertyRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PropertyRegistry")
            .field("count", &self.properties.len())
            .field("properties", &self.by_name.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Type-erased metadata trait for heterogeneous storage.
trait ErasedMetadata: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn read_only(&self) -> bool;
    fn role(&self) -> PropertyRole;
    fn default_erased(&self) -> ErasedValue;
    fn validate_erased(&self, value: &ErasedValue) -> bool;
}

impl<T: PropertyValue> ErasedMetadata for PropertyMetadata<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn read_only(&self) -> bool {
        Self::read_only(self)
    }

    fn role(&self) -> PropertyRole {
        Self::role(self)
    }

    fn default_erased(&self) -> ErasedValue {
        ErasedValue::new(self.default_value().clone())
    }

    fn validate_erased(&self, value: &ErasedValue) -> bool {
        value.downcast_ref::<T>().is_some_and(|v| self.is_valid(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::PropertyMetadataBuilder;
    use alloc::string::String;
    use alloc::{format, vec};

    #[test]
    fn register_and_lookup() {
        let mut registry = PropertyRegistry::new();
        assert!(registry.is_empty());

        let width = registry.register("Width", PropertyMetadataBuilder::new(0.0_f64).build());

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.by_name("Width"), Some(width.id()));
        assert_eq!(registry.by_name("Height"), None);
        assert_eq!(registry.name(width.id()), Some("Width"));
        assert_eq!(registry.name(PropertyId::new(999)), None);
    }

    #[test]
    fn read_only_and_roles() {
        let mut registry = PropertyRegistry::new();
        let actual = registry.register(
            "ActualWidth",
            PropertyMetadataBuilder::new(0.0_f64).read_only(true).build(),
        );
        let name = registry.register(
            "Name",
            PropertyMetadataBuilder::new(String::new())
                .role(PropertyRole::Identity)
                .build(),
        );

        assert!(registry.is_read_only(actual.id()));
        assert!(!registry.is_read_only(name.id()));
        assert_eq!(registry.role(name.id()), Some(PropertyRole::Identity));
        assert_eq!(registry.role(PropertyId::new(40)), None);
    }

    #[test]
    fn erased_validation_checks_type_then_callback() {
        let mut registry = PropertyRegistry::new();
        let opacity = registry.register(
            "Opacity",
            PropertyMetadataBuilder::new(1.0_f64)
                .validate(|v| (0.0..=1.0).contains(v))
                .build(),
        );

        assert!(registry.is_valid_value(opacity.id(), &ErasedValue::new(0.5_f64)));
        assert!(!registry.is_valid_value(opacity.id(), &ErasedValue::new(2.0_f64)));
        assert!(!registry.is_valid_value(opacity.id(), &ErasedValue::new(String::from("x"))));
        assert!(!registry.is_valid_value(PropertyId::new(9), &ErasedValue::new(0.5_f64)));
    }

    #[test]
    fn erased_default_matches_metadata() {
        let mut registry = PropertyRegistry::new();
        let text = registry.register(
            "Text",
            PropertyMetadataBuilder::new(String::from("none")).build(),
        );
        assert_eq!(
            registry.default_value(text.id()),
            Some(ErasedValue::new(String::from("none")))
        );
        assert_eq!(
            registry.get_metadata(text).map(|m| m.default_value().as_str()),
            Some("none")
        );
    }

    #[test]
    fn iter_in_registration_order() {
        let mut registry = PropertyRegistry::new();
        registry.register("Width", PropertyMetadataBuilder::new(0.0_f64).build());
        registry.register("Height", PropertyMetadataBuilder::new(0.0_f64).build());

        let names: Vec<_> = registry.iter().map(|(_, r)| r.name()).collect();
        assert_eq!(names, vec!["Width", "Height"]);
        assert!(format!("{:?}", registry).contains("Width"));
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_name_panics() {
        let mut registry = PropertyRegistry::new();
        registry.register("Width", PropertyMetadataBuilder::new(0.0_f64).build());
        registry.register("Width", PropertyMetadataBuilder::new(0.0_f64).build());
    }
}
