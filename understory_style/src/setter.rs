// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property assignments made by cascades and rules.

use core::fmt;
use std::sync::{Arc, OnceLock};

use understory_property::{ErasedValue, Property, PropertyId, PropertyRegistry, PropertyValue};

use crate::binding::Binding;
use crate::error::{StyleError, StyleResult};
use crate::resources::ResourceKey;

/// The value a [`Setter`] assigns.
#[derive(Clone, Debug, PartialEq)]
pub enum SetterValue {
    /// A concrete value.
    Literal(ErasedValue),
    /// A resource looked up when the setter is applied.
    Resource(ResourceKey),
    /// A data binding evaluated against the styled node.
    Binding(Binding),
    /// A value produced on first read and cached afterwards.
    Deferred(DeferredValue),
}

impl SetterValue {
    /// Returns the literal value, if this is one.
    #[must_use]
    pub fn as_literal(&self) -> Option<&ErasedValue> {
        match self {
            Self::Literal(value) => Some(value),
            _ => None,
        }
    }
}

impl From<ErasedValue> for SetterValue {
    fn from(value: ErasedValue) -> Self {
        Self::Literal(value)
    }
}

impl From<ResourceKey> for SetterValue {
    fn from(key: ResourceKey) -> Self {
        Self::Resource(key)
    }
}

impl From<Binding> for SetterValue {
    fn from(binding: Binding) -> Self {
        Self::Binding(binding)
    }
}

impl From<DeferredValue> for SetterValue {
    fn from(value: DeferredValue) -> Self {
        Self::Deferred(value)
    }
}

/// A lazily produced value shared by every clone.
#[derive(Clone)]
pub struct DeferredValue {
    init: Arc<dyn Fn() -> ErasedValue + Send + Sync>,
    cell: Arc<OnceLock<ErasedValue>>,
}

impl DeferredValue {
    /// Creates a value produced by `init` the first time it is read.
    pub fn new<T, F>(init: F) -> Self
    where
        T: PropertyValue,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            init: Arc::new(move || ErasedValue::new(init())),
            cell: Arc::new(OnceLock::new()),
        }
    }

    /// Produces the value on first call and returns the cached value afterwards.
    pub fn get(&self) -> &ErasedValue {
        self.cell.get_or_init(|| (self.init)())
    }

    /// Returns `true` once the value has been produced.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl PartialEq for DeferredValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl fmt::Debug for DeferredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DeferredValue").field(&self.cell.get()).finish()
    }
}

/// A validated property assignment, optionally aimed at a named template child.
///
/// Validation happens at construction: the property must be registered,
/// writable and not an identity property, and literal values must satisfy
/// the property's type and validator.
///
/// # Example
///
/// ```rust
/// use understory_property::{PropertyMetadataBuilder, PropertyRegistry};
/// use understory_style::{ResourceKey, Setter};
///
/// let mut registry = PropertyRegistry::new();
/// let width = registry.register(
///     "Width",
///     PropertyMetadataBuilder::new(0.0_f64).validate(|w| *w >= 0.0).build(),
/// );
///
/// let literal = Setter::literal(&registry, width, 10.0).unwrap();
/// assert_eq!(literal.property(), width.into());
/// assert!(Setter::literal(&registry, width, -1.0).is_err());
///
/// // Resources are checked when applied.
/// let themed = Setter::new(&registry, width, ResourceKey::new(3)).unwrap();
/// assert!(themed.target_name().is_none());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Setter {
    property: PropertyId,
    value: SetterValue,
    target_name: Option<Arc<str>>,
}

impl Setter {
    /// Creates a setter after validating it against `registry`.
    pub fn new(
        registry: &PropertyRegistry,
        property: impl Into<PropertyId>,
        value: impl Into<SetterValue>,
    ) -> StyleResult<Self> {
        let setter = Self {
            property: property.into(),
            value: value.into(),
            target_name: None,
        };
        setter.validate(registry)?;
        Ok(setter)
    }

    /// Creates a setter assigning a typed literal.
    pub fn literal<T: PropertyValue>(
        registry: &PropertyRegistry,
        property: Property<T>,
        value: T,
    ) -> StyleResult<Self> {
        Self::new(registry, property, ErasedValue::new(value))
    }

    /// Aims the setter at the template child called `name`.
    #[must_use]
    pub fn with_target_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.target_name = Some(name.into());
        self
    }

    /// Returns the assigned property.
    #[must_use]
    #[inline]
    pub fn property(&self) -> PropertyId {
        self.property
    }

    /// Returns the assigned value.
    #[must_use]
    #[inline]
    pub fn value(&self) -> &SetterValue {
        &self.value
    }

    /// Returns the template child this setter targets, if any.
    #[must_use]
    pub fn target_name(&self) -> Option<&str> {
        self.target_name.as_deref()
    }

    pub(crate) fn references_resource(&self, key: ResourceKey) -> bool {
        matches!(self.value, SetterValue::Resource(k) if k == key)
    }

    pub(crate) fn validate(&self, registry: &PropertyRegistry) -> StyleResult<()> {
        let property = self.property;
        let registration = registry
            .get(property)
            .ok_or(StyleError::UnknownProperty(property))?;
        if registration.read_only() {
            return Err(StyleError::ReadOnlyProperty { property });
        }
        if registration.role().is_reserved() {
            return Err(StyleError::ReservedProperty { property });
        }
        if let SetterValue::Literal(value) = &self.value
            && !registration.is_valid_value(value)
        {
            return Err(StyleError::InvalidValue {
                property,
                type_name: value.type_name(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use understory_property::{PropertyMetadataBuilder, PropertyRole};

    use super::*;

    #[test]
    fn rejects_unassignable_properties() {
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
        assert_eq!(
            Setter::literal(&registry, actual, 1.0),
            Err(StyleError::ReadOnlyProperty {
                property: actual.id()
            })
        );
        assert_eq!(
            Setter::literal(&registry, name, "x".to_string()),
            Err(StyleError::ReservedProperty { property: name.id() })
        );
        assert_eq!(
            Setter::new(&registry, PropertyId::new(40), ErasedValue::new(1_u8)),
            Err(StyleError::UnknownProperty(PropertyId::new(40)))
        );
    }

    #[test]
    fn literal_type_is_checked() {
        let mut registry = PropertyRegistry::new();
        let width = registry.register("Width", PropertyMetadataBuilder::new(0.0_f64).build());
        let err = Setter::new(&registry, width, ErasedValue::new("wide")).unwrap_err();
        assert!(matches!(err, StyleError::InvalidValue { .. }));
    }

    #[test]
    fn deferred_value_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let deferred = DeferredValue::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
            5_u32
        });
        let copy = deferred.clone();
        assert!(!copy.is_resolved());
        assert_eq!(deferred.get().downcast_ref::<u32>(), Some(&5));
        assert_eq!(copy.get().downcast_ref::<u32>(), Some(&5));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(deferred, copy);
    }
}
