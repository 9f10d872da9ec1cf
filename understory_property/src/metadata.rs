// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property metadata definitions.
//!
//! This module provides [`PropertyMetadata`] for storing property configuration
//! and [`PropertyMetadataBuilder`] for ergonomic construction.

use alloc::boxed::Box;

use crate::id::PropertyValue;

/// Callback deciding whether a proposed value is acceptable for a property.
pub type ValidateValueCallback<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// Callback for coercing a property value before it's stored.
///
/// This can be used to clamp values to a range.
pub type CoerceValueCallback<T> = Box<dyn Fn(T) -> T + Send + Sync>;

/// The structural role a property plays for the styling engine.
///
/// Most properties are [`Ordinary`](Self::Ordinary). The other roles mark the
/// handful of properties rule authors are not allowed to assign.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum PropertyRole {
    /// A regular, styleable property.
    #[default]
    Ordinary,
    /// The node's name/identity. Never assignable from rules.
    Identity,
    /// The property holding a node's style cascade.
    StyleReference,
    /// The property holding a node's template.
    TemplateReference,
}

impl PropertyRole {
    /// Returns `true` for roles that rules may never target.
    #[must_use]
    pub const fn is_reserved(self) -> bool {
        matches!(self, Self::Identity)
    }
}

/// Metadata for a dependency property.
///
/// # Example
///
/// ```rust
/// use understory_property::{PropertyMetadataBuilder, PropertyRole};
///
/// let metadata = PropertyMetadataBuilder::new(100.0_f64)
///     .validate(|v| v.is_finite())
///     .build();
///
/// assert_eq!(metadata.default_value(), &100.0);
/// assert!(!metadata.read_only());
/// assert_eq!(metadata.role(), PropertyRole::Ordinary);
/// assert!(!metadata.is_valid(&f64::NAN));
/// ```
pub struct PropertyMetadata<T: PropertyValue> {
    default_value: T,
    read_only: bool,
    role: PropertyRole,
    validate_callback: Option<ValidateValueCallback<T>>,
    coerce_callback: Option<CoerceValueCallback<T>>,
}

impl<T: PropertyValue> PropertyMetadata<T> {
    /// Creates new property metadata with the given default value.
    #[must_use]
    pub fn new(default_value: T) -> Self {
        PropertyMetadataBuilder::new(default_value).build()
    }

    /// Returns a reference to the default value.
    #[must_use]
    #[inline]
    pub fn default_value(&self) -> &T {
        &self.default_value
    }

    /// Returns whether the property rejects writes from outside its owner.
    #[must_use]
    #[inline]
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// Returns the structural role of the property.
    #[must_use]
    #[inline]
    pub fn role(&self) -> PropertyRole {
        self.role
    }

    /// Checks a value against the validation callback, if any.
    #[must_use]
    pub fn is_valid(&self, value: &T) -> bool {
        self.validate_callback
            .as_ref()
            .is_none_or(|validate| validate(value))
    }

    /// Coerces a value using the coerce callback if one is set.
    #[inline]
    pub fn coerce(&self, value: T) -> T {
        if let Some(callback) = &self.coerce_callback {
            callback(value)
        } else {
            value
        }
    }
}

impl<T: PropertyValue> core::fmt::Debug for PropertyMetadata<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PropertyMetadata")
            .field("default_value", &self.default_value)
            .field("read_only", &self.read_only)
            .field("role", &self.role)
            .field("has_validate_callback", &self.validate_callback.is_some())
            .field("has_coerce_callback", &self.coerce_callback.is_some())
            .finish()
    }
}

/// Builder for [`PropertyMetadata`].
pub struct PropertyMetadataBuilder<T: PropertyValue> {
    default_value: T,
    read_only: bool,
    role: PropertyRole,
    validate_callback: Option<ValidateValueCallback<T>>,
    coerce_callback: Option<CoerceValueCallback<T>>,
}

impl<T: PropertyValue> core::fmt::Debug for PropertyMetadataBuilder<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PropertyMetadataBuilder")
            .field("default_value", &self.default_value)
            .field("read_only", &self.read_only)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl<T: PropertyValue> PropertyMetadataBuilder<T> {
    /// Creates a new builder with the given default value.
    #[must_use]
    pub fn new(default_value: T) -> Self {
        Self {
            default_value,
            read_only: false,
            role: PropertyRole::Ordinary,
            validate_callback: None,
            coerce_callback: None,
        }
    }

    /// Marks the property as read-only for rules and external writers.
    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Sets the structural role of the property.
    #[must_use]
    pub fn role(mut self, role: PropertyRole) -> Self {
        self.role = role;
        self
    }

    /// Sets a callback used to reject invalid values.
    #[must_use]
    pub fn validate<F>(mut self, callback: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.validate_callback = Some(Box::new(callback));
        self
    }

    /// Sets a callback to coerce values before they are stored.
    #[must_use]
    pub fn coerce<F>(mut self, callback: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        self.coerce_callback = Some(Box::new(callback));
        self
    }

    /// Builds the [`PropertyMetadata`].
    #[must_use]
    pub fn build(self) -> PropertyMetadata<T> {
        PropertyMetadata {
            default_value: self.default_value,
            read_only: self.read_only,
            role: self.role,
            validate_callback: self.validate_callback,
            coerce_callback: self.coerce_callback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    #[test]
    fn metadata_defaults() {
        let metadata = PropertyMetadata::new(42_i32);
        assert_eq!(metadata.default_value(), &42);
        assert!(!metadata.read_only());
        assert_eq!(metadata.role(), PropertyRole::Ordinary);
        assert!(metadata.is_valid(&-1));
    }

    #[test]
    fn validate_and_coerce() {
        let metadata = PropertyMetadataBuilder::new(0.0_f64)
            .validate(|v| *v >= 0.0)
            .coerce(|v| v.min(100.0))
            .build();

        assert!(metadata.is_valid(&5.0));
        assert!(!metadata.is_valid(&-5.0));
        assert_eq!(metadata.coerce(150.0), 100.0);
    }

    #[test]
    fn identity_role_is_reserved() {
        assert!(PropertyRole::Identity.is_reserved());
        assert!(!PropertyRole::StyleReference.is_reserved());
        assert!(!PropertyRole::Ordinary.is_reserved());
    }

    #[test]
    fn metadata_debug() {
        let metadata = PropertyMetadataBuilder::new(42_i32).read_only(true).build();
        let debug = format!("{:?}", metadata);
        assert!(debug.contains("42"));
        assert!(debug.contains("read_only: true"));
    }
}
