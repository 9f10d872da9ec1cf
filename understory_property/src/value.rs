// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Type-erased property value storage.
//!
//! [`ErasedValue`] stores a value of any [`PropertyValue`] type behind a
//! shared pointer. Erased values can be compared with each other, which is
//! what value conditions rely on.

use alloc::sync::Arc;
use core::any::{Any, TypeId};
use core::fmt;

use crate::id::PropertyValue;

/// A type-erased, immutable property value.
///
/// Cloning is cheap (reference count bump). Two erased values are equal when
/// they hold the same type and the values compare equal.
///
/// # Example
///
/// ```rust
/// use understory_property::ErasedValue;
///
/// let value = ErasedValue::new(42_i32);
/// assert!(value.is::<i32>());
/// assert_eq!(value.downcast_ref::<i32>(), Some(&42));
/// assert_eq!(value, ErasedValue::new(42_i32));
/// assert_ne!(value, ErasedValue::new(42_i64));
/// ```
#[derive(Clone)]
pub struct ErasedValue {
    inner: Arc<dyn ErasedValueTrait>,
}

impl ErasedValue {
    /// Creates a new erased value from a concrete value.
    #[must_use]
    pub fn new<T: PropertyValue>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }

    /// Returns the [`TypeId`] of the contained value.
    #[must_use]
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.inner.as_any().type_id()
    }

    /// Returns the type name of the contained value, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.inner.type_name()
    }

    /// Returns `true` if the contained value is of type `T`.
    #[must_use]
    #[inline]
    pub fn is<T: 'static>(&self) -> bool {
        self.inner.as_any().is::<T>()
    }

    /// Attempts to downcast to a reference of type `T`.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref()
    }

    /// Returns `true` if both handles share the same allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for ErasedValue {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.inner.eq_erased(other.inner.as_any())
    }
}

impl fmt::Debug for ErasedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt_erased(f)
    }
}

trait ErasedValueTrait: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn eq_erased(&self, other: &dyn Any) -> bool;
    fn fmt_erased(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
    fn type_name(&self) -> &'static str;
}

impl<T: PropertyValue> ErasedValueTrait for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_erased(&self, other: &dyn Any) -> bool {
        other.downcast_ref::<T>().is_some_and(|other| self == other)
    }

    fn fmt_erased(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }

    fn type_name(&self) -> &'static str {
        core::any::type_name::<T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;
    use alloc::string::String;

    #[test]
    fn downcast_checks_type() {
        let value = ErasedValue::new(42_i32);
        assert!(value.is::<i32>());
        assert!(!value.is::<f64>());
        assert_eq!(value.downcast_ref::<f64>(), None);
        assert_eq!(value.type_id(), TypeId::of::<i32>());
    }

    #[test]
    fn equality_compares_contents() {
        let a = ErasedValue::new(String::from("Hi"));
        let b = ErasedValue::new(String::from("Hi"));
        let c = ErasedValue::new(String::from("Bye"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.ptr_eq(&b));
        assert!(a.ptr_eq(&a.clone()));
    }

    #[test]
    fn different_types_are_unequal() {
        assert_ne!(ErasedValue::new(1_u8), ErasedValue::new(1_u16));
    }

    #[test]
    fn debug_shows_inner_value() {
        let value = ErasedValue::new(String::from("hello"));
        assert_eq!(format!("{:?}", value), "\"hello\"");
        assert!(value.type_name().contains("String"));
    }
}
