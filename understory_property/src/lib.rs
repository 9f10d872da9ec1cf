// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Property: dependency property keys and layered storage.
//!
//! This crate is the property bag underneath the Understory styling engine.
//! It answers three kinds of questions:
//!
//! - **Identity**: [`PropertyId`] and typed [`Property<T>`] keys handed out by
//!   a [`PropertyRegistry`].
//! - **Policy**: per-property [`PropertyMetadata`] (default value, read-only
//!   flag, [`PropertyRole`], validation and coercion callbacks).
//! - **Storage**: a sparse [`PropertyStore`] per object with one slot per
//!   [`ValueLayer`], resolved `Local → Trigger → TemplateTrigger → Style → Template → default`.
//!
//! Values cross API boundaries as [`ErasedValue`], which is cheap to clone,
//! comparable, and `Send + Sync`, so sealed style rules that carry values can
//! be shared between threads.
//!
//! ## Quick Start
//!
//! ```rust
//! use understory_property::{
//!     ErasedValue, PropertyMetadataBuilder, PropertyRegistry, PropertyStore, ValueLayer,
//! };
//!
//! let mut registry = PropertyRegistry::new();
//! let text = registry.register("Text", PropertyMetadataBuilder::new(String::new()).build());
//!
//! let mut store = PropertyStore::<u32>::new(1);
//! store.set(text, ValueLayer::Template, "Hi".to_string());
//! assert_eq!(store.get_effective(text, &registry), "Hi");
//!
//! let erased = ErasedValue::new("Hi".to_string());
//! assert!(registry.is_valid_value(text.id(), &erased));
//! assert_eq!(store.effective_erased(text.id()).map(|(v, _)| v), Some(&erased));
//! ```
//!
//! ## `no_std` Support
//!
//! This crate is `no_std` and uses `alloc`. It does not depend on `std`.

#![no_std]

extern crate alloc;

mod id;
mod metadata;
mod registry;
mod store;
mod value;

pub use id::{Property, PropertyId, PropertyValue};
pub use metadata::{
    CoerceValueCallback, PropertyMetadata, PropertyMetadataBuilder, PropertyRole,
    ValidateValueCallback,
};
pub use registry::{PropertyRegistration, PropertyRegistry};
pub use store::{PropertyStore, ValueLayer};
pub use value::ErasedValue;
