// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Actions run when a rule activates, deactivates or its event fires.

use core::fmt;
use std::sync::Arc;

use understory_property::{
    ErasedValue, Property, PropertyId, PropertyRegistry, PropertyValue, ValueLayer,
};
use understory_scene::{NodeId, SceneTree};

use crate::error::{StyleError, StyleResult};

/// Callback run by [`TriggerAction::Invoke`] with the host node.
pub type ActionCallback = Arc<dyn Fn(&mut SceneTree, NodeId) + Send + Sync>;

/// A side effect attached to a rule or event trigger.
#[derive(Clone)]
pub enum TriggerAction {
    /// Writes a local value on the host.
    SetValue {
        /// The property written.
        property: PropertyId,
        /// The value written.
        value: ErasedValue,
    },
    /// Runs a callback with the host.
    Invoke(ActionCallback),
}

impl TriggerAction {
    /// Creates an action writing a typed local value.
    #[must_use]
    pub fn set_value<T: PropertyValue>(property: Property<T>, value: T) -> Self {
        Self::SetValue {
            property: property.id(),
            value: ErasedValue::new(value),
        }
    }

    /// Creates an action running `callback`.
    #[must_use]
    pub fn invoke<F>(callback: F) -> Self
    where
        F: Fn(&mut SceneTree, NodeId) + Send + Sync + 'static,
    {
        Self::Invoke(Arc::new(callback))
    }

    /// Checks that a written value is accepted by its property.
    pub(crate) fn validate(&self, registry: &PropertyRegistry) -> StyleResult<()> {
        let Self::SetValue { property, value } = self else {
            return Ok(());
        };
        let property = *property;
        let registration = registry
            .get(property)
            .ok_or(StyleError::UnknownProperty(property))?;
        if registration.read_only() {
            return Err(StyleError::ReadOnlyProperty { property });
        }
        if !registration.is_valid_value(value) {
            return Err(StyleError::InvalidValue {
                property,
                type_name: value.type_name(),
            });
        }
        Ok(())
    }

    /// Runs the action against `host`.
    pub fn run(&self, tree: &mut SceneTree, host: NodeId) -> StyleResult<()> {
        match self {
            Self::SetValue { property, value } => {
                self.validate(tree.registry())?;
                tree.set_layer_value(host, *property, ValueLayer::Local, value.clone())?;
            }
            Self::Invoke(callback) => callback(tree, host),
        }
        Ok(())
    }
}

impl fmt::Debug for TriggerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetValue { property, value } => f
                .debug_struct("SetValue")
                .field("property", property)
                .field("value", value)
                .finish(),
            Self::Invoke(_) => f.write_str("Invoke(..)"),
        }
    }
}
