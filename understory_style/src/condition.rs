// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conditions tested by conditional rules.

use std::sync::Arc;

use understory_property::{ErasedValue, Property, PropertyId, PropertyRegistry, PropertyValue};
use understory_scene::{NodeId, SceneTree};

use crate::binding::Binding;
use crate::error::{StyleError, StyleResult};
use crate::resolve::StyleContext;

/// What a [`Condition`] reads.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConditionSource {
    /// The effective value of a property.
    Property(PropertyId),
    /// The result of evaluating a binding.
    Binding(Binding),
}

/// A `source == value` test, optionally read from a named template child.
///
/// # Example
///
/// ```rust
/// use understory_property::{PropertyMetadataBuilder, PropertyRegistry};
/// use understory_style::{Binding, Condition, ConditionSource};
///
/// let mut registry = PropertyRegistry::new();
/// let hovered = registry.register("IsHovered", PropertyMetadataBuilder::new(false).build());
///
/// let on_hover = Condition::property(hovered, true);
/// assert_eq!(on_hover.source(), &ConditionSource::Property(hovered.id()));
///
/// let in_stock = Condition::binding(Binding::new("Item.InStock"), true).with_source_name("Row");
/// assert_eq!(in_stock.source_name(), Some("Row"));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    source: ConditionSource,
    value: ErasedValue,
    source_name: Option<Arc<str>>,
}

impl Condition {
    /// Tests a property against a typed value.
    #[must_use]
    pub fn property<T: PropertyValue>(property: Property<T>, value: T) -> Self {
        Self::property_erased(property.id(), ErasedValue::new(value))
    }

    /// Tests a property against an erased value.
    #[must_use]
    pub fn property_erased(property: PropertyId, value: ErasedValue) -> Self {
        Self {
            source: ConditionSource::Property(property),
            value,
            source_name: None,
        }
    }

    /// Tests a binding against a typed value.
    #[must_use]
    pub fn binding<T: PropertyValue>(binding: Binding, value: T) -> Self {
        Self {
            source: ConditionSource::Binding(binding),
            value: ErasedValue::new(value),
            source_name: None,
        }
    }

    /// Reads the source from the template child called `name`.
    #[must_use]
    pub fn with_source_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    /// Returns what the condition reads.
    #[must_use]
    #[inline]
    pub fn source(&self) -> &ConditionSource {
        &self.source
    }

    /// Returns the value the source is compared with.
    #[must_use]
    #[inline]
    pub fn value(&self) -> &ErasedValue {
        &self.value
    }

    /// Returns the template child the source is read from, if any.
    #[must_use]
    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }

    /// Returns the property read, for property conditions.
    #[must_use]
    pub fn property_id(&self) -> Option<PropertyId> {
        match &self.source {
            ConditionSource::Property(id) => Some(*id),
            ConditionSource::Binding(_) => None,
        }
    }

    pub(crate) fn is_binding(&self) -> bool {
        matches!(self.source, ConditionSource::Binding(_))
    }

    pub(crate) fn validate(&self, registry: &PropertyRegistry) -> StyleResult<()> {
        let ConditionSource::Property(property) = self.source else {
            return Ok(());
        };
        let registration = registry
            .get(property)
            .ok_or(StyleError::UnknownProperty(property))?;
        if self.value.type_id() != registration.type_id() {
            return Err(StyleError::InvalidValue {
                property,
                type_name: self.value.type_name(),
            });
        }
        Ok(())
    }

    /// Evaluates the condition against `node`.
    pub(crate) fn matches(&self, tree: &SceneTree, node: NodeId, cx: &StyleContext<'_>) -> bool {
        let current = match &self.source {
            ConditionSource::Property(property) => tree.get_erased(node, *property),
            ConditionSource::Binding(binding) => cx.bindings().evaluate(tree, binding, node),
        };
        current.is_some_and(|current| current == self.value)
    }
}

#[cfg(test)]
mod tests {
    use understory_property::PropertyMetadataBuilder;
    use understory_scene::{NodeKind, NodeType};

    use super::*;

    #[test]
    fn property_condition_reads_effective_value() {
        let mut registry = PropertyRegistry::new();
        let pressed = registry.register("IsPressed", PropertyMetadataBuilder::new(false).build());
        let mut tree = SceneTree::new(Arc::new(registry));
        let node = tree.create_node(&NodeType::builder("Button", NodeKind::Visual).build());
        let condition = Condition::property(pressed, true);
        let cx = StyleContext::default();

        assert!(!condition.matches(&tree, node, &cx));
        tree.set_value(node, pressed, true).unwrap();
        assert!(condition.matches(&tree, node, &cx));
        tree.clear_value(node, pressed.id()).unwrap();
        // The default value takes part in the comparison.
        assert!(Condition::property(pressed, false).matches(&tree, node, &cx));
    }

    #[test]
    fn unresolved_binding_never_matches() {
        let mut tree = SceneTree::new(Arc::new(PropertyRegistry::new()));
        let node = tree.create_node(&NodeType::builder("Row", NodeKind::Visual).build());
        let condition = Condition::binding(Binding::new("Missing"), 1_u32);
        assert!(!condition.matches(&tree, node, &StyleContext::default()));
    }

    #[test]
    fn validation_checks_value_type() {
        let mut registry = PropertyRegistry::new();
        let pressed = registry.register("IsPressed", PropertyMetadataBuilder::new(false).build());
        let bad = Condition::property_erased(pressed.id(), ErasedValue::new(1_u32));
        assert!(matches!(
            bad.validate(&registry),
            Err(StyleError::InvalidValue { .. })
        ));
        assert!(Condition::property(pressed, true).validate(&registry).is_ok());
    }
}
