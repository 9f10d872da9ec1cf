// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Style: sealed style cascades and templates for an understory scene tree.
//!
//! This crate layers styling on top of `understory_scene`. Property values
//! written here land in the per-node layers of `understory_property`:
//!
//! **Local → Trigger → `TemplateTrigger` → Style → Template → Default**
//!
//! ## Core Concepts
//!
//! ### Styles
//!
//! A [`Style`] targets a node type and holds [`Setter`]s, conditional rules
//! and event triggers. Styles can be based on other styles; sealing merges
//! the chain, rejects cycles and validates every rule. After sealing a style
//! is immutable and can be shared across threads and nodes.
//!
//! ### Rules
//!
//! A [`ConditionalRule`] applies its setters while all of its
//! [`Condition`]s hold. Conditions read a property or a [`Binding`]. An
//! [`EventTrigger`] runs [`TriggerAction`]s when a node raises an event.
//! When several active rules set the same property, the one added last wins.
//!
//! ### Templates
//!
//! A [`Template`] is a tree of [`FactoryNode`]s. Applying it creates the
//! nodes under a container, registers them as named template children and
//! evaluates the template's rules, which may read from and write to any
//! named child.
//!
//! ### Resources and bindings
//!
//! Setters may reference a [`ResourceKey`] or a [`Binding`] instead of a
//! literal. Both are resolved at apply time through a [`StyleContext`]:
//! resources search the style's [`ResourceDictionary`] chain, then the host's
//! [`ResourceLookup`]; bindings go to a [`BindingEvaluator`].
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use understory_property::{PropertyMetadataBuilder, PropertyRegistry, ValueLayer};
//! use understory_scene::{NodeKind, NodeType, SceneTree};
//! use understory_style::{Condition, ConditionalRule, Setter, Style, StyleContext};
//!
//! let mut registry = PropertyRegistry::new();
//! let hovered = registry.register("IsHovered", PropertyMetadataBuilder::new(false).build());
//! let opacity = registry.register("Opacity", PropertyMetadataBuilder::new(1.0_f64).build());
//! let registry = Arc::new(registry);
//!
//! let button = NodeType::builder("Button", NodeKind::Visual).build();
//! let style = Style::for_type(&registry, &button);
//! style.add_setter(Setter::literal(&registry, opacity, 0.9).unwrap()).unwrap();
//! let hover = ConditionalRule::property(Condition::property(hovered, true)).unwrap();
//! hover.add_setter(Setter::literal(&registry, opacity, 1.0).unwrap()).unwrap();
//! style.add_trigger(hover).unwrap();
//!
//! let mut tree = SceneTree::new(Arc::clone(&registry));
//! let node = tree.create_node(&button);
//! let cx = StyleContext::default();
//! style.apply(&mut tree, node, &cx).unwrap();
//! assert_eq!(tree.get_value(node, opacity), Some(0.9));
//!
//! tree.set_value(node, hovered, true).unwrap();
//! style.invalidate(&mut tree, node, hovered.id(), &cx).unwrap();
//! assert_eq!(tree.get_value(node, opacity), Some(1.0));
//! assert_eq!(tree.value_source(node, opacity.id()), Some(ValueLayer::Trigger));
//! ```

mod action;
mod alias;
mod apply;
mod binding;
mod condition;
mod error;
mod event_trigger;
mod factory;
mod resolve;
mod resources;
mod rule;
mod seal;
mod setter;
mod style;
mod tables;
mod template;

pub use action::{ActionCallback, TriggerAction};
pub use binding::{Binding, BindingEvaluator, PropertyPathEvaluator};
pub use condition::{Condition, ConditionSource};
pub use error::{ErrorKind, StyleError, StyleResult};
pub use event_trigger::EventTrigger;
pub use factory::{FactoryNode, FactoryValue};
pub use resolve::StyleContext;
pub use resources::{NoResources, ResourceDictionary, ResourceKey, ResourceLookup};
pub use rule::{ConditionalRule, RuleKind, Trigger};
pub use setter::{DeferredValue, Setter, SetterValue};
pub use style::Style;
pub use template::Template;
