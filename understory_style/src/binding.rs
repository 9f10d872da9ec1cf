// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Data bindings and their evaluation.

use core::fmt;
use std::sync::Arc;

use understory_property::ErasedValue;
use understory_scene::{NodeId, SceneTree};

/// A reference to data resolved at apply time rather than a literal value.
///
/// The path is opaque to this crate; a [`BindingEvaluator`] gives it meaning.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Binding {
    path: Arc<str>,
}

impl Binding {
    /// Creates a binding to `path`.
    #[must_use]
    pub fn new(path: impl Into<Arc<str>>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the binding path.
    #[must_use]
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn shared_path(&self) -> &Arc<str> {
        &self.path
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Binding({:?})", &*self.path)
    }
}

/// Evaluates a [`Binding`] in the context of a node.
///
/// Implemented for closures taking `(tree, binding, node)`.
pub trait BindingEvaluator {
    /// Returns the bound value, or `None` if the binding does not resolve.
    fn evaluate(&self, tree: &SceneTree, binding: &Binding, context: NodeId) -> Option<ErasedValue>;
}

impl<F> BindingEvaluator for F
where
    F: Fn(&SceneTree, &Binding, NodeId) -> Option<ErasedValue>,
{
    fn evaluate(&self, tree: &SceneTree, binding: &Binding, context: NodeId) -> Option<ErasedValue> {
        self(tree, binding, context)
    }
}

/// Resolves a binding path as the name of a registered property on the context node.
///
/// ```rust
/// use std::sync::Arc;
///
/// use understory_property::{PropertyMetadataBuilder, PropertyRegistry};
/// use understory_scene::{NodeKind, NodeType, SceneTree};
/// use understory_style::{Binding, BindingEvaluator, PropertyPathEvaluator};
///
/// let mut registry = PropertyRegistry::new();
/// let width = registry.register("Width", PropertyMetadataBuilder::new(0.0_f64).build());
/// let mut tree = SceneTree::new(Arc::new(registry));
/// let node = tree.create_node(&NodeType::builder("Leaf", NodeKind::Visual).build());
/// tree.set_value(node, width, 12.0).unwrap();
///
/// let value = PropertyPathEvaluator
///     .evaluate(&tree, &Binding::new("Width"), node)
///     .unwrap();
/// assert_eq!(value.downcast_ref::<f64>(), Some(&12.0));
/// ```
#[derive(Copy, Clone, Debug, Default)]
pub struct PropertyPathEvaluator;

impl BindingEvaluator for PropertyPathEvaluator {
    fn evaluate(&self, tree: &SceneTree, binding: &Binding, context: NodeId) -> Option<ErasedValue> {
        let property = tree.registry().by_name(binding.path())?;
        tree.get_erased(context, property)
    }
}
