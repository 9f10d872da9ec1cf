// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host services used while applying styles and templates.

use core::fmt;

use understory_property::ErasedValue;
use understory_scene::{NodeId, SceneTree};

use crate::binding::{BindingEvaluator, PropertyPathEvaluator};
use crate::resources::{NoResources, ResourceChain, ResourceDictionary, ResourceLookup};
use crate::setter::SetterValue;

/// Resource and binding resolution supplied by the host.
///
/// The default context finds no host resources and resolves bindings with
/// [`PropertyPathEvaluator`].
///
/// # Example
///
/// ```rust
/// use understory_property::ErasedValue;
/// use understory_scene::{NodeId, SceneTree};
/// use understory_style::{ResourceKey, StyleContext};
///
/// let app_resources = |_: &SceneTree, _: NodeId, key: ResourceKey| {
///     (key.index() == 0).then(|| ErasedValue::new(14.0_f64))
/// };
/// let cx = StyleContext::default().with_resources(&app_resources);
/// # let _ = cx;
/// ```
#[derive(Copy, Clone)]
pub struct StyleContext<'a> {
    resources: &'a dyn ResourceLookup,
    bindings: &'a dyn BindingEvaluator,
}

impl<'a> StyleContext<'a> {
    /// Creates a context from a resource lookup and a binding evaluator.
    #[must_use]
    pub fn new(resources: &'a dyn ResourceLookup, bindings: &'a dyn BindingEvaluator) -> Self {
        Self {
            resources,
            bindings,
        }
    }

    /// Replaces the host resource lookup.
    #[must_use]
    pub fn with_resources(self, resources: &'a dyn ResourceLookup) -> Self {
        Self { resources, ..self }
    }

    /// Replaces the binding evaluator.
    #[must_use]
    pub fn with_bindings(self, bindings: &'a dyn BindingEvaluator) -> Self {
        Self { bindings, ..self }
    }

    /// Returns the host resource lookup.
    #[must_use]
    pub fn resources(&self) -> &'a dyn ResourceLookup {
        self.resources
    }

    /// Returns the binding evaluator.
    #[must_use]
    pub fn bindings(&self) -> &'a dyn BindingEvaluator {
        self.bindings
    }

    /// Resolves a setter value for `node`, consulting `dictionaries` before the host.
    ///
    /// Returns `None` when a resource or binding does not resolve; the
    /// setter then leaves the property unset.
    pub(crate) fn resolve(
        &self,
        tree: &SceneTree,
        node: NodeId,
        dictionaries: &[ResourceDictionary],
        value: &SetterValue,
    ) -> Option<ErasedValue> {
        match value {
            SetterValue::Literal(value) => Some(value.clone()),
            SetterValue::Resource(key) => ResourceChain {
                dictionaries,
                fallback: self.resources,
            }
            .find_resource(tree, node, *key),
            SetterValue::Binding(binding) => self.bindings.evaluate(tree, binding, node),
            SetterValue::Deferred(deferred) => Some(deferred.get().clone()),
        }
    }
}

impl Default for StyleContext<'_> {
    fn default() -> Self {
        Self {
            resources: &NoResources,
            bindings: &PropertyPathEvaluator,
        }
    }
}

impl fmt::Debug for StyleContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StyleContext").finish_non_exhaustive()
    }
}
