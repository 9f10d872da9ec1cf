// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Templates: factory trees instantiated under a container.
//!
//! A [`Template`] owns a root [`FactoryNode`], conditional rules and event
//! triggers. Sealing names every factory node and resolves the names rules
//! use; instantiation creates the nodes, registers them as the container's
//! template children and writes their values to [`ValueLayer::Template`].
//! Template rules write to [`ValueLayer::TemplateTrigger`] and may target
//! any named child.

use core::fmt;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::debug;
use understory_property::{PropertyId, PropertyRegistry, ValueLayer};
use understory_scene::{ChildIndex, NodeId, NodeType, SceneTree, TreeError};

use crate::apply::RuleHost;
use crate::error::{StyleError, StyleResult};
use crate::factory::{FactoryNode, InstantiationSite, PreparedFactories};
use crate::resolve::StyleContext;
use crate::resources::{ResourceDictionary, ResourceKey};
use crate::rule::Trigger;
use crate::seal::SealCell;
use crate::tables::{NameScope, RuleTables};

#[derive(Clone, Debug, Default)]
struct TemplateDraft {
    target_type: Option<NodeType>,
    root: Option<FactoryNode>,
    triggers: Vec<Trigger>,
    resources: Option<ResourceDictionary>,
}

#[derive(Debug)]
struct SealedTemplate {
    target_type: Option<NodeType>,
    root: FactoryNode,
    names: Vec<(Arc<str>, ChildIndex)>,
    tables: RuleTables,
    resources: SmallVec<[ResourceDictionary; 1]>,
}

struct TemplateInner {
    registry: Arc<PropertyRegistry>,
    cell: SealCell<TemplateDraft, SealedTemplate>,
}

impl fmt::Debug for TemplateInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("sealed", &self.cell.sealed())
            .finish_non_exhaustive()
    }
}

struct TemplateScope<'a> {
    names: &'a [(Arc<str>, ChildIndex)],
}

impl TemplateScope<'_> {
    fn find(&self, name: &str) -> StyleResult<ChildIndex> {
        self.names
            .iter()
            .find(|(candidate, _)| &**candidate == name)
            .map(|(_, index)| *index)
            .ok_or_else(|| StyleError::UnknownTemplateChild { name: name.into() })
    }
}

impl NameScope for TemplateScope<'_> {
    fn condition_source(&self, name: &str) -> StyleResult<ChildIndex> {
        self.find(name)
    }

    fn setter_target(&self, name: &str) -> StyleResult<ChildIndex> {
        self.find(name)
    }
}

/// A shared, sealable template.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use understory_property::{ErasedValue, PropertyMetadataBuilder, PropertyRegistry};
/// use understory_scene::{NodeKind, NodeType, SceneTree, TypeCaps};
/// use understory_style::{FactoryNode, StyleContext, Template};
///
/// let mut registry = PropertyRegistry::new();
/// let padding = registry.register("Padding", PropertyMetadataBuilder::new(0.0_f64).build());
/// let registry = Arc::new(registry);
///
/// let button = NodeType::builder("Button", NodeKind::Visual).build();
/// let border = NodeType::builder("Border", NodeKind::Visual)
///     .capabilities(TypeCaps::ADD_CHILD)
///     .build();
///
/// let chrome = FactoryNode::of_type(&border);
/// chrome.set_name("Chrome").unwrap();
/// chrome.set_value(padding, ErasedValue::new(4.0_f64)).unwrap();
///
/// let template = Template::for_type(&registry, &button);
/// template.set_root(&chrome).unwrap();
///
/// let mut tree = SceneTree::new(Arc::clone(&registry));
/// let host = tree.create_node(&button);
/// let root = template.apply(&mut tree, host, &StyleContext::default()).unwrap();
///
/// assert_eq!(tree.render_children(host), &[root]);
/// assert_eq!(tree.template_child_by_name(host, "Chrome"), Some(root));
/// assert_eq!(tree.get_value(root, padding), Some(4.0));
/// ```
#[derive(Clone, Debug)]
pub struct Template {
    inner: Arc<TemplateInner>,
}

impl Template {
    /// Creates an empty template for any container type.
    #[must_use]
    pub fn new(registry: &Arc<PropertyRegistry>) -> Self {
        Self::with_draft(registry, TemplateDraft::default())
    }

    /// Creates an empty template for containers of `target_type`.
    #[must_use]
    pub fn for_type(registry: &Arc<PropertyRegistry>, target_type: &NodeType) -> Self {
        Self::with_draft(
            registry,
            TemplateDraft {
                target_type: Some(target_type.clone()),
                ..TemplateDraft::default()
            },
        )
    }

    fn with_draft(registry: &Arc<PropertyRegistry>, draft: TemplateDraft) -> Self {
        Self {
            inner: Arc::new(TemplateInner {
                registry: Arc::clone(registry),
                cell: SealCell::new("template", draft),
            }),
        }
    }

    /// Returns the container type this template is for, if restricted.
    #[must_use]
    pub fn target_type(&self) -> Option<NodeType> {
        match self.inner.cell.sealed() {
            Some(sealed) => sealed.target_type.clone(),
            None => self.inner.cell.read(|draft| draft.target_type.clone()),
        }
    }

    /// Restricts the template to containers of `target_type`.
    pub fn set_target_type(&self, target_type: &NodeType) -> StyleResult<()> {
        let target_type = target_type.clone();
        self.inner.cell.edit(|draft| {
            draft.target_type = Some(target_type);
            Ok(())
        })
    }

    /// Sets the root factory node, releasing any previous root.
    pub fn set_root(&self, root: &FactoryNode) -> StyleResult<()> {
        root.mark_parented()?;
        let replaced = self
            .inner
            .cell
            .edit(|draft| Ok(draft.root.replace(root.clone())));
        match replaced {
            Ok(previous) => {
                if let Some(previous) = previous {
                    previous.clear_parented();
                }
                Ok(())
            }
            Err(err) => {
                root.clear_parented();
                Err(err)
            }
        }
    }

    /// Returns the root factory node.
    #[must_use]
    pub fn root(&self) -> Option<FactoryNode> {
        match self.inner.cell.sealed() {
            Some(sealed) => Some(sealed.root.clone()),
            None => self.inner.cell.read(|draft| draft.root.clone()),
        }
    }

    /// Adds a conditional rule or event trigger.
    pub fn add_trigger(&self, trigger: impl Into<Trigger>) -> StyleResult<()> {
        let trigger = trigger.into();
        self.inner.cell.edit(|draft| {
            draft.triggers.push(trigger);
            Ok(())
        })
    }

    /// Attaches a resource dictionary consulted by resource values.
    pub fn set_resources(&self, resources: ResourceDictionary) -> StyleResult<()> {
        self.inner.cell.edit(|draft| {
            draft.resources = Some(resources);
            Ok(())
        })
    }

    /// Returns `true` once the template is sealed.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.inner.cell.is_sealed()
    }

    /// Validates and freezes the template, its factory tree and its rules.
    ///
    /// Factory nodes are only sealed if the whole template validates.
    pub fn seal(&self) -> StyleResult<()> {
        self.sealed().map(|_| ())
    }

    fn sealed(&self) -> StyleResult<&SealedTemplate> {
        if let Some(sealed) = self.inner.cell.sealed() {
            return Ok(sealed);
        }
        let registry = &self.inner.registry;
        let sealed = self.inner.cell.seal_with(|draft| seal_draft(registry, draft))?;
        for resources in &sealed.resources {
            resources.freeze();
        }
        debug!(
            children = sealed.names.len(),
            rules = sealed.tables.rules.len(),
            event_triggers = sealed.tables.event_triggers.len(),
            "sealed template"
        );
        Ok(sealed)
    }

    /// Returns the index of the child called `name`, once sealed.
    #[must_use]
    pub fn child_index(&self, name: &str) -> Option<ChildIndex> {
        let sealed = self.inner.cell.sealed()?;
        TemplateScope {
            names: &sealed.names,
        }
        .find(name)
        .ok()
    }

    /// Returns the names of the template's children in index order, once sealed.
    #[must_use]
    pub fn child_names(&self) -> Vec<Arc<str>> {
        self.inner
            .cell
            .sealed()
            .map(|sealed| sealed.names.iter().map(|(name, _)| Arc::clone(name)).collect())
            .unwrap_or_default()
    }

    /// Seals the template and creates its nodes for `container`.
    ///
    /// The nodes are registered as template children of `container` but the
    /// root is not attached; see [`apply`](Self::apply). On failure every
    /// node created so far is destroyed.
    pub fn instantiate(
        &self,
        tree: &mut SceneTree,
        container: NodeId,
        cx: &StyleContext<'_>,
    ) -> StyleResult<NodeId> {
        self.build(tree, container, cx, false)
    }

    /// Instantiates the template, attaches its root as a render child of
    /// `container`, connects event triggers and evaluates rules.
    ///
    /// Nothing is left behind when any step fails.
    pub fn apply(
        &self,
        tree: &mut SceneTree,
        container: NodeId,
        cx: &StyleContext<'_>,
    ) -> StyleResult<NodeId> {
        let root = self.build(tree, container, cx, true)?;
        if let Err(error) = self.activate(tree, container, cx) {
            self.detach(tree, container)?;
            return Err(error);
        }
        Ok(root)
    }

    fn build(
        &self,
        tree: &mut SceneTree,
        container: NodeId,
        cx: &StyleContext<'_>,
        attach: bool,
    ) -> StyleResult<NodeId> {
        let sealed = self.sealed()?;
        let container_type = tree
            .node_type(container)
            .ok_or(TreeError::StaleNode(container))?;
        if let Some(target) = &sealed.target_type
            && !target.is_assignable_from(container_type)
        {
            return Err(StyleError::TargetTypeMismatch {
                expected: target.name(),
                found: container_type.name(),
            });
        }
        let site = InstantiationSite {
            container,
            resources: &sealed.resources,
            cx,
        };
        let mut created = Vec::new();
        let built = sealed
            .root
            .instantiate(tree, &site, None, &mut created)
            .and_then(|root| root.ok_or(StyleError::TemplateRootIsText))
            .and_then(|root| {
                if attach {
                    tree.append_render_child(container, root)?;
                }
                Ok(root)
            });
        match built {
            Ok(root) => {
                debug!(?container, ?root, attach, "instantiated template");
                Ok(root)
            }
            Err(error) => {
                debug!(?container, %error, discarded = created.len(), "template instantiation failed");
                for node in created.into_iter().rev() {
                    if tree.is_alive(node) {
                        tree.destroy_node(node)?;
                    }
                }
                Err(error)
            }
        }
    }

    fn activate(&self, tree: &mut SceneTree, container: NodeId, cx: &StyleContext<'_>) -> StyleResult<()> {
        let sealed = self.sealed()?;
        for trigger in &sealed.tables.event_triggers {
            trigger.connect(tree, container)?;
        }
        self.host(sealed, container).evaluate_all(tree, cx)
    }

    /// Removes the nodes and values [`apply`](Self::apply) created for `container`.
    pub fn detach(&self, tree: &mut SceneTree, container: NodeId) -> StyleResult<()> {
        let sealed = self.sealed()?;
        for trigger in &sealed.tables.event_triggers {
            trigger.disconnect(tree, container)?;
        }
        self.host(sealed, container).deactivate_all(tree)?;
        for (_, child) in tree.clear_template_children(container)? {
            if tree.is_alive(child) {
                tree.destroy_node(child)?;
            }
        }
        debug!(?container, "detached template");
        Ok(())
    }

    /// Re-evaluates the rules reading `property` after it changed on `container`
    /// or one of its template children.
    pub fn invalidate(
        &self,
        tree: &mut SceneTree,
        container: NodeId,
        property: PropertyId,
        cx: &StyleContext<'_>,
    ) -> StyleResult<()> {
        let sealed = self.sealed()?;
        self.host(sealed, container)
            .invalidate_property(tree, property, cx)
    }

    /// Re-evaluates the rules reading the binding `path`.
    pub fn invalidate_binding(
        &self,
        tree: &mut SceneTree,
        container: NodeId,
        path: &str,
        cx: &StyleContext<'_>,
    ) -> StyleResult<()> {
        let sealed = self.sealed()?;
        self.host(sealed, container).invalidate_binding(tree, path, cx)
    }

    /// Re-resolves the factory values and rule setters referencing `key`
    /// after the resource changed for `container`.
    pub fn invalidate_resource(
        &self,
        tree: &mut SceneTree,
        container: NodeId,
        key: ResourceKey,
        cx: &StyleContext<'_>,
    ) -> StyleResult<()> {
        let sealed = self.sealed()?;
        let site = InstantiationSite {
            container,
            resources: &sealed.resources,
            cx,
        };
        sealed.root.refresh_resource(tree, &site, key)?;
        self.host(sealed, container)
            .invalidate_resource(tree, ValueLayer::Template, key, cx)
    }

    fn host<'a>(&self, sealed: &'a SealedTemplate, container: NodeId) -> RuleHost<'a> {
        RuleHost {
            tables: &sealed.tables,
            resources: &sealed.resources,
            layer: ValueLayer::TemplateTrigger,
            container,
        }
    }

    /// Returns `true` if both handles refer to the same template.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

fn seal_draft(registry: &PropertyRegistry, draft: &TemplateDraft) -> StyleResult<SealedTemplate> {
    let root = draft.root.clone().ok_or(StyleError::MissingTemplateRoot)?;
    if root.is_text() {
        return Err(StyleError::TemplateRootIsText);
    }
    let factories = PreparedFactories::prepare(&root, registry, draft.target_type.as_ref())?;
    let scope = TemplateScope {
        names: &factories.names,
    };

    let mut tables = RuleTables::default();
    for trigger in &draft.triggers {
        match trigger {
            Trigger::Conditional(rule) => tables.push_rule(registry, rule, &scope)?,
            Trigger::Event(event) => {
                if let Some(name) = event.source_name() {
                    scope.find(&name)?;
                }
                event.seal()?;
                event.validate(registry)?;
                tables.event_triggers.push(event.clone());
            }
        }
    }

    let names = factories.names.clone();
    factories.commit()?;
    Ok(SealedTemplate {
        target_type: draft.target_type.clone(),
        root,
        names,
        tables,
        resources: draft.resources.iter().cloned().collect(),
    })
}
