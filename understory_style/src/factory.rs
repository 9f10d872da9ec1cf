// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Factory nodes: the blueprint a template instantiates.
//!
//! Each factory node describes one node to create (or one run of literal
//! text), the values and handlers to give it, and its children. A factory
//! node belongs to at most one parent and is sealed together with the
//! template that owns it.

use core::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use understory_property::{ErasedValue, PropertyId, PropertyRegistry, ValueLayer};
use understory_scene::{
    ChildIndex, EventArgs, EventHandler, EventId, NodeId, NodeType, SceneTree, TypeCaps,
};

use crate::alias::content_aliases;
use crate::error::{StyleError, StyleResult};
use crate::resolve::StyleContext;
use crate::resources::{ResourceChain, ResourceDictionary, ResourceKey, ResourceLookup};
use crate::seal::SealCell;

static NEXT_GENERATED_NAME: AtomicU64 = AtomicU64::new(1);

/// A value a factory node gives the node it creates.
#[derive(Clone, Debug, PartialEq)]
pub enum FactoryValue {
    /// A concrete value.
    Literal(ErasedValue),
    /// A resource looked up from the templated parent.
    Resource(ResourceKey),
    /// The templated parent's effective value of another property.
    TemplateBinding(PropertyId),
}

impl From<ErasedValue> for FactoryValue {
    fn from(value: ErasedValue) -> Self {
        Self::Literal(value)
    }
}

impl From<ResourceKey> for FactoryValue {
    fn from(key: ResourceKey) -> Self {
        Self::Resource(key)
    }
}

#[derive(Clone, Default)]
struct FactoryDraft {
    node_type: Option<NodeType>,
    text: Option<Arc<str>>,
    name: Option<Arc<str>>,
    content_source: Option<Arc<str>>,
    values: Vec<(PropertyId, FactoryValue)>,
    handlers: Vec<(EventId, EventHandler)>,
    children: Vec<FactoryNode>,
}

impl fmt::Debug for FactoryDraft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryDraft")
            .field("node_type", &self.node_type)
            .field("text", &self.text)
            .field("name", &self.name)
            .field("values", &self.values)
            .field("handlers", &self.handlers.len())
            .field("children", &self.children.len())
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub(crate) struct SealedFactory {
    node_type: Option<NodeType>,
    text: Option<Arc<str>>,
    /// Name and index within the template; absent for text.
    slot: Option<(Arc<str>, ChildIndex)>,
    values: Vec<(PropertyId, FactoryValue)>,
    handlers: Vec<(EventId, EventHandler)>,
    children: Vec<FactoryNode>,
}

impl fmt::Debug for SealedFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealedFactory")
            .field("node_type", &self.node_type)
            .field("text", &self.text)
            .field("slot", &self.slot)
            .field("values", &self.values)
            .field("children", &self.children.len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct FactoryInner {
    cell: SealCell<FactoryDraft, SealedFactory>,
    parented: AtomicBool,
}

/// One node (or run of text) in a template's blueprint.
///
/// # Example
///
/// ```rust
/// use understory_scene::{NodeKind, NodeType, TypeCaps};
/// use understory_style::FactoryNode;
///
/// let border = NodeType::builder("Border", NodeKind::Visual)
///     .capabilities(TypeCaps::ADD_CHILD)
///     .build();
/// let label = NodeType::builder("Label", NodeKind::Visual)
///     .capabilities(TypeCaps::ADD_TEXT)
///     .build();
///
/// let root = FactoryNode::of_type(&border);
/// let caption = FactoryNode::of_type(&label);
/// caption.set_name("Caption").unwrap();
/// caption.append_child(&FactoryNode::text("OK")).unwrap();
/// root.append_child(&caption).unwrap();
///
/// // A factory node has at most one parent.
/// assert!(FactoryNode::of_type(&border).append_child(&caption).is_err());
/// ```
#[derive(Clone, Debug)]
pub struct FactoryNode {
    inner: Arc<FactoryInner>,
}

impl FactoryNode {
    /// Creates a factory node with neither a type nor text.
    #[must_use]
    pub fn new() -> Self {
        Self::with_draft(FactoryDraft::default())
    }

    /// Creates a factory node producing a node of `node_type`.
    #[must_use]
    pub fn of_type(node_type: &NodeType) -> Self {
        Self::with_draft(FactoryDraft {
            node_type: Some(node_type.clone()),
            ..FactoryDraft::default()
        })
    }

    /// Creates a factory node producing literal text in its parent.
    #[must_use]
    pub fn text(text: impl Into<Arc<str>>) -> Self {
        Self::with_draft(FactoryDraft {
            text: Some(text.into()),
            ..FactoryDraft::default()
        })
    }

    fn with_draft(draft: FactoryDraft) -> Self {
        Self {
            inner: Arc::new(FactoryInner {
                cell: SealCell::new("factory node", draft),
                parented: AtomicBool::new(false),
            }),
        }
    }

    /// Sets the type of node produced.
    pub fn set_type(&self, node_type: &NodeType) -> StyleResult<()> {
        let node_type = node_type.clone();
        self.inner.cell.edit(|draft| {
            draft.node_type = Some(node_type);
            Ok(())
        })
    }

    /// Makes the factory node produce literal text.
    pub fn set_text(&self, text: impl Into<Arc<str>>) -> StyleResult<()> {
        let text = text.into();
        self.inner.cell.edit(|draft| {
            if !draft.children.is_empty() {
                return Err(StyleError::TextAndChildrenMutuallyExclusive);
            }
            draft.text = Some(text);
            Ok(())
        })
    }

    /// Names the node so rules and event triggers can address it.
    pub fn set_name(&self, name: impl Into<Arc<str>>) -> StyleResult<()> {
        let name = name.into();
        self.inner.cell.edit(|draft| {
            draft.name = Some(name);
            Ok(())
        })
    }

    /// Changes the templated-parent prefix used for content aliasing.
    pub fn set_content_source(&self, prefix: impl Into<Arc<str>>) -> StyleResult<()> {
        let prefix = prefix.into();
        self.inner.cell.edit(|draft| {
            draft.content_source = Some(prefix);
            Ok(())
        })
    }

    /// Assigns a value to the produced node. Later assignments of a property win.
    pub fn set_value(
        &self,
        property: impl Into<PropertyId>,
        value: impl Into<FactoryValue>,
    ) -> StyleResult<()> {
        let property = property.into();
        let value = value.into();
        self.inner.cell.edit(|draft| {
            draft.values.retain(|(p, _)| *p != property);
            draft.values.push((property, value));
            Ok(())
        })
    }

    /// Registers an event handler on the produced node.
    pub fn add_handler<F>(&self, event: EventId, handler: F) -> StyleResult<()>
    where
        F: Fn(&mut SceneTree, &mut EventArgs) + Send + Sync + 'static,
    {
        let handler: EventHandler = Arc::new(handler);
        self.inner.cell.edit(|draft| {
            draft.handlers.push((event, handler));
            Ok(())
        })
    }

    /// Appends `child`, which must not already have a parent.
    pub fn append_child(&self, child: &Self) -> StyleResult<()> {
        if self.ptr_eq(child) {
            return Err(StyleError::FactoryAlreadyParented);
        }
        child.mark_parented()?;
        let appended = self.inner.cell.edit(|draft| {
            if draft.text.is_some() {
                return Err(StyleError::TextAndChildrenMutuallyExclusive);
            }
            draft.children.push(child.clone());
            Ok(())
        });
        if appended.is_err() {
            child.clear_parented();
        }
        appended
    }

    /// Returns the node's name: the explicit one, or the generated one once sealed.
    #[must_use]
    pub fn name(&self) -> Option<Arc<str>> {
        match self.inner.cell.sealed() {
            Some(sealed) => sealed.slot.as_ref().map(|(name, _)| Arc::clone(name)),
            None => self.inner.cell.read(|draft| draft.name.clone()),
        }
    }

    /// Returns the node's index within its template, once sealed.
    #[must_use]
    pub fn child_index(&self) -> Option<ChildIndex> {
        self.inner.cell.sealed()?.slot.as_ref().map(|(_, index)| *index)
    }

    /// Returns `true` once the owning template has been sealed.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.inner.cell.is_sealed()
    }

    /// Returns `true` if the node has been given a parent or template.
    #[must_use]
    pub fn has_parent(&self) -> bool {
        self.inner.parented.load(Ordering::Acquire)
    }

    /// Returns `true` if both handles refer to the same factory node.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn mark_parented(&self) -> StyleResult<()> {
        if self.inner.parented.swap(true, Ordering::AcqRel) {
            return Err(StyleError::FactoryAlreadyParented);
        }
        Ok(())
    }

    pub(crate) fn clear_parented(&self) {
        self.inner.parented.store(false, Ordering::Release);
    }

    pub(crate) fn is_text(&self) -> bool {
        self.inner.cell.read(|draft| draft.text.is_some())
    }

    fn draft_type(&self) -> Option<NodeType> {
        match self.inner.cell.sealed() {
            Some(sealed) => sealed.node_type.clone(),
            None => self.inner.cell.read(|draft| draft.node_type.clone()),
        }
    }

    /// Creates the node described by this factory and its descendants.
    ///
    /// Text factories append their text to `parent` and produce no node.
    /// Every node created is pushed to `created`, including on failure.
    pub(crate) fn instantiate(
        &self,
        tree: &mut SceneTree,
        site: &InstantiationSite<'_>,
        parent: Option<NodeId>,
        created: &mut Vec<NodeId>,
    ) -> StyleResult<Option<NodeId>> {
        let sealed = self
            .inner
            .cell
            .sealed()
            .ok_or(StyleError::NotSealed { what: "factory node" })?;
        if let Some(text) = &sealed.text {
            if let Some(parent) = parent {
                tree.append_text(parent, text)?;
            }
            return Ok(None);
        }
        let Some(node_type) = &sealed.node_type else {
            return Err(StyleError::FactoryTypeRequired);
        };

        let node = tree.create_node(node_type);
        created.push(node);
        tree.begin_init(node)?;
        if let Some((name, index)) = &sealed.slot {
            tree.register_template_child(site.container, *index, Arc::clone(name), node)?;
        }
        for (property, value) in &sealed.values {
            if let Some(value) = site.resolve(tree, *property, value) {
                tree.set_layer_value(node, *property, ValueLayer::Template, value)?;
            }
        }
        for (event, handler) in &sealed.handlers {
            tree.add_shared_handler(node, *event, Arc::clone(handler))?;
        }
        let hosts_definitions = node_type.capabilities().contains(TypeCaps::DEFINITION_HOST);
        for child in &sealed.children {
            let is_definition = hosts_definitions && child.draft_type().is_some_and(is_definition);
            if let Some(child_node) = child.instantiate(tree, site, Some(node), created)? {
                if is_definition {
                    tree.add_definition(node, child_node)?;
                } else {
                    tree.append_child(node, child_node)?;
                }
            }
        }
        tree.end_init(node)?;
        Ok(Some(node))
    }

    /// Re-resolves the resource values referencing `key` on the nodes this
    /// factory tree created for `site.container`.
    pub(crate) fn refresh_resource(
        &self,
        tree: &mut SceneTree,
        site: &InstantiationSite<'_>,
        key: ResourceKey,
    ) -> StyleResult<()> {
        let Some(sealed) = self.inner.cell.sealed() else {
            return Ok(());
        };
        if let Some((_, index)) = &sealed.slot
            && let Some(node) = tree.template_child(site.container, *index)
        {
            for (property, value) in &sealed.values {
                if *value != FactoryValue::Resource(key) {
                    continue;
                }
                match site.resolve(tree, *property, value) {
                    Some(value) => tree.set_layer_value(node, *property, ValueLayer::Template, value)?,
                    None => tree.clear_layer_value(node, *property, ValueLayer::Template)?,
                };
            }
        }
        for child in &sealed.children {
            child.refresh_resource(tree, site, key)?;
        }
        Ok(())
    }
}

impl Default for FactoryNode {
    fn default() -> Self {
        Self::new()
    }
}

fn is_definition(node_type: NodeType) -> bool {
    node_type.capabilities().contains(TypeCaps::LAYOUT_DEFINITION)
}

/// Where a template is being instantiated.
pub(crate) struct InstantiationSite<'a> {
    pub(crate) container: NodeId,
    pub(crate) resources: &'a [ResourceDictionary],
    pub(crate) cx: &'a StyleContext<'a>,
}

impl InstantiationSite<'_> {
    fn resolve(&self, tree: &SceneTree, property: PropertyId, value: &FactoryValue) -> Option<ErasedValue> {
        match value {
            FactoryValue::Literal(value) => Some(value.clone()),
            FactoryValue::Resource(key) => ResourceChain {
                dictionaries: self.resources,
                fallback: self.cx.resources(),
            }
            .find_resource(tree, self.container, *key),
            FactoryValue::TemplateBinding(source) => tree
                .get_erased(self.container, *source)
                .filter(|value| tree.registry().is_valid_value(property, value)),
        }
    }
}

/// A validated factory tree, ready to be sealed once its template is.
pub(crate) struct PreparedFactories {
    forms: Vec<(FactoryNode, SealedFactory)>,
    pub(crate) names: Vec<(Arc<str>, ChildIndex)>,
}

impl PreparedFactories {
    /// Validates the tree under `root`, assigning names and indices in pre-order.
    pub(crate) fn prepare(
        root: &FactoryNode,
        registry: &PropertyRegistry,
        target_type: Option<&NodeType>,
    ) -> StyleResult<Self> {
        let mut drafts = Vec::new();
        collect(root, &mut Vec::new(), &mut drafts)?;
        let mut prepared = Self {
            forms: Vec::with_capacity(drafts.len()),
            names: Vec::new(),
        };
        for (node, draft) in drafts {
            let form = prepared.validate(registry, target_type, draft)?;
            prepared.forms.push((node, form));
        }
        Ok(prepared)
    }

    /// Seals every factory node.
    pub(crate) fn commit(self) -> StyleResult<()> {
        for (node, form) in self.forms {
            node.inner.cell.seal_with(|_| Ok(form))?;
        }
        Ok(())
    }

    fn validate(
        &mut self,
        registry: &PropertyRegistry,
        target_type: Option<&NodeType>,
        draft: FactoryDraft,
    ) -> StyleResult<SealedFactory> {
        let node_type = match (&draft.node_type, &draft.text) {
            (None, None) => return Err(StyleError::FactoryTypeRequired),
            (Some(_), Some(_)) => return Err(StyleError::TypeAndTextMutuallyExclusive),
            (None, Some(_)) if !draft.children.is_empty() => {
                return Err(StyleError::TextAndChildrenMutuallyExclusive);
            }
            (None, Some(_)) => {
                return Ok(SealedFactory {
                    node_type: None,
                    text: draft.text,
                    slot: None,
                    values: Vec::new(),
                    handlers: Vec::new(),
                    children: Vec::new(),
                });
            }
            (Some(node_type), None) => node_type.clone(),
        };
        let caps = node_type.capabilities();

        for child in &draft.children {
            let accepted = if child.is_text() {
                caps.contains(TypeCaps::ADD_TEXT)
            } else {
                caps.contains(TypeCaps::ADD_CHILD)
                    || (caps.contains(TypeCaps::DEFINITION_HOST)
                        && child.draft_type().is_some_and(is_definition))
            };
            if !accepted {
                return Err(StyleError::TypeMustSupportChildren {
                    type_name: node_type.name(),
                });
            }
        }

        for (property, value) in &draft.values {
            let registration = registry
                .get(*property)
                .ok_or(StyleError::UnknownProperty(*property))?;
            match value {
                FactoryValue::Literal(literal) if !registration.is_valid_value(literal) => {
                    return Err(StyleError::InvalidValue {
                        property: *property,
                        type_name: literal.type_name(),
                    });
                }
                FactoryValue::Literal(_) => {}
                _ if caps.contains(TypeCaps::CONTENT_3D) => {
                    return Err(StyleError::Template3DPropertyUnsupported {
                        property: *property,
                    });
                }
                FactoryValue::TemplateBinding(source) if registry.get(*source).is_none() => {
                    return Err(StyleError::UnknownProperty(*source));
                }
                FactoryValue::Resource(_) | FactoryValue::TemplateBinding(_) => {}
            }
        }

        let mut values = draft.values;
        if caps.contains(TypeCaps::CONTENT_PRESENTER) {
            let aliases = content_aliases(
                registry,
                target_type,
                draft.content_source.as_deref(),
                &values,
            )?;
            values.extend(aliases);
        }

        let name = match draft.name {
            Some(name) => {
                if self.names.iter().any(|(existing, _)| *existing == name) {
                    return Err(StyleError::DuplicateName {
                        name: name.to_string(),
                    });
                }
                name
            }
            None => {
                let serial = NEXT_GENERATED_NAME.fetch_add(1, Ordering::Relaxed);
                Arc::from(format!("__template_child_{serial}"))
            }
        };
        let index = u16::try_from(self.names.len() + 1)
            .map(ChildIndex::new)
            .map_err(|_| StyleError::TooManyTemplateChildren)?;
        self.names.push((Arc::clone(&name), index));

        Ok(SealedFactory {
            node_type: Some(node_type),
            text: None,
            slot: Some((name, index)),
            values,
            handlers: draft.handlers,
            children: draft.children,
        })
    }
}

/// Snapshots the tree in pre-order, rejecting nodes reachable from themselves.
fn collect(
    node: &FactoryNode,
    path: &mut Vec<FactoryNode>,
    out: &mut Vec<(FactoryNode, FactoryDraft)>,
) -> StyleResult<()> {
    if path.iter().any(|ancestor| ancestor.ptr_eq(node)) {
        return Err(StyleError::FactoryAlreadyParented);
    }
    if node.is_sealed() {
        return Err(StyleError::Sealed {
            what: "factory node",
        });
    }
    let draft = node.inner.cell.read(Clone::clone);
    let children = draft.children.clone();
    out.push((node.clone(), draft));
    path.push(node.clone());
    for child in &children {
        collect(child, path, out)?;
    }
    path.pop();
    Ok(())
}
