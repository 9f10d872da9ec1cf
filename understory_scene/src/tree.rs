// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The scene arena: nodes, their two parent relations, and per-node state.

use core::fmt;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::{debug, trace};
use understory_property::{
    ErasedValue, Property, PropertyId, PropertyRegistry, PropertyStore, PropertyValue, ValueLayer,
};

use crate::config::SceneConfig;
use crate::dispatch::{DeferredDispatch, DispatchQueue, LayoutCallbacks};
use crate::error::{TreeError, TreeResult};
use crate::event::{EventArgs, EventHandler, EventId, HandlerId};
use crate::id::{ChildIndex, NodeId};
use crate::lifecycle::PendingOperation;
use crate::node_type::{NodeKind, NodeType, TypeCaps};

bitflags::bitflags! {
    /// Per-node bookkeeping flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub(crate) struct NodeFlags: u8 {
        /// The node or a descendant has a Loaded/Unloaded handler.
        const SUBTREE_HAS_LISTENER = 1 << 0;
        /// A walk is enumerating this node's render children.
        const RENDER_ITERATING = 1 << 1;
        /// A walk is enumerating this node's logical and floating children.
        const LOGICAL_ITERATING = 1 << 2;
        /// The node is connected to a live presentation source.
        const PRESENTATION_ROOT = 1 << 3;
        /// Between `begin_init` and `end_init`.
        const INITIALIZING = 1 << 4;
        /// `end_init` has completed at least once.
        const INITIALIZED = 1 << 5;
    }
}

/// Cached attached state of a node.
///
/// Only maintained for nodes whose subtree has a lifecycle listener; other
/// nodes report [`AttachState::Unknown`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum AttachState {
    /// Not tracked.
    #[default]
    Unknown,
    /// The last delivered notification was Loaded.
    Attached,
    /// The last delivered notification was Unloaded, or none was delivered yet.
    Detached,
}

pub(crate) struct Node {
    pub(crate) node_type: NodeType,
    pub(crate) flags: NodeFlags,
    pub(crate) render_parent: Option<NodeId>,
    pub(crate) logical_parent: Option<NodeId>,
    pub(crate) mentor: Option<NodeId>,
    pub(crate) render_children: SmallVec<[NodeId; 4]>,
    pub(crate) logical_children: SmallVec<[NodeId; 4]>,
    pub(crate) floating_children: SmallVec<[NodeId; 2]>,
    pub(crate) attach_state: AttachState,
    pub(crate) pending: Option<PendingOperation>,
    store: PropertyStore<NodeId>,
    templated_parent: Option<NodeId>,
    template_child_index: Option<ChildIndex>,
    template_name: Option<Arc<str>>,
    template_children: SmallVec<[(ChildIndex, NodeId); 4]>,
    text: String,
    definitions: SmallVec<[NodeId; 2]>,
    pub(crate) handlers: SmallVec<[(HandlerId, EventId, EventHandler); 2]>,
    active_rules: SmallVec<[u64; 4]>,
}

impl Node {
    fn new(id: NodeId, node_type: NodeType) -> Self {
        Self {
            node_type,
            flags: NodeFlags::empty(),
            render_parent: None,
            logical_parent: None,
            mentor: None,
            render_children: SmallVec::new(),
            logical_children: SmallVec::new(),
            floating_children: SmallVec::new(),
            attach_state: AttachState::Unknown,
            pending: None,
            store: PropertyStore::new(id),
            templated_parent: None,
            template_child_index: None,
            template_name: None,
            template_children: SmallVec::new(),
            text: String::new(),
            definitions: SmallVec::new(),
            handlers: SmallVec::new(),
            active_rules: SmallVec::new(),
        }
    }

    pub(crate) fn kind(&self) -> NodeKind {
        self.node_type.kind()
    }
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// An arena of scene nodes linked into a render tree and a logical tree.
///
/// Every node may have a render parent (visual nodes only), a logical parent,
/// and a mentor (an inheritance-context parent used when the other two are
/// absent, for example by floating popup content). The *effective parent* is
/// the first of those three that is set.
///
/// Structural changes that alter a node's effective parent notify the
/// lifecycle broadcaster, which keeps Loaded/Unloaded state consistent.
pub struct SceneTree {
    registry: Arc<PropertyRegistry>,
    config: SceneConfig,
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    live: usize,
    pub(crate) dispatcher: Box<dyn DeferredDispatch>,
    pub(crate) layout_callbacks: LayoutCallbacks,
    pub(crate) next_operation: u64,
    next_handler: u64,
}

impl fmt::Debug for SceneTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneTree")
            .field("live", &self.live)
            .field("config", &self.config)
            .field("layout_callbacks", &self.layout_callbacks.len())
            .finish_non_exhaustive()
    }
}

impl SceneTree {
    /// Creates an empty tree with the default configuration and a [`DispatchQueue`].
    #[must_use]
    pub fn new(registry: Arc<PropertyRegistry>) -> Self {
        Self::with_config(registry, SceneConfig::default())
    }

    /// Creates an empty tree with the given configuration.
    #[must_use]
    pub fn with_config(registry: Arc<PropertyRegistry>, config: SceneConfig) -> Self {
        Self {
            registry,
            config,
            slots: Vec::new(),
            free_list: Vec::new(),
            live: 0,
            dispatcher: Box::new(DispatchQueue::new()),
            layout_callbacks: LayoutCallbacks::default(),
            next_operation: 0,
            next_handler: 0,
        }
    }

    /// Replaces the deferred dispatcher.
    ///
    /// Work queued on the previous dispatcher is dropped with it.
    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: impl DeferredDispatch + 'static) -> Self {
        self.dispatcher = Box::new(dispatcher);
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Returns the property registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<PropertyRegistry> {
        &self.registry
    }

    /// Returns the deferred dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &dyn DeferredDispatch {
        self.dispatcher.as_ref()
    }

    /// Returns the number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns `true` if the tree has no live nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub(crate) fn node(&self, id: NodeId) -> TreeResult<&Node> {
        self.slots
            .get(id.idx())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_ref())
            .ok_or(TreeError::StaleNode(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> TreeResult<&mut Node> {
        self.slots
            .get_mut(id.idx())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_mut())
            .ok_or(TreeError::StaleNode(id))
    }

    /// Returns `true` if `id` refers to a live node.
    #[must_use]
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.node(id).is_ok()
    }

    /// Creates a detached node of the given type.
    pub fn create_node(&mut self, node_type: &NodeType) -> NodeId {
        let id = if let Some(idx) = self.free_list.pop() {
            let slot = &mut self.slots[idx as usize];
            let id = NodeId::new(idx, slot.generation);
            slot.node = Some(Node::new(id, node_type.clone()));
            id
        } else {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "trees never approach u32::MAX nodes"
            )]
            let id = NodeId::new(self.slots.len() as u32, 0);
            self.slots.push(Slot {
                generation: 0,
                node: Some(Node::new(id, node_type.clone())),
            });
            id
        };
        self.live += 1;
        trace!(?id, node_type = node_type.name(), "created node");
        id
    }

    /// Destroys a node.
    ///
    /// The node is first detached from its parents and its children are
    /// orphaned, with the usual lifecycle notifications. A template child is
    /// dropped from its container's table. Any pending lifecycle operation on
    /// the node is cancelled.
    pub fn destroy_node(&mut self, id: NodeId) -> TreeResult<()> {
        let node = self.node(id)?;
        let render_parent = node.render_parent;
        let logical_parent = node.logical_parent;
        let floating_owner = node
            .mentor
            .filter(|m| self.floating_children(*m).contains(&id));

        if let Some(parent) = render_parent {
            self.remove_render_child(parent, id)?;
        }
        if let Some(parent) = logical_parent {
            self.remove_logical_child(parent, id)?;
        }
        if let Some(owner) = floating_owner {
            self.remove_floating_child(owner, id)?;
        }

        let node = self.node(id)?;
        let render: SmallVec<[NodeId; 4]> = node.render_children.clone();
        let logical: SmallVec<[NodeId; 4]> = node.logical_children.clone();
        let floating: SmallVec<[NodeId; 2]> = node.floating_children.clone();
        for child in render {
            self.remove_render_child(id, child)?;
        }
        for child in logical {
            self.remove_logical_child(id, child)?;
        }
        for child in floating {
            self.remove_floating_child(id, child)?;
        }

        if let Some(container) = self.node(id)?.templated_parent
            && let Ok(owner) = self.node_mut(container)
        {
            owner.template_children.retain(|(_, child)| *child != id);
        }

        self.cancel_pending(id);
        let slot = &mut self.slots[id.idx()];
        slot.node = None;
        slot.generation = slot.generation.wrapping_add(1);
        #[expect(
            clippy::cast_possible_truncation,
            reason = "slot indices originate from u32"
        )]
        self.free_list.push(id.idx() as u32);
        self.live -= 1;
        debug!(?id, "destroyed node");
        Ok(())
    }

    // --- structure: queries ---

    /// Returns the node's type.
    #[must_use]
    pub fn node_type(&self, id: NodeId) -> Option<&NodeType> {
        self.node(id).ok().map(|n| &n.node_type)
    }

    /// Returns the node's kind.
    #[must_use]
    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.node(id).ok().map(Node::kind)
    }

    /// Returns the render parent.
    #[must_use]
    pub fn render_parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).ok().and_then(|n| n.render_parent)
    }

    /// Returns the logical parent.
    #[must_use]
    pub fn logical_parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).ok().and_then(|n| n.logical_parent)
    }

    /// Returns the mentor (inheritance-context parent).
    #[must_use]
    pub fn mentor(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)
            .ok()
            .and_then(|n| n.mentor)
            .filter(|m| self.is_alive(*m))
    }

    /// Returns the effective parent: render parent, else logical parent, else mentor.
    #[must_use]
    pub fn effective_parent(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id).ok()?;
        node.render_parent
            .or(node.logical_parent)
            .or_else(|| node.mentor.filter(|m| self.is_alive(*m)))
    }

    /// Returns the render children in order.
    #[must_use]
    pub fn render_children(&self, id: NodeId) -> &[NodeId] {
        self.node(id)
            .map(|n| n.render_children.as_slice())
            .unwrap_or_default()
    }

    /// Returns the logical children in order.
    #[must_use]
    pub fn logical_children(&self, id: NodeId) -> &[NodeId] {
        self.node(id)
            .map(|n| n.logical_children.as_slice())
            .unwrap_or_default()
    }

    /// Returns the floating (popup) children in order.
    #[must_use]
    pub fn floating_children(&self, id: NodeId) -> &[NodeId] {
        self.node(id)
            .map(|n| n.floating_children.as_slice())
            .unwrap_or_default()
    }

    // --- structure: mutation ---

    fn ensure_not_iterating(&self, id: NodeId, flag: NodeFlags) -> TreeResult<()> {
        if self.node(id)?.flags.intersects(flag) {
            debug!(?id, "structural mutation rejected during walk");
            return Err(TreeError::IterationInProgress { node: id });
        }
        Ok(())
    }

    fn ensure_visual(&self, id: NodeId) -> TreeResult<()> {
        if self.node(id)?.kind().is_visual() {
            Ok(())
        } else {
            Err(TreeError::NotVisual { node: id })
        }
    }

    fn require_caps(&self, id: NodeId, caps: TypeCaps, what: &'static str) -> TreeResult<()> {
        let ty = &self.node(id)?.node_type;
        if ty.capabilities().contains(caps) {
            Ok(())
        } else {
            Err(TreeError::Unsupported {
                node: id,
                type_name: ty.name(),
                what,
            })
        }
    }

    /// Applies an infallible edit and reports any effective-parent change.
    fn restructure(&mut self, child: NodeId, edit: impl FnOnce(&mut Self)) -> TreeResult<()> {
        let before = self.effective_parent(child);
        edit(self);
        let after = self.effective_parent(child);
        if before != after {
            trace!(?child, ?before, ?after, "effective parent changed");
            self.on_structural_change(child, before, after)?;
        }
        Ok(())
    }

    /// Appends `child` to `parent`'s render children.
    pub fn append_render_child(&mut self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        self.ensure_visual(parent)?;
        self.ensure_visual(child)?;
        self.ensure_not_iterating(parent, NodeFlags::RENDER_ITERATING)?;
        if self.node(child)?.render_parent.is_some() {
            return Err(TreeError::AlreadyParented {
                node: child,
                relation: "render",
            });
        }
        self.restructure(child, |tree| {
            if let Ok(p) = tree.node_mut(parent) {
                p.render_children.push(child);
            }
            if let Ok(c) = tree.node_mut(child) {
                c.render_parent = Some(parent);
            }
        })
    }

    /// Removes `child` from `parent`'s render children.
    pub fn remove_render_child(&mut self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        self.ensure_not_iterating(parent, NodeFlags::RENDER_ITERATING)?;
        if self.node(child)?.render_parent != Some(parent) {
            return Err(TreeError::NotAChild {
                parent,
                child,
                relation: "render",
            });
        }
        self.restructure(child, |tree| {
            if let Ok(p) = tree.node_mut(parent) {
                p.render_children.retain(|c| *c != child);
            }
            if let Ok(c) = tree.node_mut(child) {
                c.render_parent = None;
            }
        })
    }

    /// Appends `child` to `parent`'s logical children.
    pub fn append_logical_child(&mut self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        self.ensure_not_iterating(parent, NodeFlags::LOGICAL_ITERATING)?;
        if self.node(child)?.logical_parent.is_some() {
            return Err(TreeError::AlreadyParented {
                node: child,
                relation: "logical",
            });
        }
        self.restructure(child, |tree| {
            if let Ok(p) = tree.node_mut(parent) {
                p.logical_children.push(child);
            }
            if let Ok(c) = tree.node_mut(child) {
                c.logical_parent = Some(parent);
            }
        })
    }

    /// Removes `child` from `parent`'s logical children.
    pub fn remove_logical_child(&mut self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        self.ensure_not_iterating(parent, NodeFlags::LOGICAL_ITERATING)?;
        if self.node(child)?.logical_parent != Some(parent) {
            return Err(TreeError::NotAChild {
                parent,
                child,
                relation: "logical",
            });
        }
        self.restructure(child, |tree| {
            if let Ok(p) = tree.node_mut(parent) {
                p.logical_children.retain(|c| *c != child);
            }
            if let Ok(c) = tree.node_mut(child) {
                c.logical_parent = None;
            }
        })
    }

    /// Adds `child` through the generic add-child path.
    ///
    /// The parent's type must have [`TypeCaps::ADD_CHILD`]. Visual children of
    /// visual parents join both trees; anything else joins the logical tree.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        self.require_caps(parent, TypeCaps::ADD_CHILD, "children")?;
        let both_visual =
            self.node(parent)?.kind().is_visual() && self.node(child)?.kind().is_visual();
        if both_visual {
            self.append_render_child(parent, child)?;
        }
        self.append_logical_child(parent, child)
    }

    /// Removes `child` from whichever of `parent`'s child lists contain it.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        let node = self.node(child)?;
        let in_render = node.render_parent == Some(parent);
        let in_logical = node.logical_parent == Some(parent);
        if !in_render && !in_logical {
            return Err(TreeError::NotAChild {
                parent,
                child,
                relation: "logical",
            });
        }
        if in_logical {
            self.remove_logical_child(parent, child)?;
        }
        if in_render {
            self.remove_render_child(parent, child)?;
        }
        Ok(())
    }

    /// Registers `child` as floating (popup) content owned by `owner`.
    ///
    /// Floating content has no render parent; `owner` becomes its mentor.
    pub fn add_floating_child(&mut self, owner: NodeId, child: NodeId) -> TreeResult<()> {
        self.ensure_visual(child)?;
        self.ensure_not_iterating(owner, NodeFlags::LOGICAL_ITERATING)?;
        let node = self.node(child)?;
        if node.render_parent.is_some() {
            return Err(TreeError::AlreadyParented {
                node: child,
                relation: "render",
            });
        }
        if node.mentor.is_some() {
            return Err(TreeError::AlreadyParented {
                node: child,
                relation: "mentor",
            });
        }
        self.restructure(child, |tree| {
            if let Ok(o) = tree.node_mut(owner) {
                o.floating_children.push(child);
            }
            if let Ok(c) = tree.node_mut(child) {
                c.mentor = Some(owner);
            }
        })
    }

    /// Removes floating content from `owner`.
    pub fn remove_floating_child(&mut self, owner: NodeId, child: NodeId) -> TreeResult<()> {
        self.ensure_not_iterating(owner, NodeFlags::LOGICAL_ITERATING)?;
        if !self.node(owner)?.floating_children.contains(&child) {
            return Err(TreeError::NotAChild {
                parent: owner,
                child,
                relation: "floating",
            });
        }
        self.restructure(child, |tree| {
            if let Ok(o) = tree.node_mut(owner) {
                o.floating_children.retain(|c| *c != child);
            }
            if let Ok(c) = tree.node_mut(child) {
                c.mentor = None;
            }
        })
    }

    /// Sets or clears the node's mentor.
    pub fn set_mentor(&mut self, id: NodeId, mentor: Option<NodeId>) -> TreeResult<()> {
        self.node(id)?;
        if let Some(m) = mentor {
            self.node(m)?;
        }
        self.restructure(id, |tree| {
            if let Ok(n) = tree.node_mut(id) {
                n.mentor = mentor;
            }
        })
    }

    // --- content ---

    /// Appends literal text content. The type must have [`TypeCaps::ADD_TEXT`].
    pub fn append_text(&mut self, id: NodeId, text: &str) -> TreeResult<()> {
        self.require_caps(id, TypeCaps::ADD_TEXT, "text")?;
        self.node_mut(id)?.text.push_str(text);
        Ok(())
    }

    /// Returns the node's literal text content.
    #[must_use]
    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.node(id).ok().map(|n| n.text.as_str())
    }

    /// Adds a row/column definition to a grid-like host.
    ///
    /// The definition also becomes a logical child of the host.
    pub fn add_definition(&mut self, host: NodeId, definition: NodeId) -> TreeResult<()> {
        self.require_caps(host, TypeCaps::DEFINITION_HOST, "layout definitions")?;
        self.require_caps(definition, TypeCaps::LAYOUT_DEFINITION, "a definition host")?;
        self.append_logical_child(host, definition)?;
        self.node_mut(host)?.definitions.push(definition);
        Ok(())
    }

    /// Returns the host's definitions in order.
    #[must_use]
    pub fn definitions(&self, host: NodeId) -> &[NodeId] {
        self.node(host)
            .map(|n| n.definitions.as_slice())
            .unwrap_or_default()
    }

    // --- initialization ---

    /// Marks the start of batched initialization.
    pub fn begin_init(&mut self, id: NodeId) -> TreeResult<()> {
        self.node_mut(id)?.flags.insert(NodeFlags::INITIALIZING);
        Ok(())
    }

    /// Ends batched initialization and raises [`EventId::INITIALIZED`].
    pub fn end_init(&mut self, id: NodeId) -> TreeResult<()> {
        let node = self.node_mut(id)?;
        node.flags.remove(NodeFlags::INITIALIZING);
        node.flags.insert(NodeFlags::INITIALIZED);
        self.raise_event(id, EventId::INITIALIZED)?;
        Ok(())
    }

    /// Returns `true` while between [`begin_init`](Self::begin_init) and [`end_init`](Self::end_init).
    #[must_use]
    pub fn is_initializing(&self, id: NodeId) -> bool {
        self.node(id)
            .is_ok_and(|n| n.flags.contains(NodeFlags::INITIALIZING))
    }

    /// Returns `true` once [`end_init`](Self::end_init) has run.
    #[must_use]
    pub fn is_initialized(&self, id: NodeId) -> bool {
        self.node(id)
            .is_ok_and(|n| n.flags.contains(NodeFlags::INITIALIZED))
    }

    // --- properties ---

    /// Returns the effective value of a typed property, or its default.
    ///
    /// Returns `None` for stale nodes and unregistered properties.
    #[must_use]
    pub fn get_value<T: PropertyValue>(&self, id: NodeId, property: Property<T>) -> Option<T> {
        let node = self.node(id).ok()?;
        if let Some((value, _)) = node.store.effective_erased(property.id())
            && let Some(value) = value.downcast_ref::<T>()
        {
            return Some(value.clone());
        }
        self.registry
            .get_metadata(property)
            .map(|metadata| metadata.default_value().clone())
    }

    /// Returns the effective erased value of a property, or its default.
    #[must_use]
    pub fn get_erased(&self, id: NodeId, property: PropertyId) -> Option<ErasedValue> {
        let node = self.node(id).ok()?;
        match node.store.effective_erased(property) {
            Some((value, _)) => Some(value.clone()),
            None => self.registry.default_value(property),
        }
    }

    /// Returns the layer that supplies the effective value, if any layer does.
    #[must_use]
    pub fn value_source(&self, id: NodeId, property: PropertyId) -> Option<ValueLayer> {
        self.node(id).ok()?.store.effective_layer(property)
    }

    /// Returns the value stored in one layer.
    #[must_use]
    pub fn layer_value(
        &self,
        id: NodeId,
        property: PropertyId,
        layer: ValueLayer,
    ) -> Option<&ErasedValue> {
        self.node(id).ok()?.store.get_erased(property, layer)
    }

    /// Returns the node's property store.
    #[must_use]
    pub fn property_store(&self, id: NodeId) -> Option<&PropertyStore<NodeId>> {
        self.node(id).ok().map(|n| &n.store)
    }

    /// Sets a local value, applying the property's validation and coercion.
    pub fn set_value<T: PropertyValue>(
        &mut self,
        id: NodeId,
        property: Property<T>,
        value: T,
    ) -> TreeResult<()> {
        let metadata = self
            .registry
            .get_metadata(property)
            .ok_or(TreeError::UnknownProperty(property.id()))?;
        if metadata.read_only() {
            return Err(TreeError::ReadOnlyProperty {
                property: property.id(),
            });
        }
        if !metadata.is_valid(&value) {
            return Err(TreeError::InvalidValue {
                property: property.id(),
                type_name: core::any::type_name::<T>(),
            });
        }
        let value = ErasedValue::new(metadata.coerce(value));
        self.node_mut(id)?
            .store
            .set_erased(property.id(), ValueLayer::Local, value);
        Ok(())
    }

    /// Clears the local value.
    pub fn clear_value(&mut self, id: NodeId, property: PropertyId) -> TreeResult<Option<ErasedValue>> {
        Ok(self.node_mut(id)?.store.clear(property, ValueLayer::Local))
    }

    /// Writes an erased value into one layer.
    ///
    /// The value is checked against the property's type and validator.
    /// Read-only properties may be written through the non-local layers.
    pub fn set_layer_value(
        &mut self,
        id: NodeId,
        property: PropertyId,
        layer: ValueLayer,
        value: ErasedValue,
    ) -> TreeResult<Option<ErasedValue>> {
        if self.registry.get(property).is_none() {
            return Err(TreeError::UnknownProperty(property));
        }
        if !self.registry.is_valid_value(property, &value) {
            return Err(TreeError::InvalidValue {
                property,
                type_name: value.type_name(),
            });
        }
        Ok(self.node_mut(id)?.store.set_erased(property, layer, value))
    }

    /// Clears one layer's value for a property.
    pub fn clear_layer_value(
        &mut self,
        id: NodeId,
        property: PropertyId,
        layer: ValueLayer,
    ) -> TreeResult<Option<ErasedValue>> {
        Ok(self.node_mut(id)?.store.clear(property, layer))
    }

    /// Clears every value of one layer, returning the affected properties.
    pub fn clear_layer(
        &mut self,
        id: NodeId,
        layer: ValueLayer,
    ) -> TreeResult<SmallVec<[PropertyId; 4]>> {
        Ok(self.node_mut(id)?.store.clear_layer(layer))
    }

    // --- templates ---

    /// Returns the container whose template created this node.
    #[must_use]
    pub fn templated_parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).ok().and_then(|n| n.templated_parent)
    }

    /// Returns the node's index within its templated parent's template.
    #[must_use]
    pub fn template_child_index(&self, id: NodeId) -> Option<ChildIndex> {
        self.node(id).ok().and_then(|n| n.template_child_index)
    }

    /// Returns the name the node was given by its templated parent's template.
    #[must_use]
    pub fn template_name(&self, id: NodeId) -> Option<&str> {
        self.node(id).ok().and_then(|n| n.template_name.as_deref())
    }

    /// Records `child` as the template child named `name` at `index` of `container`.
    pub fn register_template_child(
        &mut self,
        container: NodeId,
        index: ChildIndex,
        name: Arc<str>,
        child: NodeId,
    ) -> TreeResult<()> {
        self.node(container)?;
        let node = self.node_mut(child)?;
        node.templated_parent = Some(container);
        node.template_child_index = Some(index);
        node.template_name = Some(name);
        let table = &mut self.node_mut(container)?.template_children;
        match table.binary_search_by_key(&index, |(i, _)| *i) {
            Ok(pos) => table[pos].1 = child,
            Err(pos) => table.insert(pos, (index, child)),
        }
        Ok(())
    }

    /// Resolves a template child index against `container`.
    ///
    /// [`ChildIndex::SELF`] resolves to the container itself.
    #[must_use]
    pub fn template_child(&self, container: NodeId, index: ChildIndex) -> Option<NodeId> {
        let node = self.node(container).ok()?;
        if index.is_self() {
            return Some(container);
        }
        let table = &node.template_children;
        table
            .binary_search_by_key(&index, |(i, _)| *i)
            .ok()
            .map(|pos| table[pos].1)
            .filter(|child| self.is_alive(*child))
    }

    /// Resolves a template child of `container` by name.
    #[must_use]
    pub fn template_child_by_name(&self, container: NodeId, name: &str) -> Option<NodeId> {
        self.template_children(container)
            .iter()
            .map(|(_, child)| *child)
            .find(|child| self.template_name(*child) == Some(name))
    }

    /// Returns the registered template children of `container`, sorted by index.
    #[must_use]
    pub fn template_children(&self, container: NodeId) -> &[(ChildIndex, NodeId)] {
        self.node(container)
            .map(|n| n.template_children.as_slice())
            .unwrap_or_default()
    }

    /// Forgets every template child of `container`, returning them.
    pub fn clear_template_children(
        &mut self,
        container: NodeId,
    ) -> TreeResult<SmallVec<[(ChildIndex, NodeId); 4]>> {
        let children = core::mem::take(&mut self.node_mut(container)?.template_children);
        for (_, child) in &children {
            if let Ok(node) = self.node_mut(*child) {
                node.templated_parent = None;
                node.template_child_index = None;
                node.template_name = None;
            }
        }
        Ok(children)
    }

    // --- conditional rule activity ---

    /// Returns `true` if the rule identified by `key` is active on the node.
    #[must_use]
    pub fn is_rule_active(&self, id: NodeId, key: u64) -> bool {
        self.node(id).is_ok_and(|n| n.active_rules.contains(&key))
    }

    /// Marks a rule active or inactive. Returns `true` if the state changed.
    pub fn set_rule_active(&mut self, id: NodeId, key: u64, active: bool) -> TreeResult<bool> {
        let rules = &mut self.node_mut(id)?.active_rules;
        let position = rules.iter().position(|k| *k == key);
        Ok(match (position, active) {
            (None, true) => {
                rules.push(key);
                true
            }
            (Some(pos), false) => {
                rules.swap_remove(pos);
                true
            }
            _ => false,
        })
    }

    /// Marks every rule inactive, returning the keys that were active.
    pub fn clear_active_rules(&mut self, id: NodeId) -> TreeResult<SmallVec<[u64; 4]>> {
        Ok(core::mem::take(&mut self.node_mut(id)?.active_rules))
    }

    // --- events ---

    /// Registers a handler for `event` on the node.
    ///
    /// Registering a Loaded or Unloaded handler marks the node's ancestors as
    /// having a listener, so lifecycle broadcasts reach it.
    pub fn add_handler<F>(&mut self, id: NodeId, event: EventId, handler: F) -> TreeResult<HandlerId>
    where
        F: Fn(&mut Self, &mut EventArgs) + Send + Sync + 'static,
    {
        self.add_shared_handler(id, event, Arc::new(handler))
    }

    /// Registers an already shared handler.
    pub fn add_shared_handler(
        &mut self,
        id: NodeId,
        event: EventId,
        handler: EventHandler,
    ) -> TreeResult<HandlerId> {
        let handler_id = HandlerId(self.next_handler);
        self.node_mut(id)?.handlers.push((handler_id, event, handler));
        self.next_handler += 1;
        if event.is_lifecycle() {
            self.update_listener_flag(id, true)?;
        }
        Ok(handler_id)
    }

    /// Removes a handler. Returns `false` if it was not registered on the node.
    pub fn remove_handler(&mut self, id: NodeId, handler: HandlerId) -> TreeResult<bool> {
        let handlers = &mut self.node_mut(id)?.handlers;
        let Some(pos) = handlers.iter().position(|(h, _, _)| *h == handler) else {
            return Ok(false);
        };
        let (_, event, _) = handlers.remove(pos);
        if event.is_lifecycle() {
            self.update_listener_flag(id, false)?;
        }
        Ok(true)
    }

    /// Returns `true` if the node has a handler for `event`.
    #[must_use]
    pub fn has_handler(&self, id: NodeId, event: EventId) -> bool {
        self.node(id)
            .is_ok_and(|n| n.handlers.iter().any(|(_, e, _)| *e == event))
    }

    /// Invokes the node's handlers for `event` in registration order.
    ///
    /// Handlers added or removed by a running handler take effect on the next raise.
    pub fn raise_event(&mut self, id: NodeId, event: EventId) -> TreeResult<EventArgs> {
        let handlers: SmallVec<[EventHandler; 4]> = self
            .node(id)?
            .handlers
            .iter()
            .filter(|(_, e, _)| *e == event)
            .map(|(_, _, h)| Arc::clone(h))
            .collect();
        let mut args = EventArgs::new(event, id);
        for handler in handlers {
            handler(self, &mut args);
        }
        Ok(args)
    }

    // --- flags used by walks and the broadcaster ---

    pub(crate) fn flags(&self, id: NodeId) -> NodeFlags {
        self.node(id).map_or(NodeFlags::empty(), |n| n.flags)
    }

    pub(crate) fn set_flags(&mut self, id: NodeId, flags: NodeFlags, on: bool) {
        if let Ok(node) = self.node_mut(id) {
            node.flags.set(flags, on);
        }
    }
}
