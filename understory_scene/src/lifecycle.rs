// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Attach/detach (Loaded/Unloaded) lifecycle broadcasting.
//!
//! When a node's effective parent appears or disappears, the subtree under
//! it may become attached to (or detached from) a live presentation root.
//! Rather than notifying immediately, the broadcaster schedules one
//! [`PendingOperation`] per node. The operation is registered with both the
//! deferred dispatcher and the at-layout-time callback list; whichever runs
//! first walks the subtree and cancels the other.
//!
//! Each node whose subtree contains a Loaded/Unloaded handler caches its
//! [`AttachState`]. A broadcast only notifies nodes whose cached state
//! differs from the broadcast direction, so repeated broadcasts are no-ops,
//! and it prunes subtrees with no listeners.
//!
//! A node holds at most one pending operation. Scheduling the opposite
//! direction replaces it:
//!
//! - Re-attaching under the parent it was detached from cancels a pending
//!   detach and notifies nothing.
//! - Attaching under a different parent first delivers the pending detach,
//!   then schedules the attach.
//! - Detaching a node whose attach never ran cancels the attach.

use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::dispatch::{DeferredBroadcast, DispatchHandle, DispatchStatus, LayoutCallbackId};
use crate::error::{TreeError, TreeResult};
use crate::event::EventId;
use crate::id::NodeId;
use crate::tree::{AttachState, NodeFlags, SceneTree};
use crate::walk::{DescendantsWalker, WalkPriority};

/// Direction of a lifecycle broadcast.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleKind {
    /// The subtree became attached to a live presentation root.
    Loaded,
    /// The subtree was detached from its presentation root.
    Unloaded,
}

impl LifecycleKind {
    /// Returns the event raised for this direction.
    #[must_use]
    pub const fn event(self) -> EventId {
        match self {
            Self::Loaded => EventId::LOADED,
            Self::Unloaded => EventId::UNLOADED,
        }
    }

    /// Returns the opposite direction.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Loaded => Self::Unloaded,
            Self::Unloaded => Self::Loaded,
        }
    }

    const fn target_state(self) -> AttachState {
        match self {
            Self::Loaded => AttachState::Attached,
            Self::Unloaded => AttachState::Detached,
        }
    }
}

/// Identifies one scheduled lifecycle operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct OperationId(pub(crate) u64);

/// A lifecycle broadcast scheduled on a node but not yet delivered.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PendingOperation {
    pub(crate) id: OperationId,
    pub(crate) kind: LifecycleKind,
    pub(crate) dispatch: DispatchHandle,
    pub(crate) layout: LayoutCallbackId,
    pub(crate) parent: Option<NodeId>,
}

impl PendingOperation {
    /// Returns the operation id.
    #[must_use]
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Returns the broadcast direction.
    #[must_use]
    pub fn kind(&self) -> LifecycleKind {
        self.kind
    }

    /// Returns the deferred dispatcher handle.
    #[must_use]
    pub fn dispatch_handle(&self) -> DispatchHandle {
        self.dispatch
    }

    /// Returns the parent the node was attached to (for Loaded) or detached
    /// from (for Unloaded) when the operation was scheduled.
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

/// One delivered notification, in delivery order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    /// The notified node.
    pub node: NodeId,
    /// The notification direction.
    pub kind: LifecycleKind,
}

type Route = Vec<Notification>;

impl SceneTree {
    /// Returns the node's cached attached state.
    #[must_use]
    pub fn attach_state(&self, id: NodeId) -> AttachState {
        self.node(id).map_or(AttachState::Unknown, |n| n.attach_state)
    }

    /// Returns `true` if the node or a descendant has a Loaded/Unloaded handler.
    #[must_use]
    pub fn subtree_has_listener(&self, id: NodeId) -> bool {
        self.flags(id).contains(NodeFlags::SUBTREE_HAS_LISTENER)
    }

    /// Returns the node's pending lifecycle operation.
    #[must_use]
    pub fn pending_operation(&self, id: NodeId) -> Option<&PendingOperation> {
        self.node(id).ok().and_then(|n| n.pending.as_ref())
    }

    /// Returns `true` if the node is flagged as a presentation root.
    #[must_use]
    pub fn is_presentation_root(&self, id: NodeId) -> bool {
        self.flags(id).contains(NodeFlags::PRESENTATION_ROOT)
    }

    /// Returns `true` if the node is attached to a live presentation root.
    ///
    /// Nodes with a cached state answer from the cache; others defer to the
    /// nearest ancestor that knows, ending at a presentation root.
    #[must_use]
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        for _ in 0..=self.config().max_tree_depth {
            let Ok(node) = self.node(current) else {
                return false;
            };
            if node.flags.contains(NodeFlags::SUBTREE_HAS_LISTENER)
                && node.attach_state != AttachState::Unknown
            {
                return node.attach_state == AttachState::Attached;
            }
            if node.flags.contains(NodeFlags::PRESENTATION_ROOT) {
                return true;
            }
            match self.effective_parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
        warn!(?id, "parent chain exceeded the maximum tree depth");
        false
    }

    fn parent_attached(&self, id: NodeId) -> bool {
        if self.is_presentation_root(id) {
            return true;
        }
        self.effective_parent(id)
            .is_some_and(|parent| self.is_attached(parent))
    }

    /// Connects or disconnects a node to a live presentation source.
    ///
    /// Connecting schedules a Loaded broadcast for the node's subtree;
    /// disconnecting schedules an Unloaded broadcast.
    pub fn set_presentation_root(&mut self, id: NodeId, connected: bool) -> TreeResult<()> {
        let was = self.is_presentation_root(id);
        self.node(id)?;
        if was == connected {
            return Ok(());
        }
        debug!(?id, connected, "presentation root changed");
        self.set_flags(id, NodeFlags::PRESENTATION_ROOT, connected);
        if !self.subtree_has_listener(id) {
            return Ok(());
        }
        if connected {
            self.fire_attached(id, None)
        } else {
            self.fire_detached(id, None)
        }
    }

    /// Reacts to a node's effective parent changing from `old` to `new`.
    ///
    /// The tree's own mutation methods already call this. Hosts that move
    /// nodes through other means call it directly. A change between two
    /// non-empty parents is handled as a detach followed by an attach.
    pub fn on_structural_change(
        &mut self,
        id: NodeId,
        old: Option<NodeId>,
        new: Option<NodeId>,
    ) -> TreeResult<()> {
        if !self.subtree_has_listener(id) {
            return Ok(());
        }
        if let Some(old) = old {
            self.update_listener_flag(old, false)?;
            if self.is_attached(old) {
                self.fire_detached(id, Some(old))?;
            }
        }
        if let Some(new) = new {
            self.update_listener_flag(new, true)?;
            if self.is_attached(new) {
                self.fire_attached(id, Some(new))?;
            }
        }
        Ok(())
    }

    fn fire_attached(&mut self, id: NodeId, parent: Option<NodeId>) -> TreeResult<()> {
        match self.pending_operation(id).copied() {
            Some(pending) if pending.kind == LifecycleKind::Loaded => {}
            Some(pending) if pending.parent == parent => {
                trace!(?id, "re-attached to the same parent; pending detach cancelled");
                self.cancel_pending(id);
            }
            Some(_) => {
                self.cancel_pending(id);
                self.broadcast(id, LifecycleKind::Unloaded)?;
                self.schedule_pending(id, LifecycleKind::Loaded, parent);
            }
            None => self.schedule_pending(id, LifecycleKind::Loaded, parent),
        }
        Ok(())
    }

    fn fire_detached(&mut self, id: NodeId, parent: Option<NodeId>) -> TreeResult<()> {
        match self.pending_operation(id).copied() {
            Some(pending) if pending.kind == LifecycleKind::Unloaded => {}
            Some(_) => {
                trace!(?id, "detached before attach ran; pending attach cancelled");
                self.cancel_pending(id);
            }
            None => self.schedule_pending(id, LifecycleKind::Unloaded, parent),
        }
        Ok(())
    }

    /// Schedules a broadcast for `id`, replacing any pending operation.
    pub fn schedule_pending(&mut self, id: NodeId, kind: LifecycleKind, parent: Option<NodeId>) {
        if !self.is_alive(id) {
            return;
        }
        self.cancel_pending(id);
        let operation = OperationId(self.next_operation);
        self.next_operation += 1;
        let work = DeferredBroadcast {
            node: id,
            kind,
            operation,
        };
        let priority = self.config().lifecycle_priority;
        let dispatch = self.dispatcher.schedule(priority, work);
        let layout = self.layout_callbacks.push(work);
        if let Ok(node) = self.node_mut(id) {
            node.pending = Some(PendingOperation {
                id: operation,
                kind,
                dispatch,
                layout,
                parent,
            });
        }
        debug!(?id, ?kind, ?operation, "scheduled lifecycle broadcast");
    }

    /// Cancels the node's pending operation, aborting its queued work.
    ///
    /// Returns the cancelled operation. Cancelling twice is a no-op.
    pub fn cancel_pending(&mut self, id: NodeId) -> Option<PendingOperation> {
        let pending = self.node_mut(id).ok()?.pending.take()?;
        if self.dispatcher.status(pending.dispatch) == DispatchStatus::Pending {
            self.dispatcher.abort(pending.dispatch);
        }
        self.layout_callbacks.remove(pending.layout);
        trace!(?id, kind = ?pending.kind, "cancelled lifecycle broadcast");
        Some(pending)
    }

    /// Delivers one unit of deferred work if it is still current.
    ///
    /// Work for destroyed nodes or superseded operations is ignored.
    pub fn run_pending(&mut self, work: DeferredBroadcast) -> TreeResult<Vec<Notification>> {
        let current = self
            .pending_operation(work.node)
            .is_some_and(|pending| pending.id == work.operation);
        if !current {
            return Ok(Vec::new());
        }
        self.cancel_pending(work.node);
        if work.kind == LifecycleKind::Loaded && !self.parent_attached(work.node) {
            return Ok(Vec::new());
        }
        self.broadcast(work.node, work.kind)
    }

    /// Runs every queued at-layout-time callback, including ones queued meanwhile.
    pub fn run_layout_callbacks(&mut self) -> TreeResult<Vec<Notification>> {
        let mut delivered = Vec::new();
        loop {
            let batch = self.layout_callbacks.take();
            if batch.is_empty() {
                break;
            }
            for (_, work) in batch {
                delivered.extend(self.run_pending(work)?);
            }
        }
        Ok(delivered)
    }

    /// Drains the deferred dispatcher.
    pub fn run_deferred(&mut self) -> TreeResult<Vec<Notification>> {
        let mut delivered = Vec::new();
        while let Some((_, work)) = self.dispatcher.next_ready() {
            delivered.extend(self.run_pending(work)?);
        }
        Ok(delivered)
    }

    /// Broadcasts `kind` to the subtree under `root` immediately.
    ///
    /// Every listening node whose cached state differs from `kind` is
    /// updated and then notified, in walk order, after the walk completes.
    /// Pending operations covered by the walk are cancelled. Returns the
    /// notifications delivered.
    pub fn broadcast(&mut self, root: NodeId, kind: LifecycleKind) -> TreeResult<Vec<Notification>> {
        let mut route = Route::new();
        self.collect_route(root, kind, &mut route)?;
        debug!(?root, ?kind, notified = route.len(), "lifecycle broadcast");
        for notification in &route {
            if self.is_alive(notification.node) {
                self.raise_event(notification.node, notification.kind.event())?;
            }
        }
        Ok(route)
    }

    fn collect_route(&mut self, root: NodeId, kind: LifecycleKind, route: &mut Route) -> TreeResult<()> {
        let mut failure = None;
        DescendantsWalker::new(WalkPriority::RenderFirst).start_walk(
            self,
            root,
            false,
            |tree, node, _| {
                if node != root
                    && let Some(pending) = tree.pending_operation(node).copied()
                {
                    tree.cancel_pending(node);
                    let stale_detach = kind == LifecycleKind::Loaded
                        && pending.kind == LifecycleKind::Unloaded
                        && pending.parent != tree.effective_parent(node);
                    if stale_detach
                        && let Err(error) = tree.collect_route(node, LifecycleKind::Unloaded, route)
                    {
                        failure = Some(error);
                        return false;
                    }
                }
                if !tree.subtree_has_listener(node) {
                    return false;
                }
                let target = kind.target_state();
                if tree.attach_state(node) != target {
                    if let Ok(entry) = tree.node_mut(node) {
                        entry.attach_state = target;
                    }
                    route.push(Notification { node, kind });
                }
                true
            },
        )?;
        failure.map_or(Ok(()), Err)
    }

    /// Recomputes the listener flag from `id` upward.
    ///
    /// When `adding`, flags are set until an ancestor already has one and the
    /// newly flagged nodes seed their cached state from their parent, top-down.
    /// When removing, flags are cleared until a node still has a listener in
    /// its own handlers or among its children.
    pub fn update_listener_flag(&mut self, id: NodeId, adding: bool) -> TreeResult<()> {
        let limit = self.config().max_tree_depth;
        let mut chain: SmallVec<[NodeId; 16]> = SmallVec::new();
        let mut current = Some(id);
        while let Some(node) = current {
            if !self.is_alive(node) {
                break;
            }
            let has = self.subtree_has_listener(node);
            if adding == has || (!adding && self.has_own_listener(node)) {
                break;
            }
            if chain.len() >= limit {
                warn!(?id, limit, "listener propagation exceeded the maximum tree depth");
                return Err(TreeError::TreeLoop { limit });
            }
            self.set_flags(node, NodeFlags::SUBTREE_HAS_LISTENER, adding);
            chain.push(node);
            current = self.effective_parent(node);
        }

        if adding {
            for &node in chain.iter().rev() {
                let loading = self
                    .pending_operation(node)
                    .is_some_and(|p| p.kind == LifecycleKind::Loaded);
                let state = if !loading && self.parent_attached(node) {
                    AttachState::Attached
                } else {
                    AttachState::Detached
                };
                if let Ok(entry) = self.node_mut(node) {
                    entry.attach_state = state;
                }
            }
        } else {
            for &node in &chain {
                if let Ok(entry) = self.node_mut(node) {
                    entry.attach_state = AttachState::Unknown;
                }
            }
        }
        Ok(())
    }

    /// Returns `true` if the node itself has a lifecycle handler or a child with the flag set.
    fn has_own_listener(&self, id: NodeId) -> bool {
        let Ok(node) = self.node(id) else {
            return false;
        };
        node.handlers.iter().any(|(_, event, _)| event.is_lifecycle())
            || node
                .render_children
                .iter()
                .chain(&node.logical_children)
                .chain(&node.floating_children)
                .any(|child| {
                    self.subtree_has_listener(*child)
                        && self.effective_parent(*child) == Some(id)
                })
    }
}
