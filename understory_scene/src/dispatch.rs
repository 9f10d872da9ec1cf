// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Deferred work queues used by the lifecycle broadcaster.
//!
//! A pending attach/detach broadcast is registered twice: with a
//! [`DeferredDispatch`] implementation (the host's prioritized work queue)
//! and with the tree's own at-layout-time callback list. Whichever runs first
//! delivers the broadcast and cancels the other registration.
//!
//! [`DispatchQueue`] is a simple in-process [`DeferredDispatch`] that hosts
//! can drain from their event loop via
//! [`SceneTree::run_deferred`](crate::SceneTree::run_deferred).

use core::cmp::Reverse;
use std::collections::BTreeMap;

use hashbrown::HashMap;

use crate::id::NodeId;
use crate::lifecycle::{LifecycleKind, OperationId};

/// Priority of deferred work. Higher priorities run first.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DispatchPriority {
    /// Runs when nothing else is queued.
    Idle,
    /// Low-priority background work.
    Background,
    /// Lifecycle notifications.
    #[default]
    Loaded,
    /// Work that must happen before the next frame is rendered.
    Render,
    /// Runs as soon as possible.
    Send,
}

/// Handle to a scheduled unit of deferred work.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DispatchHandle(u64);

impl DispatchHandle {
    /// Creates a handle from a raw value chosen by a [`DeferredDispatch`] implementation.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Status of a scheduled unit of work.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DispatchStatus {
    /// Still queued.
    Pending,
    /// Already ran, was aborted, or was never issued by this queue.
    Done,
}

/// A deferred lifecycle broadcast.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DeferredBroadcast {
    /// The node the broadcast starts at.
    pub node: NodeId,
    /// Attach or detach.
    pub kind: LifecycleKind,
    /// The pending operation this work belongs to.
    ///
    /// Work whose operation no longer matches the node's pending operation is stale and ignored.
    pub operation: OperationId,
}

/// A host-provided prioritized work queue.
pub trait DeferredDispatch {
    /// Queues `work` at `priority`.
    fn schedule(&mut self, priority: DispatchPriority, work: DeferredBroadcast) -> DispatchHandle;

    /// Reports whether `handle` is still queued.
    fn status(&self, handle: DispatchHandle) -> DispatchStatus;

    /// Removes queued work. Returns `false` if it was not queued.
    fn abort(&mut self, handle: DispatchHandle) -> bool;

    /// Dequeues the highest-priority ready work item.
    fn next_ready(&mut self) -> Option<(DispatchHandle, DeferredBroadcast)>;
}

/// An in-process [`DeferredDispatch`] ordered by priority, then by scheduling order.
#[derive(Debug, Default)]
pub struct DispatchQueue {
    next: u64,
    queue: BTreeMap<(Reverse<DispatchPriority>, u64), DeferredBroadcast>,
    priorities: HashMap<u64, DispatchPriority>,
}

impl DispatchQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl DeferredDispatch for DispatchQueue {
    fn schedule(&mut self, priority: DispatchPriority, work: DeferredBroadcast) -> DispatchHandle {
        let seq = self.next;
        self.next += 1;
        self.queue.insert((Reverse(priority), seq), work);
        self.priorities.insert(seq, priority);
        DispatchHandle(seq)
    }

    fn status(&self, handle: DispatchHandle) -> DispatchStatus {
        if self.priorities.contains_key(&handle.0) {
            DispatchStatus::Pending
        } else {
            DispatchStatus::Done
        }
    }

    fn abort(&mut self, handle: DispatchHandle) -> bool {
        self.priorities
            .remove(&handle.0)
            .and_then(|priority| self.queue.remove(&(Reverse(priority), handle.0)))
            .is_some()
    }

    fn next_ready(&mut self) -> Option<(DispatchHandle, DeferredBroadcast)> {
        let ((_, seq), work) = self.queue.pop_first()?;
        self.priorities.remove(&seq);
        Some((DispatchHandle(seq), work))
    }
}

/// Identifies an entry in [`LayoutCallbacks`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct LayoutCallbackId(u64);

/// Work to run at the next layout pass, in registration order.
#[derive(Debug, Default)]
pub(crate) struct LayoutCallbacks {
    next: u64,
    entries: Vec<(LayoutCallbackId, DeferredBroadcast)>,
}

impl LayoutCallbacks {
    pub(crate) fn push(&mut self, work: DeferredBroadcast) -> LayoutCallbackId {
        let id = LayoutCallbackId(self.next);
        self.next += 1;
        self.entries.push((id, work));
        id
    }

    pub(crate) fn remove(&mut self, id: LayoutCallbackId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub(crate) fn take(&mut self) -> Vec<(LayoutCallbackId, DeferredBroadcast)> {
        core::mem::take(&mut self.entries)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn work(n: u32) -> DeferredBroadcast {
        DeferredBroadcast {
            node: NodeId::new(n, 0),
            kind: LifecycleKind::Loaded,
            operation: OperationId(u64::from(n)),
        }
    }

    #[test]
    fn higher_priority_runs_first_then_fifo() {
        let mut queue = DispatchQueue::new();
        queue.schedule(DispatchPriority::Background, work(1));
        queue.schedule(DispatchPriority::Loaded, work(2));
        queue.schedule(DispatchPriority::Loaded, work(3));
        queue.schedule(DispatchPriority::Send, work(4));

        let order: Vec<_> = core::iter::from_fn(|| queue.next_ready())
            .map(|(_, w)| w.node.0)
            .collect();
        assert_eq!(order, vec![4, 2, 3, 1]);
    }

    #[test]
    fn abort_removes_pending_work() {
        let mut queue = DispatchQueue::new();
        let a = queue.schedule(DispatchPriority::Loaded, work(1));
        let b = queue.schedule(DispatchPriority::Loaded, work(2));

        assert_eq!(queue.status(a), DispatchStatus::Pending);
        assert!(queue.abort(a));
        assert!(!queue.abort(a));
        assert_eq!(queue.status(a), DispatchStatus::Done);

        let (handle, _) = queue.next_ready().unwrap();
        assert_eq!(handle, b);
        assert_eq!(queue.status(b), DispatchStatus::Done);
        assert!(queue.is_empty());
    }

    #[test]
    fn layout_callbacks_remove_by_id() {
        let mut callbacks = LayoutCallbacks::default();
        let a = callbacks.push(work(1));
        callbacks.push(work(2));
        assert!(callbacks.remove(a));
        assert!(!callbacks.remove(a));
        let rest = callbacks.take();
        assert_eq!(rest.len(), 1);
        assert_eq!(callbacks.len(), 0);
    }
}
