// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Node-local events and handlers.
//!
//! Events here are direct: [`SceneTree::raise_event`](crate::SceneTree::raise_event)
//! invokes the handlers registered on one node, in registration order. The
//! lifecycle broadcaster raises [`EventId::LOADED`] and [`EventId::UNLOADED`]
//! this way on every node whose attached state flips.

use core::fmt;
use std::sync::Arc;

use crate::id::NodeId;
use crate::tree::SceneTree;

/// Identifies an event kind.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u16);

impl EventId {
    /// The node became attached to a live presentation root.
    pub const LOADED: Self = Self(0);
    /// The node was detached from its presentation root.
    pub const UNLOADED: Self = Self(1);
    /// [`SceneTree::end_init`](crate::SceneTree::end_init) completed.
    pub const INITIALIZED: Self = Self(2);
    /// First id free for host-defined events.
    pub const FIRST_CUSTOM: Self = Self(16);

    /// Creates an event id from its raw value.
    ///
    /// Hosts should allocate ids at or above [`EventId::FIRST_CUSTOM`].
    #[must_use]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Returns `true` for [`EventId::LOADED`] and [`EventId::UNLOADED`].
    #[must_use]
    pub const fn is_lifecycle(self) -> bool {
        self.0 == Self::LOADED.0 || self.0 == Self::UNLOADED.0
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::LOADED => f.write_str("Loaded"),
            Self::UNLOADED => f.write_str("Unloaded"),
            Self::INITIALIZED => f.write_str("Initialized"),
            Self(raw) => write!(f, "EventId({raw})"),
        }
    }
}

/// Arguments passed to an [`EventHandler`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventArgs {
    /// The event being raised.
    pub event: EventId,
    /// The node whose handlers are running.
    pub source: NodeId,
    /// Set by a handler to mark the event handled.
    pub handled: bool,
}

impl EventArgs {
    /// Creates unhandled arguments for `event` raised on `source`.
    #[must_use]
    pub fn new(event: EventId, source: NodeId) -> Self {
        Self {
            event,
            source,
            handled: false,
        }
    }
}

/// A shared event handler.
///
/// Handlers receive the tree mutably, so they may restructure it; the
/// broadcaster only raises events after its walk has finished.
pub type EventHandler = Arc<dyn Fn(&mut SceneTree, &mut EventArgs) + Send + Sync>;

/// Token returned by [`SceneTree::add_handler`](crate::SceneTree::add_handler).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(pub(crate) u64);
