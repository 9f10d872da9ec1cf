// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Event triggers: actions run when a node raises an event.

use core::fmt;
use std::sync::{Arc, Mutex};

use tracing::{trace, warn};
use understory_property::PropertyRegistry;
use understory_scene::{EventId, HandlerId, NodeId, SceneTree};

use crate::action::TriggerAction;
use crate::error::{StyleError, StyleResult};
use crate::seal::{SealCell, lock};

#[derive(Clone, Debug, Default)]
struct EventDraft {
    event: Option<EventId>,
    source_name: Option<Arc<str>>,
    actions: Vec<TriggerAction>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Connection {
    host: NodeId,
    source: NodeId,
    handler: HandlerId,
}

struct EventTriggerInner {
    body: SealCell<EventDraft, EventDraft>,
    connections: Mutex<Vec<Connection>>,
}

impl fmt::Debug for EventTriggerInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let draft = self.body.sealed().cloned().unwrap_or_else(|| self.body.read(Clone::clone));
        f.debug_struct("EventTrigger")
            .field("event", &draft.event)
            .field("source_name", &draft.source_name)
            .field("actions", &draft.actions.len())
            .field("connections", &lock(&self.connections).len())
            .finish()
    }
}

/// Runs actions against a host node whenever a source node raises an event.
///
/// The source is the template child named by [`set_source_name`], or the
/// host itself. Connecting subscribes a handler on the source; the event
/// cannot be changed while any host is connected.
///
/// [`set_source_name`]: EventTrigger::set_source_name
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use understory_property::PropertyRegistry;
/// use understory_scene::{EventId, NodeKind, NodeType, SceneTree};
/// use understory_style::{EventTrigger, TriggerAction};
///
/// const CLICK: EventId = EventId::new(EventId::FIRST_CUSTOM.raw());
///
/// let mut tree = SceneTree::new(Arc::new(PropertyRegistry::new()));
/// let button = tree.create_node(&NodeType::builder("Button", NodeKind::Visual).build());
///
/// let clicks = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&clicks);
/// let trigger = EventTrigger::new(CLICK);
/// trigger
///     .add_action(TriggerAction::invoke(move |_, _| {
///         counter.fetch_add(1, Ordering::Relaxed);
///     }))
///     .unwrap();
///
/// trigger.connect(&mut tree, button).unwrap();
/// tree.raise_event(button, CLICK).unwrap();
/// trigger.disconnect(&mut tree, button).unwrap();
/// tree.raise_event(button, CLICK).unwrap();
/// assert_eq!(clicks.load(Ordering::Relaxed), 1);
/// ```
#[derive(Clone, Debug)]
pub struct EventTrigger {
    inner: Arc<EventTriggerInner>,
}

impl EventTrigger {
    /// Creates a trigger for `event`.
    #[must_use]
    pub fn new(event: EventId) -> Self {
        Self::with_draft(EventDraft {
            event: Some(event),
            ..EventDraft::default()
        })
    }

    /// Creates a trigger with no event yet.
    #[must_use]
    pub fn unbound() -> Self {
        Self::with_draft(EventDraft::default())
    }

    fn with_draft(draft: EventDraft) -> Self {
        Self {
            inner: Arc::new(EventTriggerInner {
                body: SealCell::new("event trigger", draft),
                connections: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns the event this trigger listens for.
    #[must_use]
    pub fn event(&self) -> Option<EventId> {
        self.snapshot().event
    }

    /// Returns the name of the template child raising the event, if any.
    #[must_use]
    pub fn source_name(&self) -> Option<Arc<str>> {
        self.snapshot().source_name
    }

    /// Changes the event.
    ///
    /// Fails with [`StyleError::TriggerConnected`] while connected to a host.
    pub fn set_event(&self, event: EventId) -> StyleResult<()> {
        if !lock(&self.inner.connections).is_empty() {
            return Err(StyleError::TriggerConnected);
        }
        self.inner.body.edit(|draft| {
            draft.event = Some(event);
            Ok(())
        })
    }

    /// Listens on the template child called `name` instead of the host.
    pub fn set_source_name(&self, name: impl Into<Arc<str>>) -> StyleResult<()> {
        let name = name.into();
        self.inner.body.edit(|draft| {
            draft.source_name = Some(name);
            Ok(())
        })
    }

    /// Appends an action.
    ///
    /// Fails with [`StyleError::TriggerConnected`] while connected to a host.
    pub fn add_action(&self, action: TriggerAction) -> StyleResult<()> {
        if !lock(&self.inner.connections).is_empty() {
            return Err(StyleError::TriggerConnected);
        }
        self.inner.body.edit(|draft| {
            draft.actions.push(action);
            Ok(())
        })
    }

    /// Freezes the trigger. Fails with [`StyleError::MissingEvent`] if no event is set.
    pub fn seal(&self) -> StyleResult<()> {
        self.inner
            .body
            .seal_with(|draft| match draft.event {
                Some(_) => Ok(draft.clone()),
                None => Err(StyleError::MissingEvent),
            })
            .map(|_| ())
    }

    /// Returns `true` once the trigger is sealed.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.inner.body.is_sealed()
    }

    /// Subscribes to the event on `host`'s source node. Connecting twice is a no-op.
    ///
    /// Value-writing actions are checked against the tree's registry first.
    /// Returns the source node.
    pub fn connect(&self, tree: &mut SceneTree, host: NodeId) -> StyleResult<NodeId> {
        let draft = self.snapshot();
        let event = draft.event.ok_or(StyleError::MissingEvent)?;
        for action in &draft.actions {
            action.validate(tree.registry())?;
        }
        if let Some(existing) = lock(&self.inner.connections)
            .iter()
            .find(|c| c.host == host)
        {
            return Ok(existing.source);
        }
        let source = match &draft.source_name {
            None => host,
            Some(name) => tree.template_child_by_name(host, name).ok_or_else(|| {
                StyleError::UnknownTemplateChild {
                    name: name.to_string(),
                }
            })?,
        };
        let trigger = self.clone();
        let handler = tree.add_handler(source, event, move |tree, _| trigger.fire(tree, host))?;
        lock(&self.inner.connections).push(Connection {
            host,
            source,
            handler,
        });
        trace!(?host, ?source, ?event, "connected event trigger");
        Ok(source)
    }

    /// Removes the subscription made for `host`. Returns `false` if there was none.
    pub fn disconnect(&self, tree: &mut SceneTree, host: NodeId) -> StyleResult<bool> {
        let connection = {
            let mut connections = lock(&self.inner.connections);
            let Some(pos) = connections.iter().position(|c| c.host == host) else {
                return Ok(false);
            };
            connections.swap_remove(pos)
        };
        if tree.is_alive(connection.source) {
            tree.remove_handler(connection.source, connection.handler)?;
        }
        Ok(true)
    }

    /// Returns `true` if the trigger is connected for `host`.
    #[must_use]
    pub fn is_connected(&self, host: NodeId) -> bool {
        lock(&self.inner.connections).iter().any(|c| c.host == host)
    }

    pub(crate) fn validate(&self, registry: &PropertyRegistry) -> StyleResult<()> {
        for action in &self.snapshot().actions {
            action.validate(registry)?;
        }
        Ok(())
    }

    fn snapshot(&self) -> EventDraft {
        match self.inner.body.sealed() {
            Some(sealed) => sealed.clone(),
            None => self.inner.body.read(Clone::clone),
        }
    }

    fn fire(&self, tree: &mut SceneTree, host: NodeId) {
        if !tree.is_alive(host) {
            trace!(?host, "event trigger host is gone");
            return;
        }
        // Actions were validated on connect and cannot change until disconnect.
        for action in self.snapshot().actions {
            if let Err(err) = action.run(tree, host) {
                warn!(?host, %err, "event trigger action failed");
            }
        }
    }
}
