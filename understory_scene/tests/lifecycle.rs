// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Lifecycle broadcasts driven through a host-provided dispatcher.

use std::sync::{Arc, Mutex};

use understory_property::PropertyRegistry;
use understory_scene::{
    DeferredBroadcast, DeferredDispatch, DispatchHandle, DispatchPriority, DispatchStatus,
    EventId, LifecycleKind, NodeId, NodeKind, NodeType, SceneTree, TypeCaps,
};

/// A dispatcher that records every request and runs items in FIFO order.
#[derive(Debug, Default)]
struct RecordingDispatcher {
    next: u64,
    queued: Vec<(DispatchHandle, DeferredBroadcast)>,
    priorities: Arc<Mutex<Vec<DispatchPriority>>>,
}

impl DeferredDispatch for RecordingDispatcher {
    fn schedule(&mut self, priority: DispatchPriority, work: DeferredBroadcast) -> DispatchHandle {
        let handle = DispatchHandle::from_raw(self.next);
        self.next += 1;
        self.priorities.lock().unwrap().push(priority);
        self.queued.push((handle, work));
        handle
    }

    fn status(&self, handle: DispatchHandle) -> DispatchStatus {
        if self.queued.iter().any(|(h, _)| *h == handle) {
            DispatchStatus::Pending
        } else {
            DispatchStatus::Done
        }
    }

    fn abort(&mut self, handle: DispatchHandle) -> bool {
        let before = self.queued.len();
        self.queued.retain(|(h, _)| *h != handle);
        before != self.queued.len()
    }

    fn next_ready(&mut self) -> Option<(DispatchHandle, DeferredBroadcast)> {
        (!self.queued.is_empty()).then(|| self.queued.remove(0))
    }
}

type Log = Arc<Mutex<Vec<(NodeId, EventId)>>>;

fn listen(tree: &mut SceneTree, node: NodeId, log: &Log) {
    for event in [EventId::LOADED, EventId::UNLOADED] {
        let log = Arc::clone(log);
        tree.add_handler(node, event, move |_, args| {
            log.lock().unwrap().push((args.source, args.event));
        })
        .unwrap();
    }
}

fn panel() -> NodeType {
    NodeType::builder("Panel", NodeKind::Visual)
        .capabilities(TypeCaps::ADD_CHILD)
        .build()
}

#[test]
fn host_dispatcher_receives_lifecycle_priority() {
    let priorities = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = RecordingDispatcher {
        priorities: Arc::clone(&priorities),
        ..RecordingDispatcher::default()
    };
    let mut tree = SceneTree::new(Arc::new(PropertyRegistry::new())).with_dispatcher(dispatcher);
    let log = Log::default();
    let ty = panel();
    let root = tree.create_node(&ty);
    listen(&mut tree, root, &log);

    tree.set_presentation_root(root, true).unwrap();
    assert_eq!(*priorities.lock().unwrap(), vec![DispatchPriority::Loaded]);

    let delivered = tree.run_deferred().unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].kind, LifecycleKind::Loaded);
    assert_eq!(*log.lock().unwrap(), vec![(root, EventId::LOADED)]);

    // The layout-time twin was cancelled when the dispatcher ran first.
    assert!(tree.run_layout_callbacks().unwrap().is_empty());
}

#[test]
fn popup_and_split_parent_content_load_once() {
    let mut tree = SceneTree::new(Arc::new(PropertyRegistry::new()));
    let log = Log::default();
    let ty = panel();
    let window = tree.create_node(&ty);
    let presenter = tree.create_node(&ty);
    let owner = tree.create_node(&ty);
    let content = tree.create_node(&ty);
    let popup = tree.create_node(&ty);

    tree.append_child(window, presenter).unwrap();
    tree.append_child(window, owner).unwrap();
    // Rendered by the presenter, logically owned elsewhere.
    tree.append_render_child(presenter, content).unwrap();
    tree.append_logical_child(owner, content).unwrap();
    tree.add_floating_child(owner, popup).unwrap();

    listen(&mut tree, content, &log);
    listen(&mut tree, popup, &log);

    tree.set_presentation_root(window, true).unwrap();
    tree.run_layout_callbacks().unwrap();

    let mut events = log.lock().unwrap().clone();
    events.sort();
    let mut expected = vec![(content, EventId::LOADED), (popup, EventId::LOADED)];
    expected.sort();
    assert_eq!(events, expected);
    assert!(tree.is_attached(popup));
}

#[test]
fn destroying_a_node_with_pending_work_is_safe() {
    let mut tree = SceneTree::new(Arc::new(PropertyRegistry::new()));
    let log = Log::default();
    let ty = panel();
    let root = tree.create_node(&ty);
    let child = tree.create_node(&ty);
    tree.set_presentation_root(root, true).unwrap();
    listen(&mut tree, child, &log);
    tree.append_child(root, child).unwrap();
    assert!(tree.pending_operation(child).is_some());

    tree.destroy_node(child).unwrap();
    assert!(tree.run_deferred().unwrap().is_empty());
    assert!(tree.run_layout_callbacks().unwrap().is_empty());
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn handler_can_restructure_after_walk() {
    let mut tree = SceneTree::new(Arc::new(PropertyRegistry::new()));
    let ty = panel();
    let root = tree.create_node(&ty);
    let child = tree.create_node(&ty);
    let late = tree.create_node(&ty);
    tree.append_child(root, child).unwrap();
    tree.add_handler(child, EventId::LOADED, move |tree, args| {
        // Walk locks are released before handlers run.
        tree.append_child(args.source, late).unwrap();
    })
    .unwrap();

    tree.set_presentation_root(root, true).unwrap();
    tree.run_layout_callbacks().unwrap();
    assert_eq!(tree.render_children(child), &[late]);
}
