// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Scene: a dual render/logical node tree with lifecycle broadcasts.
//!
//! A [`SceneTree`] is an arena of nodes. Visual nodes live in a render tree
//! and a logical tree at once, possibly under different parents; content
//! nodes live only in the logical tree. Floating (popup) content hangs off an
//! owner through its mentor link.
//!
//! This crate provides:
//!
//! - [`DescendantsWalker`]: visits every node under a root across both trees
//!   exactly once, with [`WalkPriority`] choosing which tree goes first.
//!   Walks lock the child lists they enumerate and report
//!   [`TreeError::TreeLoop`] past [`SceneConfig::max_tree_depth`].
//! - Loaded/Unloaded broadcasting. Structural changes schedule a deferred
//!   broadcast through a [`DeferredDispatch`] queue and the tree's own
//!   at-layout-time callbacks; whichever runs first wins. Subtrees without
//!   listeners are pruned and repeated broadcasts are no-ops.
//! - Layered property values per node (see [`understory_property`]), direct
//!   node events, batched initialization, text content, row/column
//!   definitions and template-child bookkeeping used by `understory_style`.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! use understory_property::PropertyRegistry;
//! use understory_scene::{EventId, NodeKind, NodeType, SceneTree, TypeCaps};
//!
//! let panel = NodeType::builder("Panel", NodeKind::Visual)
//!     .capabilities(TypeCaps::ADD_CHILD)
//!     .build();
//! let mut tree = SceneTree::new(Arc::new(PropertyRegistry::new()));
//! let window = tree.create_node(&panel);
//! let button = tree.create_node(&panel);
//! tree.append_child(window, button).unwrap();
//!
//! let loaded = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&loaded);
//! tree.add_handler(button, EventId::LOADED, move |_, _| {
//!     counter.fetch_add(1, Ordering::Relaxed);
//! })
//! .unwrap();
//!
//! // Connecting the window schedules the broadcast; the host drains it.
//! tree.set_presentation_root(window, true).unwrap();
//! tree.run_layout_callbacks().unwrap();
//! assert_eq!(loaded.load(Ordering::Relaxed), 1);
//! assert!(tree.is_attached(button));
//! ```

mod config;
mod dispatch;
mod error;
mod event;
mod id;
mod lifecycle;
mod node_type;
mod tree;
mod walk;

pub use config::SceneConfig;
pub use dispatch::{
    DeferredBroadcast, DeferredDispatch, DispatchHandle, DispatchPriority, DispatchQueue,
    DispatchStatus,
};
pub use error::{TreeError, TreeResult};
pub use event::{EventArgs, EventHandler, EventId, HandlerId};
pub use id::{ChildIndex, NodeId};
pub use lifecycle::{LifecycleKind, Notification, OperationId, PendingOperation};
pub use node_type::{NodeKind, NodeType, NodeTypeBuilder, TypeCaps};
pub use tree::{AttachState, SceneTree};
pub use walk::{DescendantsWalker, WalkPriority};
