// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Descendant walks over the render and logical trees together.
//!
//! A node may sit in the render tree under one parent and in the logical
//! tree under another. [`DescendantsWalker`] enumerates the union of both
//! trees below a root so that every reachable node is visited exactly once:
//!
//! - Under [`WalkPriority::RenderFirst`], a node's render children are visited
//!   first, then its floating children, then those logical children that are
//!   not also its render children.
//! - Under [`WalkPriority::LogicalFirst`], logical children come first, then
//!   render children whose logical parent is elsewhere, then floating children.
//! - A node whose render and logical parents are both set and differ is
//!   reachable twice; the first visit records it and the second is skipped.
//!
//! While a node's children are being enumerated the node is locked against
//! structural mutation ([`TreeError::IterationInProgress`]). Walks deeper than
//! [`SceneConfig::max_tree_depth`](crate::SceneConfig::max_tree_depth) fail
//! with [`TreeError::TreeLoop`].

use hashbrown::HashSet;
use smallvec::SmallVec;
use tracing::{trace, warn};

use crate::error::{TreeError, TreeResult};
use crate::id::NodeId;
use crate::tree::{NodeFlags, SceneTree};

/// Which tree a walk prefers when a node has children in both.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum WalkPriority {
    /// Render children first.
    #[default]
    RenderFirst,
    /// Logical children first.
    LogicalFirst,
}

const ITERATING: NodeFlags = NodeFlags::RENDER_ITERATING.union(NodeFlags::LOGICAL_ITERATING);

struct Frame {
    node: NodeId,
    children: SmallVec<[(NodeId, bool); 8]>,
    next: usize,
}

/// Visits every node below a root across both trees.
///
/// The visitor receives the tree, the node, and whether the node was reached
/// through a render-parent link. Returning `false` prunes the node's subtree.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use understory_property::PropertyRegistry;
/// use understory_scene::{DescendantsWalker, NodeKind, NodeType, SceneTree, TypeCaps, WalkPriority};
///
/// let panel = NodeType::builder("Panel", NodeKind::Visual)
///     .capabilities(TypeCaps::ADD_CHILD)
///     .build();
/// let mut tree = SceneTree::new(Arc::new(PropertyRegistry::new()));
/// let root = tree.create_node(&panel);
/// let a = tree.create_node(&panel);
/// let b = tree.create_node(&panel);
/// tree.append_child(root, a).unwrap();
/// tree.append_child(a, b).unwrap();
///
/// let mut seen = Vec::new();
/// DescendantsWalker::new(WalkPriority::RenderFirst)
///     .start_walk(&mut tree, root, false, |_, node, via_render| {
///         seen.push((node, via_render));
///         true
///     })
///     .unwrap();
/// assert_eq!(seen, vec![(root, true), (a, true), (b, true)]);
/// ```
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DescendantsWalker {
    priority: WalkPriority,
}

impl DescendantsWalker {
    /// Creates a walker with the given priority.
    #[must_use]
    pub const fn new(priority: WalkPriority) -> Self {
        Self { priority }
    }

    /// Returns the walk priority.
    #[must_use]
    pub const fn priority(&self) -> WalkPriority {
        self.priority
    }

    /// Walks the subtree under `root`.
    ///
    /// Unless `skip_root` is set, the root is visited first, reported as
    /// reached through the preferred tree.
    pub fn start_walk<F>(
        &self,
        tree: &mut SceneTree,
        root: NodeId,
        skip_root: bool,
        mut visit: F,
    ) -> TreeResult<()>
    where
        F: FnMut(&mut SceneTree, NodeId, bool) -> bool,
    {
        tree.node(root)?;
        if !skip_root && !visit(tree, root, self.priority == WalkPriority::RenderFirst) {
            return Ok(());
        }

        let limit = tree.config().max_tree_depth;
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut frames: Vec<Frame> = Vec::new();
        self.push_frame(tree, &mut frames, root);

        let result = loop {
            let Some(frame) = frames.last_mut() else {
                break Ok(());
            };
            let entry = frame.children.get(frame.next).copied();
            frame.next += 1;
            let Some((child, via_render)) = entry else {
                if let Some(done) = frames.pop() {
                    tree.set_flags(done.node, ITERATING, false);
                }
                continue;
            };

            if !tree.is_alive(child) || seen.remove(&child) {
                continue;
            }
            if frames.len() > limit {
                warn!(?root, limit, "walk exceeded the maximum tree depth");
                break Err(TreeError::TreeLoop { limit });
            }

            let render_parent = tree.render_parent(child);
            let logical_parent = tree.logical_parent(child);
            if render_parent.is_some() && logical_parent.is_some() && render_parent != logical_parent
            {
                seen.insert(child);
            }

            trace!(?child, via_render, depth = frames.len(), "visit");
            if visit(tree, child, via_render) {
                self.push_frame(tree, &mut frames, child);
            }
        };

        for frame in frames {
            tree.set_flags(frame.node, ITERATING, false);
        }
        result
    }

    fn push_frame(&self, tree: &mut SceneTree, frames: &mut Vec<Frame>, node: NodeId) {
        let Ok(entry) = tree.node(node) else {
            return;
        };
        let mut children: SmallVec<[(NodeId, bool); 8]> = SmallVec::new();
        match self.priority {
            WalkPriority::RenderFirst => {
                children.extend(entry.render_children.iter().map(|c| (*c, true)));
                children.extend(entry.floating_children.iter().map(|c| (*c, false)));
                children.extend(
                    entry
                        .logical_children
                        .iter()
                        .filter(|c| tree.render_parent(**c) != Some(node))
                        .map(|c| (*c, false)),
                );
            }
            WalkPriority::LogicalFirst => {
                children.extend(entry.logical_children.iter().map(|c| (*c, false)));
                children.extend(
                    entry
                        .render_children
                        .iter()
                        .filter(|c| tree.logical_parent(**c) != Some(node))
                        .map(|c| (*c, true)),
                );
                children.extend(entry.floating_children.iter().map(|c| (*c, false)));
            }
        }
        if children.is_empty() {
            return;
        }
        tree.set_flags(node, ITERATING, true);
        frames.push(Frame {
            node,
            children,
            next: 0,
        });
    }
}

impl SceneTree {
    /// Walks the subtree under `root` with a [`DescendantsWalker`].
    pub fn walk_descendants<F>(
        &mut self,
        root: NodeId,
        priority: WalkPriority,
        visit: F,
    ) -> TreeResult<()>
    where
        F: FnMut(&mut Self, NodeId, bool) -> bool,
    {
        DescendantsWalker::new(priority).start_walk(self, root, false, visit)
    }
}
