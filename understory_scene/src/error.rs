// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors reported by scene tree operations.

use thiserror::Error;
use understory_property::PropertyId;

use crate::id::NodeId;

/// Result alias for scene tree operations.
pub type TreeResult<T> = Result<T, TreeError>;

/// Errors that can occur while mutating or walking a [`SceneTree`](crate::SceneTree).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TreeError {
    /// A walk or parent-chain traversal exceeded the configured maximum depth.
    ///
    /// Either the tree contains a cycle or it is deeper than
    /// [`SceneConfig::max_tree_depth`](crate::SceneConfig::max_tree_depth).
    #[error("tree traversal exceeded the maximum depth of {limit}")]
    TreeLoop {
        /// The depth limit that was exceeded.
        limit: usize,
    },
    /// The node's child collection is being iterated by a walk.
    #[error("children of {node:?} are being iterated and cannot be modified")]
    IterationInProgress {
        /// The node whose children are locked.
        node: NodeId,
    },
    /// The node id does not refer to a live node.
    #[error("node {0:?} is not alive")]
    StaleNode(NodeId),
    /// The child already has a parent of the requested relation.
    #[error("node {node:?} already has a {relation} parent")]
    AlreadyParented {
        /// The child node.
        node: NodeId,
        /// `"render"` or `"logical"`.
        relation: &'static str,
    },
    /// The node is not a child of the given parent.
    #[error("node {child:?} is not a {relation} child of {parent:?}")]
    NotAChild {
        /// The parent node.
        parent: NodeId,
        /// The supposed child.
        child: NodeId,
        /// `"render"`, `"logical"` or `"floating"`.
        relation: &'static str,
    },
    /// A content node was placed where a render-tree node is required.
    #[error("node {node:?} is a content node and cannot join the render tree")]
    NotVisual {
        /// The offending node.
        node: NodeId,
    },
    /// The node's type lacks a capability the operation needs.
    #[error("node {node:?} of type {type_name} does not accept {what}")]
    Unsupported {
        /// The node that rejected the operation.
        node: NodeId,
        /// Name of the node's type.
        type_name: &'static str,
        /// What was offered.
        what: &'static str,
    },
    /// Attempted to set a read-only property.
    #[error("property {property} is read-only")]
    ReadOnlyProperty {
        /// The property.
        property: PropertyId,
    },
    /// The value's type or content is not accepted by the property.
    #[error("a value of type {type_name} is not valid for property {property}")]
    InvalidValue {
        /// The property.
        property: PropertyId,
        /// Type name of the rejected value.
        type_name: &'static str,
    },
    /// The property is not registered.
    #[error("property {0} is not registered")]
    UnknownProperty(PropertyId),
}
