// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scene tree configuration.

use crate::dispatch::DispatchPriority;

/// Tunables for a [`SceneTree`](crate::SceneTree).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SceneConfig {
    /// Maximum nesting a walk or parent-chain traversal may reach before it
    /// reports [`TreeError::TreeLoop`](crate::TreeError::TreeLoop).
    pub max_tree_depth: usize,
    /// Priority used when queueing deferred lifecycle broadcasts.
    pub lifecycle_priority: DispatchPriority,
}

impl SceneConfig {
    /// Default depth limit.
    pub const DEFAULT_MAX_TREE_DEPTH: usize = 4096;

    /// Returns a copy with a different depth limit.
    #[must_use]
    pub fn with_max_tree_depth(mut self, depth: usize) -> Self {
        self.max_tree_depth = depth;
        self
    }

    /// Returns a copy with a different lifecycle priority.
    #[must_use]
    pub fn with_lifecycle_priority(mut self, priority: DispatchPriority) -> Self {
        self.lifecycle_priority = priority;
        self
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            max_tree_depth: Self::DEFAULT_MAX_TREE_DEPTH,
            lifecycle_priority: DispatchPriority::Loaded,
        }
    }
}
