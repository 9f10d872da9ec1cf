// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Node and template-child identifiers.

use core::fmt;

/// Identifier for a node in a [`SceneTree`](crate::SceneTree).
///
/// A slot index plus a generation counter. Destroying a node frees its slot;
/// reusing the slot bumps the generation, so stale `NodeId`s never alias a
/// different live node. Use [`SceneTree::is_alive`](crate::SceneTree::is_alive)
/// to check liveness.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) u32, pub(crate) u32);

impl NodeId {
    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }

    pub(crate) const fn generation(self) -> u32 {
        self.1
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}v{})", self.0, self.1)
    }
}

/// Ordinal of a named child within one template.
///
/// Index `0` ([`ChildIndex::SELF`]) always denotes the template's container
/// (the node the template or style is applied to). Named template children
/// get consecutive indices starting at `1` when their template is sealed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChildIndex(u16);

impl ChildIndex {
    /// The container itself.
    pub const SELF: Self = Self(0);

    /// Creates a child index from its raw ordinal.
    #[must_use]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Returns the raw ordinal.
    #[must_use]
    pub const fn index(self) -> u16 {
        self.0
    }

    /// Returns `true` for [`ChildIndex::SELF`].
    #[must_use]
    pub const fn is_self(self) -> bool {
        self.0 == 0
    }
}
