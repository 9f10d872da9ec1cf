// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Node type descriptors.
//!
//! A [`NodeType`] says which tree(s) a node participates in, which type it
//! derives from, which properties it declares, and which structural
//! capabilities it has (accepting children, text, row/column definitions).
//! Types are built once and shared; equality is identity.

use std::sync::Arc;

use smallvec::SmallVec;
use understory_property::PropertyId;

/// The two node kinds of the dual tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Participates in both the render tree and the logical tree.
    Visual,
    /// Participates in the logical tree only.
    Content,
}

impl NodeKind {
    /// Returns `true` if nodes of this kind can have a render parent.
    #[must_use]
    pub const fn is_visual(self) -> bool {
        matches!(self, Self::Visual)
    }
}

bitflags::bitflags! {
    /// Structural capabilities of a node type.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TypeCaps: u16 {
        /// Accepts child nodes through the generic add-child path.
        const ADD_CHILD = 1 << 0;
        /// Accepts literal text content.
        const ADD_TEXT = 1 << 1;
        /// Grid-like host with a row/column definition collection.
        const DEFINITION_HOST = 1 << 2;
        /// A row/column definition object.
        const LAYOUT_DEFINITION = 1 << 3;
        /// Presents its templated parent's content (auto-aliasing target).
        const CONTENT_PRESENTER = 1 << 4;
        /// 3-D content; template factories may only assign literals to it.
        const CONTENT_3D = 1 << 5;
    }
}

#[derive(Debug)]
struct NodeTypeData {
    name: &'static str,
    kind: NodeKind,
    base: Option<NodeType>,
    caps: TypeCaps,
    properties: SmallVec<[PropertyId; 8]>,
}

/// A shared node type descriptor.
///
/// # Example
///
/// ```rust
/// use understory_scene::{NodeKind, NodeType, TypeCaps};
///
/// let element = NodeType::builder("Element", NodeKind::Visual).build();
/// let panel = NodeType::builder("Panel", NodeKind::Visual)
///     .base(&element)
///     .capabilities(TypeCaps::ADD_CHILD)
///     .build();
///
/// assert!(element.is_assignable_from(&panel));
/// assert!(!panel.is_assignable_from(&element));
/// assert!(panel.capabilities().contains(TypeCaps::ADD_CHILD));
/// ```
#[derive(Clone)]
pub struct NodeType {
    inner: Arc<NodeTypeData>,
}

impl NodeType {
    /// Starts building a new type.
    #[must_use]
    pub fn builder(name: &'static str, kind: NodeKind) -> NodeTypeBuilder {
        NodeTypeBuilder {
            name,
            kind,
            base: None,
            caps: TypeCaps::empty(),
            properties: SmallVec::new(),
        }
    }

    /// Returns the type name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Returns the node kind.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.inner.kind
    }

    /// Returns the base type, if any.
    #[must_use]
    pub fn base(&self) -> Option<&Self> {
        self.inner.base.as_ref()
    }

    /// Returns the capabilities, including those inherited from base types.
    #[must_use]
    pub fn capabilities(&self) -> TypeCaps {
        self.inner.caps
    }

    /// Returns `true` if `other` is this type or derives from it.
    #[must_use]
    pub fn is_assignable_from(&self, other: &Self) -> bool {
        let mut current = Some(other);
        while let Some(ty) = current {
            if ty == self {
                return true;
            }
            current = ty.base();
        }
        false
    }

    /// Returns `true` if this type or one of its bases declares `property`.
    #[must_use]
    pub fn declares_property(&self, property: PropertyId) -> bool {
        let mut current = Some(self);
        while let Some(ty) = current {
            if ty.inner.properties.contains(&property) {
                return true;
            }
            current = ty.base();
        }
        false
    }
}

impl PartialEq for NodeType {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for NodeType {}

impl core::fmt::Debug for NodeType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("NodeType").field(&self.inner.name).finish()
    }
}

/// Builder for [`NodeType`].
#[derive(Debug)]
pub struct NodeTypeBuilder {
    name: &'static str,
    kind: NodeKind,
    base: Option<NodeType>,
    caps: TypeCaps,
    properties: SmallVec<[PropertyId; 8]>,
}

impl NodeTypeBuilder {
    /// Sets the base type. Capabilities of the base are inherited.
    #[must_use]
    pub fn base(mut self, base: &NodeType) -> Self {
        self.base = Some(base.clone());
        self
    }

    /// Adds capabilities.
    #[must_use]
    pub fn capabilities(mut self, caps: TypeCaps) -> Self {
        self.caps |= caps;
        self
    }

    /// Declares a property as owned by this type.
    #[must_use]
    pub fn property(mut self, property: impl Into<PropertyId>) -> Self {
        self.properties.push(property.into());
        self
    }

    /// Builds the type.
    #[must_use]
    pub fn build(self) -> NodeType {
        let inherited = self
            .base
            .as_ref()
            .map(NodeType::capabilities)
            .unwrap_or_default();
        NodeType {
            inner: Arc::new(NodeTypeData {
                name: self.name,
                kind: self.kind,
                base: self.base,
                caps: self.caps | inherited,
                properties: self.properties,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_are_inherited() {
        let panel = NodeType::builder("Panel", NodeKind::Visual)
            .capabilities(TypeCaps::ADD_CHILD)
            .build();
        let grid = NodeType::builder("Grid", NodeKind::Visual)
            .base(&panel)
            .capabilities(TypeCaps::DEFINITION_HOST)
            .build();

        assert!(grid.capabilities().contains(TypeCaps::ADD_CHILD | TypeCaps::DEFINITION_HOST));
        assert!(!panel.capabilities().contains(TypeCaps::DEFINITION_HOST));
    }

    #[test]
    fn declared_properties_follow_bases() {
        let content = PropertyId::new(3);
        let control = NodeType::builder("ContentControl", NodeKind::Visual)
            .property(content)
            .build();
        let button = NodeType::builder("Button", NodeKind::Visual)
            .base(&control)
            .build();

        assert!(button.declares_property(content));
        assert!(!button.declares_property(PropertyId::new(4)));
    }

    #[test]
    fn equality_is_identity() {
        let a = NodeType::builder("Same", NodeKind::Content).build();
        let b = NodeType::builder("Same", NodeKind::Content).build();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert!(!a.is_assignable_from(&b));
    }
}
