// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors reported while authoring, sealing and applying styles and templates.

use thiserror::Error;
use understory_property::PropertyId;
use understory_scene::TreeError;

/// Result alias for style and template operations.
pub type StyleResult<T> = Result<T, StyleError>;

/// Coarse classification of a [`StyleError`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The object is in the wrong state for the operation (usually: sealed).
    InvalidState,
    /// An authored value or structure was rejected.
    Validation,
    /// A based-on chain refers back to itself.
    CircularInheritance,
    /// A tree traversal exceeded its depth limit.
    TreeLoop,
    /// A name, property or node could not be found.
    LookupMiss,
}

/// Errors raised by cascades, rules, factories and templates.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StyleError {
    /// The object was sealed and can no longer be modified.
    #[error("{what} is sealed and can no longer be modified")]
    Sealed {
        /// What kind of object rejected the change.
        what: &'static str,
    },
    /// The object must be sealed first.
    #[error("{what} must be sealed first")]
    NotSealed {
        /// What kind of object was not sealed.
        what: &'static str,
    },
    /// An event trigger's event and actions cannot change while listeners are attached.
    #[error("event trigger is connected and cannot change")]
    TriggerConnected,
    /// A cascade was sealed without a target type.
    #[error("cascade has no target type")]
    NullTargetType,
    /// A node type is not compatible with the type a cascade or template targets.
    #[error("{found} is not assignable to {expected}")]
    TargetTypeMismatch {
        /// The type that was required.
        expected: &'static str,
        /// The type that was offered.
        found: &'static str,
    },
    /// The based-on chain of a cascade contains a cycle.
    #[error("based-on chain refers back to itself")]
    CircularInheritance,
    /// A rule assigns the same property its own condition reads.
    #[error("rule assigns property {property}, which its own condition reads")]
    SelfReferentialAssignment {
        /// The property both read and written.
        property: PropertyId,
    },
    /// A cascade-level condition names a template child.
    #[error("condition source '{name}' names a template child outside a template")]
    InvalidConditionTarget {
        /// The offending source name.
        name: String,
    },
    /// A cascade-level setter names a template child.
    #[error("setter target '{name}' names a template child outside a template")]
    InvalidSetterTarget {
        /// The offending target name.
        name: String,
    },
    /// The property is an identity or style-reference property and cannot be assigned here.
    #[error("property {property} is reserved and cannot be assigned by a rule")]
    ReservedProperty {
        /// The property.
        property: PropertyId,
    },
    /// The property is read-only.
    #[error("property {property} is read-only")]
    ReadOnlyProperty {
        /// The property.
        property: PropertyId,
    },
    /// The value is not accepted by the property.
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
    /// No template child has the given name.
    #[error("no template child is named '{name}'")]
    UnknownTemplateChild {
        /// The missing name.
        name: String,
    },
    /// Two factory nodes in one template share a name.
    #[error("template child name '{name}' is used twice")]
    DuplicateName {
        /// The repeated name.
        name: String,
    },
    /// A multi-condition rule was created without conditions.
    #[error("rule has no conditions")]
    EmptyConditions,
    /// A property condition was given to a data rule, or the reverse.
    #[error("condition source does not match the rule kind")]
    ConditionKindMismatch,
    /// An event trigger was connected or sealed without an event.
    #[error("event trigger has no event")]
    MissingEvent,
    /// A factory node has neither a node type nor literal text.
    #[error("factory node needs a node type or literal text")]
    FactoryTypeRequired,
    /// A factory node has both a node type and literal text.
    #[error("factory node cannot have both a node type and literal text")]
    TypeAndTextMutuallyExclusive,
    /// A factory node has children but its type does not accept them.
    #[error("{type_name} does not support children")]
    TypeMustSupportChildren {
        /// Name of the node type.
        type_name: &'static str,
    },
    /// A text factory node has children.
    #[error("text factory nodes cannot have children")]
    TextAndChildrenMutuallyExclusive,
    /// An explicit alias source is not declared by the template's target type.
    #[error("template target type does not declare alias source '{name}'")]
    MissingAutoAliasSource {
        /// The alias source property name.
        name: String,
    },
    /// A factory node of a 3-D content type was given a non-literal value.
    #[error("3-D content only accepts literal values (property {property})")]
    Template3DPropertyUnsupported {
        /// The property given a non-literal value.
        property: PropertyId,
    },
    /// The factory node already has a parent.
    #[error("factory node already has a parent")]
    FactoryAlreadyParented,
    /// A template has more named children than a [`ChildIndex`](understory_scene::ChildIndex) can address.
    #[error("template has too many children")]
    TooManyTemplateChildren,
    /// A template was sealed without a root factory node.
    #[error("template has no root factory node")]
    MissingTemplateRoot,
    /// A template's root factory node produces text instead of a node.
    #[error("template root must produce a node, not text")]
    TemplateRootIsText,
    /// A scene tree operation failed.
    #[error(transparent)]
    Tree(#[from] TreeError),
}

impl StyleError {
    /// Returns the error's classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Sealed { .. } | Self::NotSealed { .. } | Self::TriggerConnected => {
                ErrorKind::InvalidState
            }
            Self::CircularInheritance => ErrorKind::CircularInheritance,
            Self::UnknownProperty(_) | Self::UnknownTemplateChild { .. } => ErrorKind::LookupMiss,
            Self::Tree(err) => match err {
                TreeError::TreeLoop { .. } => ErrorKind::TreeLoop,
                TreeError::IterationInProgress { .. } => ErrorKind::InvalidState,
                TreeError::StaleNode(_) | TreeError::UnknownProperty(_) => ErrorKind::LookupMiss,
                _ => ErrorKind::Validation,
            },
            _ => ErrorKind::Validation,
        }
    }
}
