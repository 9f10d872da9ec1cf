// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Style cascades.
//!
//! A [`Style`] targets a node type and carries setters, conditional rules,
//! event triggers and resources. A style may be based on another style whose
//! target type is assignable from its own; sealing merges the chain so that
//! the most derived style's setters override its ancestors' and its rules
//! are evaluated after theirs.

use core::fmt;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::debug;
use understory_property::{PropertyId, PropertyRegistry, ValueLayer};
use understory_scene::{ChildIndex, NodeId, NodeType, SceneTree, TreeError};

use crate::apply::RuleHost;
use crate::error::{StyleError, StyleResult};
use crate::resolve::StyleContext;
use crate::resources::{ResourceDictionary, ResourceKey};
use crate::rule::{ConditionalRule, Trigger};
use crate::seal::SealCell;
use crate::setter::Setter;
use crate::tables::{NameScope, RuleTables, check_not_style_reference};

#[derive(Clone, Debug, Default)]
struct StyleDraft {
    target_type: Option<NodeType>,
    based_on: Option<Style>,
    setters: Vec<Setter>,
    triggers: Vec<Trigger>,
    resources: Option<ResourceDictionary>,
}

#[derive(Debug)]
struct SealedStyle {
    target_type: NodeType,
    tables: RuleTables,
    /// Own dictionary first, then the based-on chain's.
    resources: SmallVec<[ResourceDictionary; 2]>,
}

struct StyleInner {
    registry: Arc<PropertyRegistry>,
    cell: SealCell<StyleDraft, SealedStyle>,
}

impl fmt::Debug for StyleInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match self.cell.sealed() {
            Some(sealed) => Some(sealed.target_type.name()),
            None => self
                .cell
                .read(|draft| draft.target_type.as_ref().map(NodeType::name)),
        };
        f.debug_struct("Style")
            .field("target_type", &target)
            .field("sealed", &self.cell.is_sealed())
            .finish_non_exhaustive()
    }
}

/// Names are not allowed at the style level.
struct StyleScope;

impl NameScope for StyleScope {
    fn condition_source(&self, name: &str) -> StyleResult<ChildIndex> {
        Err(StyleError::InvalidConditionTarget { name: name.into() })
    }

    fn setter_target(&self, name: &str) -> StyleResult<ChildIndex> {
        Err(StyleError::InvalidSetterTarget { name: name.into() })
    }
}

/// A shared style cascade.
///
/// Styles are edited through `&self` until sealed; clones share state.
/// Applying a style seals it.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use understory_property::{PropertyMetadataBuilder, PropertyRegistry, ValueLayer};
/// use understory_scene::{ChildIndex, NodeKind, NodeType, SceneTree};
/// use understory_style::{Setter, Style, StyleContext};
///
/// let mut registry = PropertyRegistry::new();
/// let width = registry.register("Width", PropertyMetadataBuilder::new(0.0_f64).build());
/// let height = registry.register("Height", PropertyMetadataBuilder::new(0.0_f64).build());
/// let registry = Arc::new(registry);
///
/// let control = NodeType::builder("Control", NodeKind::Visual).build();
/// let button = NodeType::builder("Button", NodeKind::Visual).base(&control).build();
///
/// let base = Style::for_type(&registry, &control);
/// base.add_setter(Setter::literal(&registry, width, 80.0).unwrap()).unwrap();
/// base.add_setter(Setter::literal(&registry, height, 24.0).unwrap()).unwrap();
///
/// let primary = Style::for_type(&registry, &button);
/// primary.set_based_on(&base).unwrap();
/// primary.add_setter(Setter::literal(&registry, width, 120.0).unwrap()).unwrap();
/// primary.seal().unwrap();
///
/// let mut tree = SceneTree::new(Arc::clone(&registry));
/// let node = tree.create_node(&button);
/// primary.apply(&mut tree, node, &StyleContext::default()).unwrap();
/// assert_eq!(tree.get_value(node, width), Some(120.0));
/// assert_eq!(tree.get_value(node, height), Some(24.0));
/// assert_eq!(tree.value_source(node, width.id()), Some(ValueLayer::Style));
/// ```
#[derive(Clone, Debug)]
pub struct Style {
    inner: Arc<StyleInner>,
}

impl Style {
    /// Creates an empty style with no target type.
    #[must_use]
    pub fn new(registry: &Arc<PropertyRegistry>) -> Self {
        Self::with_draft(registry, StyleDraft::default())
    }

    /// Creates an empty style targeting `target_type`.
    #[must_use]
    pub fn for_type(registry: &Arc<PropertyRegistry>, target_type: &NodeType) -> Self {
        Self::with_draft(
            registry,
            StyleDraft {
                target_type: Some(target_type.clone()),
                ..StyleDraft::default()
            },
        )
    }

    fn with_draft(registry: &Arc<PropertyRegistry>, draft: StyleDraft) -> Self {
        Self {
            inner: Arc::new(StyleInner {
                registry: Arc::clone(registry),
                cell: SealCell::new("style", draft),
            }),
        }
    }

    /// Returns the registry setters are validated against.
    #[must_use]
    pub fn registry(&self) -> &Arc<PropertyRegistry> {
        &self.inner.registry
    }

    /// Returns the target type.
    #[must_use]
    pub fn target_type(&self) -> Option<NodeType> {
        match self.inner.cell.sealed() {
            Some(sealed) => Some(sealed.target_type.clone()),
            None => self.inner.cell.read(|draft| draft.target_type.clone()),
        }
    }

    /// Sets the target type.
    pub fn set_target_type(&self, target_type: &NodeType) -> StyleResult<()> {
        self.inner.cell.edit(|draft| {
            draft.target_type = Some(target_type.clone());
            Ok(())
        })
    }

    /// Returns the style this one is based on.
    #[must_use]
    pub fn based_on(&self) -> Option<Self> {
        self.inner.cell.read(|draft| draft.based_on.clone())
    }

    /// Bases this style on `parent`.
    pub fn set_based_on(&self, parent: &Self) -> StyleResult<()> {
        let parent = parent.clone();
        self.inner.cell.edit(|draft| {
            draft.based_on = Some(parent);
            Ok(())
        })
    }

    /// Adds an unconditional setter. Later setters for the same property win.
    pub fn add_setter(&self, setter: Setter) -> StyleResult<()> {
        setter.validate(&self.inner.registry)?;
        self.inner.cell.edit(|draft| {
            draft.setters.push(setter);
            Ok(())
        })
    }

    /// Adds a conditional rule or event trigger.
    pub fn add_trigger(&self, trigger: impl Into<Trigger>) -> StyleResult<()> {
        let trigger = trigger.into();
        self.inner.cell.edit(|draft| {
            draft.triggers.push(trigger);
            Ok(())
        })
    }

    /// Attaches a resource dictionary, consulted before the based-on chain's.
    pub fn set_resources(&self, resources: ResourceDictionary) -> StyleResult<()> {
        self.inner.cell.edit(|draft| {
            draft.resources = Some(resources);
            Ok(())
        })
    }

    /// Returns the attached resource dictionary.
    #[must_use]
    pub fn resources(&self) -> Option<ResourceDictionary> {
        self.inner.cell.read(|draft| draft.resources.clone())
    }

    /// Returns `true` once the style is sealed.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.inner.cell.is_sealed()
    }

    /// Validates and freezes the style and its based-on chain.
    ///
    /// Ancestors are sealed first. A cycle in the chain fails with
    /// [`StyleError::CircularInheritance`] before anything is sealed.
    /// Sealing twice is a no-op.
    pub fn seal(&self) -> StyleResult<()> {
        self.sealed().map(|_| ())
    }

    fn sealed(&self) -> StyleResult<&SealedStyle> {
        if let Some(sealed) = self.inner.cell.sealed() {
            return Ok(sealed);
        }
        self.check_chain()?;
        let registry = &self.inner.registry;
        let sealed = self.inner.cell.seal_with(|draft| seal_draft(registry, draft))?;
        for resources in &sealed.resources {
            resources.freeze();
        }
        debug!(
            target_type = sealed.target_type.name(),
            setters = sealed.tables.setters.len(),
            rules = sealed.tables.rules.len(),
            event_triggers = sealed.tables.event_triggers.len(),
            "sealed style"
        );
        Ok(sealed)
    }

    /// Walks the based-on chain with an explicit stack, failing on a repeat.
    fn check_chain(&self) -> StyleResult<()> {
        let mut chain: SmallVec<[Self; 4]> = SmallVec::new();
        chain.push(self.clone());
        let mut next = self.based_on();
        while let Some(parent) = next {
            if chain.iter().any(|seen| seen.ptr_eq(&parent)) {
                return Err(StyleError::CircularInheritance);
            }
            if parent.is_sealed() {
                return Ok(());
            }
            next = parent.based_on();
            chain.push(parent);
        }
        Ok(())
    }

    /// Returns the merged setter for `(child, property)`, if the sealed style has one.
    #[must_use]
    pub fn find_property_assignment(&self, child: ChildIndex, property: PropertyId) -> Option<&Setter> {
        self.inner.cell.sealed()?.tables.setter(child, property)
    }

    /// Returns the sealed style's conditional rules that read `property`.
    #[must_use]
    pub fn find_conditional_rules_for(&self, property: PropertyId) -> Vec<ConditionalRule> {
        let Some(sealed) = self.inner.cell.sealed() else {
            return Vec::new();
        };
        sealed
            .tables
            .rules_for_property(property)
            .iter()
            .map(|idx| sealed.tables.rules[*idx].rule.clone())
            .collect()
    }

    /// Seals the style and applies it to `node`.
    ///
    /// Setters are written to [`ValueLayer::Style`], active rules to
    /// [`ValueLayer::Trigger`], and event triggers are connected with `node`
    /// as their host. A setter whose resource or binding does not resolve
    /// leaves its property unset.
    pub fn apply(&self, tree: &mut SceneTree, node: NodeId, cx: &StyleContext<'_>) -> StyleResult<()> {
        let sealed = self.sealed()?;
        let node_type = tree.node_type(node).ok_or(TreeError::StaleNode(node))?;
        if !sealed.target_type.is_assignable_from(node_type) {
            return Err(StyleError::TargetTypeMismatch {
                expected: sealed.target_type.name(),
                found: node_type.name(),
            });
        }
        let host = self.host(sealed, node);
        host.apply_setters(tree, ValueLayer::Style, cx)?;
        for trigger in &sealed.tables.event_triggers {
            trigger.connect(tree, node)?;
        }
        host.evaluate_all(tree, cx)?;
        debug!(?node, target_type = sealed.target_type.name(), "applied style");
        Ok(())
    }

    /// Removes everything [`apply`](Self::apply) wrote to `node`.
    pub fn detach(&self, tree: &mut SceneTree, node: NodeId) -> StyleResult<()> {
        let sealed = self.sealed()?;
        for trigger in &sealed.tables.event_triggers {
            trigger.disconnect(tree, node)?;
        }
        self.host(sealed, node).deactivate_all(tree)?;
        tree.clear_layer(node, ValueLayer::Style)?;
        debug!(?node, "detached style");
        Ok(())
    }

    /// Re-evaluates the rules reading `property` after it changed on `node`.
    pub fn invalidate(
        &self,
        tree: &mut SceneTree,
        node: NodeId,
        property: PropertyId,
        cx: &StyleContext<'_>,
    ) -> StyleResult<()> {
        let sealed = self.sealed()?;
        self.host(sealed, node).invalidate_property(tree, property, cx)
    }

    /// Re-evaluates the rules reading the binding `path` after its source changed.
    pub fn invalidate_binding(
        &self,
        tree: &mut SceneTree,
        node: NodeId,
        path: &str,
        cx: &StyleContext<'_>,
    ) -> StyleResult<()> {
        let sealed = self.sealed()?;
        self.host(sealed, node).invalidate_binding(tree, path, cx)
    }

    /// Re-resolves the setters referencing `key` after the resource changed for `node`.
    pub fn invalidate_resource(
        &self,
        tree: &mut SceneTree,
        node: NodeId,
        key: ResourceKey,
        cx: &StyleContext<'_>,
    ) -> StyleResult<()> {
        let sealed = self.sealed()?;
        self.host(sealed, node)
            .invalidate_resource(tree, ValueLayer::Style, key, cx)
    }

    fn host<'a>(&self, sealed: &'a SealedStyle, node: NodeId) -> RuleHost<'a> {
        RuleHost {
            tables: &sealed.tables,
            resources: &sealed.resources,
            layer: ValueLayer::Trigger,
            container: node,
        }
    }

    /// Returns `true` if both handles refer to the same style.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

fn seal_draft(registry: &PropertyRegistry, draft: &StyleDraft) -> StyleResult<SealedStyle> {
    let target_type = draft.target_type.clone().ok_or(StyleError::NullTargetType)?;

    let mut resources = SmallVec::new();
    resources.extend(draft.resources.clone());
    let mut tables = match &draft.based_on {
        Some(parent) => {
            let parent = parent.sealed()?;
            if !parent.target_type.is_assignable_from(&target_type) {
                return Err(StyleError::TargetTypeMismatch {
                    expected: parent.target_type.name(),
                    found: target_type.name(),
                });
            }
            resources.extend(parent.resources.iter().cloned());
            parent.tables.clone()
        }
        None => RuleTables::default(),
    };

    for setter in &draft.setters {
        if let Some(name) = setter.target_name() {
            return Err(StyleError::InvalidSetterTarget { name: name.into() });
        }
        check_not_style_reference(registry, ChildIndex::SELF, setter.property())?;
        tables.insert_setter(ChildIndex::SELF, setter.clone());
    }
    for trigger in &draft.triggers {
        match trigger {
            Trigger::Conditional(rule) => tables.push_rule(registry, rule, &StyleScope)?,
            Trigger::Event(event) => {
                if let Some(name) = event.source_name() {
                    return Err(StyleError::InvalidConditionTarget {
                        name: name.to_string(),
                    });
                }
                event.seal()?;
                event.validate(registry)?;
                tables.event_triggers.push(event.clone());
            }
        }
    }

    Ok(SealedStyle {
        target_type,
        tables,
        resources,
    })
}
