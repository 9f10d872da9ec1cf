// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rule evaluation against a styled or templated container.
//!
//! Rule activity is recorded on the container node. When a rule changes
//! state, every `(child, property)` it writes is recomputed from scratch:
//! the last active rule with a setter for that pair wins, and if none
//! remains the layer value is cleared. Changes to the container's own
//! properties re-evaluate the rules that read them, each property at most
//! once per pass.

use hashbrown::HashSet;
use smallvec::SmallVec;
use tracing::trace;
use understory_property::{ErasedValue, PropertyId, ValueLayer};
use understory_scene::{ChildIndex, NodeId, SceneTree};

use crate::error::StyleResult;
use crate::resolve::StyleContext;
use crate::resources::{ResourceDictionary, ResourceKey};
use crate::tables::{ResolvedRule, RuleTables};

/// One sealed rule set bound to the container it is applied to.
pub(crate) struct RuleHost<'a> {
    pub(crate) tables: &'a RuleTables,
    pub(crate) resources: &'a [ResourceDictionary],
    pub(crate) layer: ValueLayer,
    pub(crate) container: NodeId,
}

impl RuleHost<'_> {
    /// Writes the unconditional setters into the host's setter layer.
    pub(crate) fn apply_setters(
        &self,
        tree: &mut SceneTree,
        layer: ValueLayer,
        cx: &StyleContext<'_>,
    ) -> StyleResult<()> {
        for ((child, property), setter) in &self.tables.setters {
            let Some(node) = tree.template_child(self.container, *child) else {
                continue;
            };
            let value = cx.resolve(tree, node, self.resources, setter.value());
            write_layer(tree, node, *property, layer, value)?;
        }
        Ok(())
    }

    /// Re-resolves every setter referencing `key`, unconditional ones into
    /// `layer` and rule setters into the host's rule layer.
    pub(crate) fn invalidate_resource(
        &self,
        tree: &mut SceneTree,
        layer: ValueLayer,
        key: ResourceKey,
        cx: &StyleContext<'_>,
    ) -> StyleResult<()> {
        let mut changed: SmallVec<[PropertyId; 4]> = SmallVec::new();
        for ((child, property), setter) in &self.tables.setters {
            if !setter.references_resource(key) {
                continue;
            }
            let Some(node) = tree.template_child(self.container, *child) else {
                continue;
            };
            let before = tree.get_erased(node, *property);
            let value = cx.resolve(tree, node, self.resources, setter.value());
            write_layer(tree, node, *property, layer, value)?;
            if child.is_self() && tree.get_erased(node, *property) != before {
                changed.push(*property);
            }
        }

        let mut touched: SmallVec<[(ChildIndex, PropertyId); 8]> = self
            .tables
            .rules
            .iter()
            .flat_map(|rule| rule.writes().zip(&rule.body.setters))
            .filter(|(_, setter)| setter.references_resource(key))
            .map(|(pair, _)| pair)
            .collect();
        touched.sort_unstable();
        touched.dedup();
        for (child, property) in touched {
            if self.recompute(tree, child, property, cx)? && child.is_self() {
                changed.push(property);
            }
        }

        let seeds = changed
            .iter()
            .flat_map(|property| self.tables.rules_for_property(*property))
            .copied()
            .collect();
        self.reevaluate(tree, seeds, cx)
    }

    /// Evaluates every rule.
    pub(crate) fn evaluate_all(&self, tree: &mut SceneTree, cx: &StyleContext<'_>) -> StyleResult<()> {
        self.reevaluate(tree, (0..self.tables.rules.len()).collect(), cx)
    }

    /// Re-evaluates the rules reading `property`.
    pub(crate) fn invalidate_property(
        &self,
        tree: &mut SceneTree,
        property: PropertyId,
        cx: &StyleContext<'_>,
    ) -> StyleResult<()> {
        let seeds = self.tables.rules_for_property(property).iter().copied().collect();
        self.reevaluate(tree, seeds, cx)
    }

    /// Re-evaluates the rules reading the binding `path`.
    pub(crate) fn invalidate_binding(
        &self,
        tree: &mut SceneTree,
        path: &str,
        cx: &StyleContext<'_>,
    ) -> StyleResult<()> {
        let seeds = self.tables.rules_for_binding(path).iter().copied().collect();
        self.reevaluate(tree, seeds, cx)
    }

    /// Deactivates every rule and clears the values they wrote. Runs no actions.
    pub(crate) fn deactivate_all(&self, tree: &mut SceneTree) -> StyleResult<()> {
        for rule in &self.tables.rules {
            if !tree.set_rule_active(self.container, rule.rule.key(), false)? {
                continue;
            }
            for (child, property) in rule.writes() {
                if let Some(node) = tree.template_child(self.container, child) {
                    tree.clear_layer_value(node, property, self.layer)?;
                }
            }
        }
        Ok(())
    }

    fn is_active(&self, tree: &SceneTree, rule: &ResolvedRule, cx: &StyleContext<'_>) -> bool {
        rule.rule
            .conditions()
            .iter()
            .zip(&rule.sources)
            .all(|(condition, source)| {
                tree.template_child(self.container, *source)
                    .is_some_and(|node| condition.matches(tree, node, cx))
            })
    }

    fn reevaluate(
        &self,
        tree: &mut SceneTree,
        mut pending: Vec<usize>,
        cx: &StyleContext<'_>,
    ) -> StyleResult<()> {
        let rules = &self.tables.rules;
        let mut settled: HashSet<PropertyId> = HashSet::new();
        let mut entered: SmallVec<[usize; 4]> = SmallVec::new();
        let mut exited: SmallVec<[usize; 4]> = SmallVec::new();

        while !pending.is_empty() {
            pending.sort_unstable();
            pending.dedup();
            let mut touched: SmallVec<[(ChildIndex, PropertyId); 8]> = SmallVec::new();
            for idx in core::mem::take(&mut pending) {
                let rule = &rules[idx];
                let active = self.is_active(tree, rule, cx);
                if tree.set_rule_active(self.container, rule.rule.key(), active)? {
                    trace!(container = ?self.container, rule = rule.rule.key(), active, "rule changed");
                    if active {
                        entered.push(idx);
                    } else {
                        exited.push(idx);
                    }
                    touched.extend(rule.writes());
                }
            }
            touched.sort_unstable();
            touched.dedup();
            for (child, property) in touched {
                let changed = self.recompute(tree, child, property, cx)?;
                if changed && child.is_self() && settled.insert(property) {
                    pending.extend_from_slice(self.tables.rules_for_property(property));
                }
            }
        }

        exited.sort_unstable();
        entered.sort_unstable();
        for idx in exited {
            for action in &rules[idx].body.exit_actions {
                action.run(tree, self.container)?;
            }
        }
        for idx in entered {
            for action in &rules[idx].body.enter_actions {
                action.run(tree, self.container)?;
            }
        }
        Ok(())
    }

    /// Recomputes the layer value of `(child, property)`. Returns `true` if
    /// the node's effective value changed.
    fn recompute(
        &self,
        tree: &mut SceneTree,
        child: ChildIndex,
        property: PropertyId,
        cx: &StyleContext<'_>,
    ) -> StyleResult<bool> {
        let Some(node) = tree.template_child(self.container, child) else {
            return Ok(false);
        };
        let before = tree.get_erased(node, property);
        let winner = self
            .tables
            .rules
            .iter()
            .rev()
            .filter(|rule| tree.is_rule_active(self.container, rule.rule.key()))
            .find_map(|rule| rule.setter_for(child, property));
        let value = winner.and_then(|setter| cx.resolve(tree, node, self.resources, setter.value()));
        write_layer(tree, node, property, self.layer, value)?;
        Ok(tree.get_erased(node, property) != before)
    }
}

/// Writes `value` into `layer`, or clears the layer when there is none.
fn write_layer(
    tree: &mut SceneTree,
    node: NodeId,
    property: PropertyId,
    layer: ValueLayer,
    value: Option<ErasedValue>,
) -> StyleResult<()> {
    match value {
        Some(value) => tree.set_layer_value(node, property, layer, value)?,
        None => tree.clear_layer_value(node, property, layer)?,
    };
    Ok(())
}
