// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Lookup tables computed when a style or template is sealed.

use std::sync::Arc;

use hashbrown::HashMap;
use smallvec::SmallVec;
use understory_property::{PropertyId, PropertyRegistry, PropertyRole};
use understory_scene::ChildIndex;

use crate::condition::ConditionSource;
use crate::error::{StyleError, StyleResult};
use crate::event_trigger::EventTrigger;
use crate::rule::{ConditionalRule, RuleBody};
use crate::setter::Setter;

/// Maps the names used by rules to template child indices.
pub(crate) trait NameScope {
    /// Resolves the node a condition reads from.
    fn condition_source(&self, name: &str) -> StyleResult<ChildIndex>;
    /// Resolves the node a setter writes to.
    fn setter_target(&self, name: &str) -> StyleResult<ChildIndex>;
}

/// A sealed rule with its names resolved against the owning style or template.
#[derive(Clone, Debug)]
pub(crate) struct ResolvedRule {
    pub(crate) rule: ConditionalRule,
    pub(crate) body: RuleBody,
    /// One entry per condition.
    pub(crate) sources: SmallVec<[ChildIndex; 2]>,
    /// One entry per setter.
    pub(crate) targets: SmallVec<[ChildIndex; 4]>,
}

impl ResolvedRule {
    /// Returns the last setter of this rule writing `property` on `child`.
    pub(crate) fn setter_for(&self, child: ChildIndex, property: PropertyId) -> Option<&Setter> {
        self.body
            .setters
            .iter()
            .zip(&self.targets)
            .rev()
            .find(|(setter, target)| **target == child && setter.property() == property)
            .map(|(setter, _)| setter)
    }

    /// Iterates the `(child, property)` pairs this rule writes.
    pub(crate) fn writes(&self) -> impl Iterator<Item = (ChildIndex, PropertyId)> + '_ {
        self.targets
            .iter()
            .zip(&self.body.setters)
            .map(|(target, setter)| (*target, setter.property()))
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct RuleTables {
    /// Merged unconditional setters, sorted by `(child, property)`.
    pub(crate) setters: Vec<((ChildIndex, PropertyId), Setter)>,
    /// Conditional rules in application order; later rules win.
    pub(crate) rules: Vec<ResolvedRule>,
    /// Rules reading each property, by index into `rules`.
    by_property: HashMap<PropertyId, SmallVec<[usize; 4]>>,
    /// Rules reading each binding path, by index into `rules`.
    by_binding: HashMap<Arc<str>, SmallVec<[usize; 4]>>,
    pub(crate) event_triggers: Vec<EventTrigger>,
}

impl RuleTables {
    /// Adds or overrides the unconditional setter for `(child, property)`.
    pub(crate) fn insert_setter(&mut self, child: ChildIndex, setter: Setter) {
        let key = (child, setter.property());
        match self.setters.binary_search_by_key(&key, |(k, _)| *k) {
            Ok(idx) => self.setters[idx].1 = setter,
            Err(idx) => self.setters.insert(idx, (key, setter)),
        }
    }

    pub(crate) fn setter(&self, child: ChildIndex, property: PropertyId) -> Option<&Setter> {
        self.setters
            .binary_search_by_key(&(child, property), |(k, _)| *k)
            .ok()
            .map(|idx| &self.setters[idx].1)
    }

    /// Seals `rule`, resolves its names and indexes it by what its conditions read.
    pub(crate) fn push_rule(
        &mut self,
        registry: &PropertyRegistry,
        rule: &ConditionalRule,
        scope: &dyn NameScope,
    ) -> StyleResult<()> {
        rule.validate(registry)?;
        let body = rule.sealed_body()?.clone();
        let sources = rule
            .conditions()
            .iter()
            .map(|c| resolve(c.source_name(), |name| scope.condition_source(name)))
            .collect::<StyleResult<SmallVec<_>>>()?;
        let targets = body
            .setters
            .iter()
            .map(|s| resolve(s.target_name(), |name| scope.setter_target(name)))
            .collect::<StyleResult<SmallVec<_>>>()?;
        for (setter, target) in body.setters.iter().zip(&targets) {
            check_not_style_reference(registry, *target, setter.property())?;
        }

        let idx = self.rules.len();
        for condition in rule.conditions() {
            let slot = match condition.source() {
                ConditionSource::Property(property) => self.by_property.entry(*property).or_default(),
                ConditionSource::Binding(binding) => self
                    .by_binding
                    .entry(Arc::clone(binding.shared_path()))
                    .or_default(),
            };
            if slot.last() != Some(&idx) {
                slot.push(idx);
            }
        }
        self.rules.push(ResolvedRule {
            rule: rule.clone(),
            body,
            sources,
            targets,
        });
        Ok(())
    }

    /// Indices of the rules reading `property`.
    pub(crate) fn rules_for_property(&self, property: PropertyId) -> &[usize] {
        self.by_property
            .get(&property)
            .map(|v| v.as_slice())
            .unwrap_or_default()
    }

    /// Indices of the rules reading the binding `path`.
    pub(crate) fn rules_for_binding(&self, path: &str) -> &[usize] {
        self.by_binding
            .get(path)
            .map(|v| v.as_slice())
            .unwrap_or_default()
    }
}

fn resolve(
    name: Option<&str>,
    lookup: impl FnOnce(&str) -> StyleResult<ChildIndex>,
) -> StyleResult<ChildIndex> {
    name.map_or(Ok(ChildIndex::SELF), lookup)
}

/// Rejects writes of the style-reference property onto the container itself.
pub(crate) fn check_not_style_reference(
    registry: &PropertyRegistry,
    target: ChildIndex,
    property: PropertyId,
) -> StyleResult<()> {
    if target.is_self() && registry.role(property) == Some(PropertyRole::StyleReference) {
        return Err(StyleError::ReservedProperty { property });
    }
    Ok(())
}
