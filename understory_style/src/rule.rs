// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conditional rules: setters and actions gated on conditions.
//!
//! A [`ConditionalRule`] is active while all of its [`Condition`]s hold.
//! While active its setters contribute values to the trigger layer of the
//! nodes it targets; activation and deactivation run its enter and exit
//! actions. Rules are shared handles and become immutable when sealed.

use core::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;
use understory_property::{PropertyId, PropertyRegistry};

use crate::action::TriggerAction;
use crate::condition::Condition;
use crate::error::{StyleError, StyleResult};
use crate::event_trigger::EventTrigger;
use crate::seal::SealCell;
use crate::setter::Setter;

static NEXT_RULE_KEY: AtomicU64 = AtomicU64::new(1);

/// The kind of a [`ConditionalRule`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// One property condition.
    Property,
    /// Several property conditions, all of which must hold.
    MultiProperty,
    /// One binding condition.
    Data,
    /// Several binding conditions, all of which must hold.
    MultiData,
}

impl RuleKind {
    const fn reads_bindings(self) -> bool {
        matches!(self, Self::Data | Self::MultiData)
    }
}

/// Setters plus enter/exit actions; the part of a rule that is edited until sealed.
#[derive(Clone, Debug, Default)]
pub(crate) struct RuleBody {
    pub(crate) setters: Vec<Setter>,
    pub(crate) enter_actions: Vec<TriggerAction>,
    pub(crate) exit_actions: Vec<TriggerAction>,
}

struct RuleInner {
    key: u64,
    kind: RuleKind,
    conditions: SmallVec<[Condition; 1]>,
    body: SealCell<RuleBody, RuleBody>,
}

impl fmt::Debug for RuleInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionalRule")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("conditions", &self.conditions)
            .field("sealed", &self.body.is_sealed())
            .finish_non_exhaustive()
    }
}

/// A shared rule whose setters apply while its conditions hold.
///
/// # Example
///
/// ```rust
/// use understory_property::{PropertyMetadataBuilder, PropertyRegistry};
/// use understory_style::{Condition, ConditionalRule, Setter};
///
/// let mut registry = PropertyRegistry::new();
/// let hovered = registry.register("IsHovered", PropertyMetadataBuilder::new(false).build());
/// let opacity = registry.register("Opacity", PropertyMetadataBuilder::new(1.0_f64).build());
///
/// let rule = ConditionalRule::property(Condition::property(hovered, true)).unwrap();
/// rule.add_setter(Setter::literal(&registry, opacity, 0.8).unwrap()).unwrap();
/// rule.seal().unwrap();
/// assert!(rule.add_setter(Setter::literal(&registry, opacity, 0.5).unwrap()).is_err());
/// ```
#[derive(Clone, Debug)]
pub struct ConditionalRule {
    inner: Arc<RuleInner>,
}

impl ConditionalRule {
    /// Creates a rule gated on one property condition.
    pub fn property(condition: Condition) -> StyleResult<Self> {
        Self::with_kind(RuleKind::Property, [condition])
    }

    /// Creates a rule gated on several property conditions.
    pub fn multi_property(conditions: impl IntoIterator<Item = Condition>) -> StyleResult<Self> {
        Self::with_kind(RuleKind::MultiProperty, conditions)
    }

    /// Creates a rule gated on one binding condition.
    pub fn data(condition: Condition) -> StyleResult<Self> {
        Self::with_kind(RuleKind::Data, [condition])
    }

    /// Creates a rule gated on several binding conditions.
    pub fn multi_data(conditions: impl IntoIterator<Item = Condition>) -> StyleResult<Self> {
        Self::with_kind(RuleKind::MultiData, conditions)
    }

    fn with_kind(kind: RuleKind, conditions: impl IntoIterator<Item = Condition>) -> StyleResult<Self> {
        let conditions: SmallVec<[Condition; 1]> = conditions.into_iter().collect();
        if conditions.is_empty() {
            return Err(StyleError::EmptyConditions);
        }
        if conditions
            .iter()
            .any(|c| c.is_binding() != kind.reads_bindings())
        {
            return Err(StyleError::ConditionKindMismatch);
        }
        Ok(Self {
            inner: Arc::new(RuleInner {
                key: NEXT_RULE_KEY.fetch_add(1, Ordering::Relaxed),
                kind,
                conditions,
                body: SealCell::new("conditional rule", RuleBody::default()),
            }),
        })
    }

    /// Returns the process-unique key used to track this rule's activity on nodes.
    ///
    /// The key is not an ordering rank; actions follow rule declaration order.
    #[must_use]
    #[inline]
    pub fn key(&self) -> u64 {
        self.inner.key
    }

    /// Returns the rule kind.
    #[must_use]
    #[inline]
    pub fn kind(&self) -> RuleKind {
        self.inner.kind
    }

    /// Returns the conditions, all of which must hold.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.inner.conditions
    }

    /// Adds a setter applied while the rule is active.
    pub fn add_setter(&self, setter: Setter) -> StyleResult<()> {
        self.inner.body.edit(|body| {
            body.setters.push(setter);
            Ok(())
        })
    }

    /// Adds an action run when the rule becomes active.
    pub fn add_enter_action(&self, action: TriggerAction) -> StyleResult<()> {
        self.inner.body.edit(|body| {
            body.enter_actions.push(action);
            Ok(())
        })
    }

    /// Adds an action run when the rule stops being active.
    pub fn add_exit_action(&self, action: TriggerAction) -> StyleResult<()> {
        self.inner.body.edit(|body| {
            body.exit_actions.push(action);
            Ok(())
        })
    }

    /// Returns a copy of the rule's setters.
    #[must_use]
    pub fn setters(&self) -> Vec<Setter> {
        match self.inner.body.sealed() {
            Some(body) => body.setters.clone(),
            None => self.inner.body.read(|body| body.setters.clone()),
        }
    }

    /// Freezes the rule.
    ///
    /// Fails with [`StyleError::SelfReferentialAssignment`] if a setter writes
    /// the property a condition reads on the same node. Sealing twice is a no-op.
    pub fn seal(&self) -> StyleResult<()> {
        self.sealed_body().map(|_| ())
    }

    /// Returns `true` once the rule is sealed.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.inner.body.is_sealed()
    }

    pub(crate) fn sealed_body(&self) -> StyleResult<&RuleBody> {
        let conditions = &self.inner.conditions;
        self.inner.body.seal_with(|body| {
            for setter in &body.setters {
                let reads_itself = conditions.iter().any(|c| {
                    c.property_id() == Some(setter.property())
                        && c.source_name() == setter.target_name()
                });
                if reads_itself {
                    return Err(StyleError::SelfReferentialAssignment {
                        property: setter.property(),
                    });
                }
            }
            Ok(body.clone())
        })
    }

    pub(crate) fn validate(&self, registry: &PropertyRegistry) -> StyleResult<()> {
        for condition in self.conditions() {
            condition.validate(registry)?;
        }
        for setter in self.setters() {
            setter.validate(registry)?;
        }
        let actions = match self.inner.body.sealed() {
            Some(body) => actions_of(body),
            None => self.inner.body.read(actions_of),
        };
        for action in &actions {
            action.validate(registry)?;
        }
        Ok(())
    }

    /// Returns `true` if a property condition reads `property`.
    #[must_use]
    pub fn reads_property(&self, property: PropertyId) -> bool {
        self.conditions()
            .iter()
            .any(|c| c.property_id() == Some(property))
    }

    /// Returns `true` if both handles refer to the same rule.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

fn actions_of(body: &RuleBody) -> Vec<TriggerAction> {
    body.enter_actions
        .iter()
        .chain(&body.exit_actions)
        .cloned()
        .collect()
}

/// Any rule that can be attached to a style or template.
#[derive(Clone, Debug)]
pub enum Trigger {
    /// A rule gated on conditions.
    Conditional(ConditionalRule),
    /// Actions run when an event fires.
    Event(EventTrigger),
}

impl Trigger {
    /// Seals the underlying rule.
    pub fn seal(&self) -> StyleResult<()> {
        match self {
            Self::Conditional(rule) => rule.seal(),
            Self::Event(trigger) => trigger.seal(),
        }
    }
}

impl From<ConditionalRule> for Trigger {
    fn from(rule: ConditionalRule) -> Self {
        Self::Conditional(rule)
    }
}

impl From<EventTrigger> for Trigger {
    fn from(trigger: EventTrigger) -> Self {
        Self::Event(trigger)
    }
}

#[cfg(test)]
mod tests {
    use understory_property::{ErasedValue, PropertyMetadataBuilder};

    use super::*;
    use crate::binding::Binding;

    fn registry() -> (PropertyRegistry, PropertyId, PropertyId) {
        let mut registry = PropertyRegistry::new();
        let pressed = registry.register("IsPressed", PropertyMetadataBuilder::new(false).build());
        let scale = registry.register("Scale", PropertyMetadataBuilder::new(1.0_f64).build());
        (registry, pressed.id(), scale.id())
    }

    #[test]
    fn kinds_check_their_conditions() {
        let binding = Condition::binding(Binding::new("Busy"), true);
        assert_eq!(
            ConditionalRule::property(binding.clone()).unwrap_err(),
            StyleError::ConditionKindMismatch
        );
        assert!(ConditionalRule::data(binding).is_ok());
        assert_eq!(
            ConditionalRule::multi_property([]).unwrap_err(),
            StyleError::EmptyConditions
        );
    }

    #[test]
    fn keys_are_unique() {
        let (_, pressed, _) = registry();
        let condition = Condition::property_erased(pressed, ErasedValue::new(true));
        let a = ConditionalRule::property(condition.clone()).unwrap();
        let b = ConditionalRule::property(condition).unwrap();
        assert_ne!(a.key(), b.key());
        assert!(a.clone().ptr_eq(&a));
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn self_referential_rule_fails_to_seal() {
        let (registry, pressed, _) = registry();
        let condition = Condition::property_erased(pressed, ErasedValue::new(true));
        let rule = ConditionalRule::property(condition).unwrap();
        rule.add_setter(
            Setter::new(&registry, pressed, ErasedValue::new(false)).unwrap(),
        )
        .unwrap();
        assert_eq!(
            rule.seal(),
            Err(StyleError::SelfReferentialAssignment { property: pressed })
        );
        assert!(!rule.is_sealed());
    }

    #[test]
    fn same_property_on_another_child_is_allowed() {
        let (registry, pressed, scale) = registry();
        let condition = Condition::property_erased(pressed, ErasedValue::new(true));
        let rule = ConditionalRule::property(condition).unwrap();
        rule.add_setter(
            Setter::new(&registry, pressed, ErasedValue::new(true))
                .unwrap()
                .with_target_name("Inner"),
        )
        .unwrap();
        rule.add_setter(Setter::new(&registry, scale, ErasedValue::new(0.9)).unwrap())
            .unwrap();
        rule.seal().unwrap();
        rule.seal().unwrap();
        assert_eq!(rule.setters().len(), 2);
        assert!(rule.reads_property(pressed));
    }
}
