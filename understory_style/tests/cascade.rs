// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Style cascades applied to scene nodes.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use understory_property::{
    ErasedValue, Property, PropertyMetadataBuilder, PropertyRegistry, ValueLayer,
};
use understory_scene::{ChildIndex, EventId, NodeId, NodeKind, NodeType, SceneTree};
use understory_style::{
    Binding, Condition, ConditionalRule, ErrorKind, EventTrigger, ResourceDictionary, ResourceKey,
    Setter, SetterValue, Style, StyleContext, StyleError, TriggerAction,
};

const CLICK: EventId = EventId::FIRST_CUSTOM;
const ACCENT: ResourceKey = ResourceKey::new(0);
const MISSING: ResourceKey = ResourceKey::new(9);

struct Props {
    registry: Arc<PropertyRegistry>,
    width: Property<f64>,
    height: Property<f64>,
    opacity: Property<f64>,
    hovered: Property<bool>,
    pressed: Property<bool>,
    color: Property<u32>,
}

fn props() -> Props {
    let mut registry = PropertyRegistry::new();
    let width = registry.register("Width", PropertyMetadataBuilder::new(0.0_f64).build());
    let height = registry.register("Height", PropertyMetadataBuilder::new(0.0_f64).build());
    let opacity = registry.register("Opacity", PropertyMetadataBuilder::new(1.0_f64).build());
    let hovered = registry.register("IsHovered", PropertyMetadataBuilder::new(false).build());
    let pressed = registry.register("IsPressed", PropertyMetadataBuilder::new(false).build());
    let color = registry.register("Color", PropertyMetadataBuilder::new(0_u32).build());
    Props {
        registry: Arc::new(registry),
        width,
        height,
        opacity,
        hovered,
        pressed,
        color,
    }
}

fn button() -> NodeType {
    NodeType::builder("Button", NodeKind::Visual).build()
}

fn literal(setter: Option<&Setter>) -> Option<ErasedValue> {
    setter.and_then(|s| s.value().as_literal().cloned())
}

#[test]
fn derived_assignment_overrides_base() {
    let p = props();
    let ty = button();
    let base = Style::for_type(&p.registry, &ty);
    base.add_setter(Setter::literal(&p.registry, p.width, 1.0).unwrap())
        .unwrap();
    base.add_setter(Setter::literal(&p.registry, p.height, 5.0).unwrap())
        .unwrap();
    let derived = Style::for_type(&p.registry, &ty);
    derived.set_based_on(&base).unwrap();
    derived
        .add_setter(Setter::literal(&p.registry, p.width, 2.0).unwrap())
        .unwrap();

    derived.seal().unwrap();
    assert!(base.is_sealed());

    let width = p.width.id();
    let height = p.height.id();
    assert_eq!(
        literal(derived.find_property_assignment(ChildIndex::SELF, width)),
        Some(ErasedValue::new(2.0_f64))
    );
    assert_eq!(
        literal(derived.find_property_assignment(ChildIndex::SELF, height)),
        Some(ErasedValue::new(5.0_f64))
    );
    assert_eq!(
        literal(base.find_property_assignment(ChildIndex::SELF, width)),
        Some(ErasedValue::new(1.0_f64))
    );

    let mut tree = SceneTree::new(Arc::clone(&p.registry));
    let node = tree.create_node(&ty);
    derived.apply(&mut tree, node, &StyleContext::default()).unwrap();
    assert_eq!(tree.get_value(node, p.width), Some(2.0));
    assert_eq!(tree.get_value(node, p.height), Some(5.0));
    assert_eq!(tree.value_source(node, width), Some(ValueLayer::Style));
}

#[test]
fn circular_based_on_chain_is_rejected() {
    let p = props();
    let ty = button();
    let a = Style::for_type(&p.registry, &ty);
    let b = Style::for_type(&p.registry, &ty);
    a.set_based_on(&b).unwrap();
    b.set_based_on(&a).unwrap();

    let err = a.seal().unwrap_err();
    assert_eq!(err, StyleError::CircularInheritance);
    assert_eq!(err.kind(), ErrorKind::CircularInheritance);
    assert_eq!(b.seal(), Err(StyleError::CircularInheritance));
    assert!(!a.is_sealed());
    assert!(!b.is_sealed());
}

#[test]
fn based_on_type_must_be_assignable() {
    let p = props();
    let control = NodeType::builder("Control", NodeKind::Visual).build();
    let toggle = NodeType::builder("Toggle", NodeKind::Visual)
        .base(&control)
        .build();
    let unrelated = button();

    let base = Style::for_type(&p.registry, &control);
    let derived = Style::for_type(&p.registry, &toggle);
    derived.set_based_on(&base).unwrap();
    derived.seal().unwrap();

    let wrong = Style::for_type(&p.registry, &unrelated);
    wrong.set_based_on(&base).unwrap();
    assert!(matches!(
        wrong.seal(),
        Err(StyleError::TargetTypeMismatch { .. })
    ));
    assert_eq!(
        Style::new(&p.registry).seal(),
        Err(StyleError::NullTargetType)
    );
}

#[test]
fn sealing_twice_is_idempotent_and_freezes_edits() {
    let p = props();
    let style = Style::for_type(&p.registry, &button());
    style
        .add_setter(Setter::literal(&p.registry, p.opacity, 0.5).unwrap())
        .unwrap();
    let rule = ConditionalRule::property(Condition::property(p.hovered, true)).unwrap();
    rule.add_setter(Setter::literal(&p.registry, p.opacity, 1.0).unwrap())
        .unwrap();
    style.add_trigger(rule.clone()).unwrap();

    style.seal().unwrap();
    let first = literal(style.find_property_assignment(ChildIndex::SELF, p.opacity.id()));
    style.seal().unwrap();
    let second = literal(style.find_property_assignment(ChildIndex::SELF, p.opacity.id()));
    assert_eq!(first, second);
    assert_eq!(style.find_conditional_rules_for(p.hovered.id()).len(), 1);

    let late = Setter::literal(&p.registry, p.width, 3.0).unwrap();
    let err = style.add_setter(late.clone()).unwrap_err();
    assert!(matches!(err, StyleError::Sealed { .. }));
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert!(rule.is_sealed());
    assert!(matches!(
        rule.add_setter(late),
        Err(StyleError::Sealed { .. })
    ));
    rule.seal().unwrap();
}

#[test]
fn style_setters_cannot_target_named_children() {
    let p = props();
    let style = Style::for_type(&p.registry, &button());
    style
        .add_setter(
            Setter::literal(&p.registry, p.width, 1.0)
                .unwrap()
                .with_target_name("Chrome"),
        )
        .unwrap();
    assert_eq!(
        style.seal(),
        Err(StyleError::InvalidSetterTarget {
            name: "Chrome".into()
        })
    );

    let style = Style::for_type(&p.registry, &button());
    let rule = ConditionalRule::property(
        Condition::property(p.hovered, true).with_source_name("Chrome"),
    )
    .unwrap();
    rule.add_setter(Setter::literal(&p.registry, p.width, 1.0).unwrap())
        .unwrap();
    style.add_trigger(rule).unwrap();
    assert_eq!(
        style.seal(),
        Err(StyleError::InvalidConditionTarget {
            name: "Chrome".into()
        })
    );
}

#[test]
fn later_active_rule_wins_and_unapply_restores() {
    let p = props();
    let ty = button();
    let style = Style::for_type(&p.registry, &ty);
    style
        .add_setter(Setter::literal(&p.registry, p.opacity, 0.8).unwrap())
        .unwrap();
    let hover = ConditionalRule::property(Condition::property(p.hovered, true)).unwrap();
    hover
        .add_setter(Setter::literal(&p.registry, p.opacity, 0.9).unwrap())
        .unwrap();
    let press = ConditionalRule::property(Condition::property(p.pressed, true)).unwrap();
    press
        .add_setter(Setter::literal(&p.registry, p.opacity, 0.5).unwrap())
        .unwrap();
    style.add_trigger(hover).unwrap();
    style.add_trigger(press).unwrap();

    let mut tree = SceneTree::new(Arc::clone(&p.registry));
    let node = tree.create_node(&ty);
    let cx = StyleContext::default();
    style.apply(&mut tree, node, &cx).unwrap();
    assert_eq!(tree.get_value(node, p.opacity), Some(0.8));

    tree.set_value(node, p.pressed, true).unwrap();
    style.invalidate(&mut tree, node, p.pressed.id(), &cx).unwrap();
    tree.set_value(node, p.hovered, true).unwrap();
    style.invalidate(&mut tree, node, p.hovered.id(), &cx).unwrap();
    assert_eq!(tree.get_value(node, p.opacity), Some(0.5));

    tree.set_value(node, p.pressed, false).unwrap();
    style.invalidate(&mut tree, node, p.pressed.id(), &cx).unwrap();
    assert_eq!(tree.get_value(node, p.opacity), Some(0.9));

    tree.set_value(node, p.hovered, false).unwrap();
    style.invalidate(&mut tree, node, p.hovered.id(), &cx).unwrap();
    assert_eq!(tree.get_value(node, p.opacity), Some(0.8));
    assert_eq!(tree.value_source(node, p.opacity.id()), Some(ValueLayer::Style));

    // Local values still take precedence over everything a style writes.
    tree.set_value(node, p.opacity, 0.1).unwrap();
    tree.set_value(node, p.pressed, true).unwrap();
    style.invalidate(&mut tree, node, p.pressed.id(), &cx).unwrap();
    assert_eq!(tree.get_value(node, p.opacity), Some(0.1));
}

#[test]
fn multi_condition_rule_needs_every_condition() {
    let p = props();
    let ty = button();
    let style = Style::for_type(&p.registry, &ty);
    let both = ConditionalRule::multi_property([
        Condition::property(p.hovered, true),
        Condition::property(p.pressed, true),
    ])
    .unwrap();
    both.add_setter(Setter::literal(&p.registry, p.width, 10.0).unwrap())
        .unwrap();
    style.add_trigger(both).unwrap();

    let mut tree = SceneTree::new(Arc::clone(&p.registry));
    let node = tree.create_node(&ty);
    let cx = StyleContext::default();
    style.apply(&mut tree, node, &cx).unwrap();

    tree.set_value(node, p.hovered, true).unwrap();
    style.invalidate(&mut tree, node, p.hovered.id(), &cx).unwrap();
    assert_eq!(tree.get_value(node, p.width), Some(0.0));

    tree.set_value(node, p.pressed, true).unwrap();
    style.invalidate(&mut tree, node, p.pressed.id(), &cx).unwrap();
    assert_eq!(tree.get_value(node, p.width), Some(10.0));
}

#[test]
fn exit_actions_run_before_enter_actions() {
    let p = props();
    let ty = button();
    let log = Arc::new(Mutex::new(Vec::new()));
    let record = |tag: &'static str| {
        let log = Arc::clone(&log);
        TriggerAction::invoke(move |_, _| log.lock().unwrap().push(tag))
    };

    let idle = ConditionalRule::property(Condition::property(p.hovered, false)).unwrap();
    idle.add_exit_action(record("idle exit")).unwrap();
    let hover = ConditionalRule::property(Condition::property(p.hovered, true)).unwrap();
    hover.add_enter_action(record("hover enter")).unwrap();
    hover
        .add_enter_action(TriggerAction::set_value(p.color, 0xff00ff))
        .unwrap();

    let style = Style::for_type(&p.registry, &ty);
    // Registered enter-first so ordering comes from the engine, not the list.
    style.add_trigger(hover).unwrap();
    style.add_trigger(idle).unwrap();

    let mut tree = SceneTree::new(Arc::clone(&p.registry));
    let node = tree.create_node(&ty);
    let cx = StyleContext::default();
    style.apply(&mut tree, node, &cx).unwrap();
    assert!(log.lock().unwrap().is_empty());

    tree.set_value(node, p.hovered, true).unwrap();
    style.invalidate(&mut tree, node, p.hovered.id(), &cx).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["idle exit", "hover enter"]);
    assert_eq!(tree.get_value(node, p.color), Some(0xff00ff));
    assert_eq!(tree.value_source(node, p.color.id()), Some(ValueLayer::Local));
}

#[test]
fn enter_actions_follow_declaration_order() {
    let p = props();
    let ty = button();
    let log = Arc::new(Mutex::new(Vec::new()));
    let record = |tag: &'static str| {
        let log = Arc::clone(&log);
        TriggerAction::invoke(move |_, _| log.lock().unwrap().push(tag))
    };

    // Created first, declared second.
    let second = ConditionalRule::property(Condition::property(p.hovered, true)).unwrap();
    second.add_enter_action(record("second")).unwrap();
    let first = ConditionalRule::property(Condition::property(p.hovered, true)).unwrap();
    first.add_enter_action(record("first")).unwrap();
    assert!(second.key() < first.key());

    let style = Style::for_type(&p.registry, &ty);
    style.add_trigger(first).unwrap();
    style.add_trigger(second).unwrap();

    let mut tree = SceneTree::new(Arc::clone(&p.registry));
    let node = tree.create_node(&ty);
    let cx = StyleContext::default();
    style.apply(&mut tree, node, &cx).unwrap();
    tree.set_value(node, p.hovered, true).unwrap();
    style.invalidate(&mut tree, node, p.hovered.id(), &cx).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
}

#[test]
fn self_referential_rule_is_rejected() {
    let p = props();
    let style = Style::for_type(&p.registry, &button());
    let rule = ConditionalRule::property(Condition::property(p.hovered, true)).unwrap();
    rule.add_setter(Setter::literal(&p.registry, p.hovered, false).unwrap())
        .unwrap();
    style.add_trigger(rule).unwrap();
    assert_eq!(
        style.seal(),
        Err(StyleError::SelfReferentialAssignment {
            property: p.hovered.id()
        })
    );
    assert!(!style.is_sealed());
}

#[test]
fn data_rule_follows_binding_invalidation() {
    let p = props();
    let ty = button();
    let flag = AtomicBool::new(false);
    let evaluator = |_: &SceneTree, binding: &Binding, _: NodeId| {
        (binding.path() == "Model.IsBusy").then(|| ErasedValue::new(flag.load(Ordering::Relaxed)))
    };
    let cx = StyleContext::default().with_bindings(&evaluator);

    let style = Style::for_type(&p.registry, &ty);
    let busy = ConditionalRule::data(Condition::binding(Binding::new("Model.IsBusy"), true)).unwrap();
    busy.add_setter(Setter::literal(&p.registry, p.opacity, 0.3).unwrap())
        .unwrap();
    style.add_trigger(busy).unwrap();

    let mut tree = SceneTree::new(Arc::clone(&p.registry));
    let node = tree.create_node(&ty);
    style.apply(&mut tree, node, &cx).unwrap();
    assert_eq!(tree.get_value(node, p.opacity), Some(1.0));

    flag.store(true, Ordering::Relaxed);
    // Unrelated paths re-evaluate nothing.
    style
        .invalidate_binding(&mut tree, node, "Model.Title", &cx)
        .unwrap();
    assert_eq!(tree.get_value(node, p.opacity), Some(1.0));
    style
        .invalidate_binding(&mut tree, node, "Model.IsBusy", &cx)
        .unwrap();
    assert_eq!(tree.get_value(node, p.opacity), Some(0.3));
}

#[test]
fn resources_resolve_through_chain_then_host() {
    let p = props();
    let ty = button();
    let theme = ResourceDictionary::new();
    theme.insert(ACCENT, 0x3366ff_u32).unwrap();
    let base = Style::for_type(&p.registry, &ty);
    base.set_resources(theme.clone()).unwrap();

    let style = Style::for_type(&p.registry, &ty);
    style.set_based_on(&base).unwrap();
    style
        .add_setter(Setter::new(&p.registry, p.color, SetterValue::Resource(ACCENT)).unwrap())
        .unwrap();
    style
        .add_setter(Setter::new(&p.registry, p.width, SetterValue::Resource(MISSING)).unwrap())
        .unwrap();

    let host_lookups = AtomicUsize::new(0);
    let host = |_: &SceneTree, _: NodeId, key: ResourceKey| {
        host_lookups.fetch_add(1, Ordering::Relaxed);
        (key == MISSING).then(|| ErasedValue::new(42.0_f64))
    };

    let mut tree = SceneTree::new(Arc::clone(&p.registry));
    let node = tree.create_node(&ty);
    style.apply(&mut tree, node, &StyleContext::default()).unwrap();
    assert_eq!(tree.get_value(node, p.color), Some(0x3366ff));
    // A miss leaves the property unset.
    assert_eq!(tree.value_source(node, p.width.id()), None);
    assert!(theme.is_frozen());
    assert!(theme.insert(MISSING, 1_u32).is_err());

    let other = tree.create_node(&ty);
    let cx = StyleContext::default().with_resources(&host);
    style.apply(&mut tree, other, &cx).unwrap();
    assert_eq!(tree.get_value(other, p.width), Some(42.0));
    assert_eq!(host_lookups.load(Ordering::Relaxed), 1);
}

#[test]
fn host_resource_changes_are_reapplied() {
    let p = props();
    let ty = button();
    let accent = AtomicU32::new(0x111111);
    let host = |_: &SceneTree, _: NodeId, key: ResourceKey| {
        (key == ACCENT).then(|| ErasedValue::new(accent.load(Ordering::Relaxed)))
    };
    let cx = StyleContext::default().with_resources(&host);

    let style = Style::for_type(&p.registry, &ty);
    style
        .add_setter(Setter::new(&p.registry, p.color, SetterValue::Resource(ACCENT)).unwrap())
        .unwrap();
    let hover = ConditionalRule::property(Condition::property(p.hovered, true)).unwrap();
    hover
        .add_setter(Setter::new(&p.registry, p.color, SetterValue::Resource(MISSING)).unwrap())
        .unwrap();
    style.add_trigger(hover).unwrap();

    let mut tree = SceneTree::new(Arc::clone(&p.registry));
    let node = tree.create_node(&ty);
    style.apply(&mut tree, node, &cx).unwrap();
    assert_eq!(tree.get_value(node, p.color), Some(0x111111));

    accent.store(0x222222, Ordering::Relaxed);
    // Unrelated keys leave the value alone.
    style.invalidate_resource(&mut tree, node, MISSING, &cx).unwrap();
    assert_eq!(tree.get_value(node, p.color), Some(0x111111));
    style.invalidate_resource(&mut tree, node, ACCENT, &cx).unwrap();
    assert_eq!(tree.get_value(node, p.color), Some(0x222222));
}

#[test]
fn detach_removes_style_and_trigger_values() {
    let p = props();
    let ty = button();
    let style = Style::for_type(&p.registry, &ty);
    style
        .add_setter(Setter::literal(&p.registry, p.width, 4.0).unwrap())
        .unwrap();
    let hover = ConditionalRule::property(Condition::property(p.hovered, true)).unwrap();
    hover
        .add_setter(Setter::literal(&p.registry, p.height, 8.0).unwrap())
        .unwrap();
    style.add_trigger(hover).unwrap();

    let mut tree = SceneTree::new(Arc::clone(&p.registry));
    let node = tree.create_node(&ty);
    tree.set_value(node, p.hovered, true).unwrap();
    let cx = StyleContext::default();
    style.apply(&mut tree, node, &cx).unwrap();
    assert_eq!(tree.get_value(node, p.height), Some(8.0));

    style.detach(&mut tree, node).unwrap();
    assert_eq!(tree.value_source(node, p.width.id()), None);
    assert_eq!(tree.value_source(node, p.height.id()), None);
    assert_eq!(tree.get_value(node, p.hovered), Some(true));
}

#[test]
fn style_rejects_nodes_of_other_types() {
    let p = props();
    let style = Style::for_type(&p.registry, &button());
    let mut tree = SceneTree::new(Arc::clone(&p.registry));
    let panel = tree.create_node(&NodeType::builder("Panel", NodeKind::Visual).build());
    assert!(matches!(
        style.apply(&mut tree, panel, &StyleContext::default()),
        Err(StyleError::TargetTypeMismatch {
            expected: "Button",
            found: "Panel"
        })
    ));
}

#[test]
fn event_trigger_fires_once_per_raise_while_connected() {
    let p = props();
    let ty = button();
    let clicks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&clicks);
    let trigger = EventTrigger::new(CLICK);
    trigger
        .add_action(TriggerAction::invoke(move |_, _| {
            counter.fetch_add(1, Ordering::Relaxed);
        }))
        .unwrap();
    let style = Style::for_type(&p.registry, &ty);
    style.add_trigger(trigger.clone()).unwrap();

    let mut tree = SceneTree::new(Arc::clone(&p.registry));
    let host = tree.create_node(&ty);
    style.apply(&mut tree, host, &StyleContext::default()).unwrap();
    assert!(trigger.is_connected(host));

    tree.raise_event(host, CLICK).unwrap();
    assert_eq!(clicks.load(Ordering::Relaxed), 1);

    style.detach(&mut tree, host).unwrap();
    tree.raise_event(host, CLICK).unwrap();
    assert_eq!(clicks.load(Ordering::Relaxed), 1);
}

#[test]
fn value_actions_are_checked_when_sealed() {
    let mut registry = PropertyRegistry::new();
    let serial = registry.register(
        "Serial",
        PropertyMetadataBuilder::new(0_u32).read_only(true).build(),
    );
    let width = registry.register("Width", PropertyMetadataBuilder::new(0.0_f64).build());
    let pressed = registry.register("IsPressed", PropertyMetadataBuilder::new(false).build());
    let registry = Arc::new(registry);
    let ty = button();

    let trigger = EventTrigger::new(CLICK);
    trigger
        .add_action(TriggerAction::set_value(serial, 7))
        .unwrap();
    let style = Style::for_type(&registry, &ty);
    style.add_trigger(trigger).unwrap();
    assert_eq!(
        style.seal(),
        Err(StyleError::ReadOnlyProperty {
            property: serial.id()
        })
    );
    assert!(!style.is_sealed());

    let rule = ConditionalRule::property(Condition::property(pressed, true)).unwrap();
    rule.add_exit_action(TriggerAction::SetValue {
        property: width.id(),
        value: ErasedValue::new("wide"),
    })
    .unwrap();
    let style = Style::for_type(&registry, &ty);
    style.add_trigger(rule).unwrap();
    assert!(matches!(
        style.seal(),
        Err(StyleError::InvalidValue { property, .. }) if property == width.id()
    ));
}

const FLAG_NAMES: [&str; 6] = ["F0", "F1", "F2", "F3", "F4", "F5"];

proptest! {
    #[test]
    fn last_active_rule_supplies_the_value(
        initial in prop::collection::vec(any::<bool>(), FLAG_NAMES.len()),
        toggles in prop::collection::vec(0..FLAG_NAMES.len(), 0..16),
    ) {
        let mut registry = PropertyRegistry::new();
        let width = registry.register("Width", PropertyMetadataBuilder::new(-1.0_f64).build());
        let flags: Vec<Property<bool>> = FLAG_NAMES
            .iter()
            .map(|name| registry.register(*name, PropertyMetadataBuilder::new(false).build()))
            .collect();
        let registry = Arc::new(registry);

        let ty = button();
        let style = Style::for_type(&registry, &ty);
        for (i, flag) in flags.iter().enumerate() {
            let rule = ConditionalRule::property(Condition::property(*flag, true)).unwrap();
            rule.add_setter(Setter::literal(&registry, width, i as f64).unwrap()).unwrap();
            style.add_trigger(rule).unwrap();
        }

        let mut tree = SceneTree::new(Arc::clone(&registry));
        let node = tree.create_node(&ty);
        let mut state = initial.clone();
        for (flag, on) in flags.iter().zip(&state) {
            tree.set_value(node, *flag, *on).unwrap();
        }
        let cx = StyleContext::default();
        style.apply(&mut tree, node, &cx).unwrap();

        for i in toggles {
            state[i] = !state[i];
            tree.set_value(node, flags[i], state[i]).unwrap();
            style.invalidate(&mut tree, node, flags[i].id(), &cx).unwrap();
        }

        let expected = state.iter().rposition(|on| *on).map_or(-1.0, |i| i as f64);
        prop_assert_eq!(tree.get_value(node, width), Some(expected));
    }
}
