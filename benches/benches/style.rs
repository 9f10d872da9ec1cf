// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Benchmarks for `understory_style` cascades and templates.

use std::sync::Arc;

use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use understory_property::{ErasedValue, Property, PropertyMetadataBuilder, PropertyRegistry};
use understory_scene::{NodeKind, NodeType, SceneTree, TypeCaps};
use understory_style::{
    Condition, ConditionalRule, FactoryNode, Setter, Style, StyleContext, Template,
};

const FLAGS: [&str; 8] = ["F0", "F1", "F2", "F3", "F4", "F5", "F6", "F7"];

fn bench_cascade(c: &mut Criterion) {
    let mut registry = PropertyRegistry::new();
    let width: Property<f64> =
        registry.register("Width", PropertyMetadataBuilder::new(0.0_f64).build());
    let flags: Vec<Property<bool>> = FLAGS
        .iter()
        .map(|name| registry.register(*name, PropertyMetadataBuilder::new(false).build()))
        .collect();
    let registry = Arc::new(registry);
    let button = NodeType::builder("Button", NodeKind::Visual).build();

    // A based-on chain four deep, each level adding a setter and two rules.
    let mut style = Style::for_type(&registry, &button);
    for depth in 0..4_u8 {
        let derived = Style::for_type(&registry, &button);
        derived.set_based_on(&style).unwrap();
        derived
            .add_setter(Setter::literal(&registry, width, f64::from(depth)).unwrap())
            .unwrap();
        for flag in &flags[usize::from(depth) * 2..usize::from(depth) * 2 + 2] {
            let rule = ConditionalRule::property(Condition::property(*flag, true)).unwrap();
            rule.add_setter(Setter::literal(&registry, width, 100.0).unwrap())
                .unwrap();
            derived.add_trigger(rule).unwrap();
        }
        style = derived;
    }
    style.seal().unwrap();

    let mut group = c.benchmark_group("style/cascade");
    let cx = StyleContext::default();
    group.bench_function("apply", |b| {
        b.iter_batched(
            || {
                let mut tree = SceneTree::new(Arc::clone(&registry));
                let node = tree.create_node(&button);
                (tree, node)
            },
            |(mut tree, node)| {
                style.apply(&mut tree, node, &cx).unwrap();
                black_box(tree)
            },
            BatchSize::SmallInput,
        );
    });

    let mut tree = SceneTree::new(Arc::clone(&registry));
    let node = tree.create_node(&button);
    style.apply(&mut tree, node, &cx).unwrap();
    let mut on = false;
    group.bench_function("toggle_invalidate", |b| {
        b.iter(|| {
            on = !on;
            tree.set_value(node, flags[3], on).unwrap();
            style.invalidate(&mut tree, node, flags[3].id(), &cx).unwrap();
            black_box(tree.get_value(node, width))
        });
    });
    group.finish();
}

fn bench_template(c: &mut Criterion) {
    let mut registry = PropertyRegistry::new();
    let text: Property<String> =
        registry.register("Text", PropertyMetadataBuilder::new(String::new()).build());
    let registry = Arc::new(registry);
    let host = NodeType::builder("Host", NodeKind::Visual).build();
    let panel = NodeType::builder("Panel", NodeKind::Visual)
        .capabilities(TypeCaps::ADD_CHILD)
        .build();
    let leaf = NodeType::builder("Leaf", NodeKind::Visual).build();

    let mut group = c.benchmark_group("style/template");
    for width in [4_usize, 32] {
        let root = FactoryNode::of_type(&panel);
        for _ in 0..width {
            let child = FactoryNode::of_type(&leaf);
            child
                .set_value(text, ErasedValue::new(String::from("cell")))
                .unwrap();
            root.append_child(&child).unwrap();
        }
        let template = Template::for_type(&registry, &host);
        template.set_root(&root).unwrap();
        template.seal().unwrap();

        group.bench_function(BenchmarkId::new("apply", width), |b| {
            b.iter_batched(
                || {
                    let mut tree = SceneTree::new(Arc::clone(&registry));
                    let node = tree.create_node(&host);
                    (tree, node)
                },
                |(mut tree, node)| {
                    let root = template
                        .apply(&mut tree, node, &StyleContext::default())
                        .unwrap();
                    black_box((tree, root))
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_cascade, bench_template);
criterion_main!(benches);
