// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Benchmarks for `understory_scene` walks and lifecycle broadcasts.

use std::sync::Arc;

use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use understory_property::PropertyRegistry;
use understory_scene::{
    EventId, LifecycleKind, NodeId, NodeKind, NodeType, SceneTree, TypeCaps, WalkPriority,
};

/// Builds a tree where every node has `fanout` children, `depth` levels deep.
fn build(depth: u32, fanout: u32, listeners: bool) -> (SceneTree, NodeId) {
    let panel = NodeType::builder("Panel", NodeKind::Visual)
        .capabilities(TypeCaps::ADD_CHILD)
        .build();
    let mut tree = SceneTree::new(Arc::new(PropertyRegistry::new()));
    let root = tree.create_node(&panel);
    let mut level = vec![root];
    for _ in 0..depth {
        let mut next = Vec::with_capacity(level.len() * fanout as usize);
        for parent in level {
            for _ in 0..fanout {
                let child = tree.create_node(&panel);
                tree.append_child(parent, child).unwrap();
                next.push(child);
            }
        }
        level = next;
    }
    if listeners {
        for leaf in level {
            tree.add_handler(leaf, EventId::LOADED, |_, _| {}).unwrap();
        }
    }
    (tree, root)
}

fn bench_walk(c: &mut Criterion) {
    let mut group = c.benchmark_group("scene/walk");
    for (depth, fanout) in [(4_u32, 4_u32), (6, 3)] {
        let (mut tree, root) = build(depth, fanout, false);
        for priority in [WalkPriority::RenderFirst, WalkPriority::LogicalFirst] {
            group.bench_function(
                BenchmarkId::new(format!("{priority:?}"), format!("{depth}x{fanout}")),
                |b| {
                    b.iter(|| {
                        let mut count = 0_usize;
                        tree.walk_descendants(root, priority, |_, _, _| {
                            count += 1;
                            true
                        })
                        .unwrap();
                        black_box(count)
                    });
                },
            );
        }
    }
    group.finish();
}

fn bench_broadcast(c: &mut Criterion) {
    let mut group = c.benchmark_group("scene/broadcast");
    for listeners in [false, true] {
        group.bench_function(BenchmarkId::new("loaded", listeners), |b| {
            b.iter_batched(
                || build(4, 4, listeners),
                |(mut tree, root)| black_box(tree.broadcast(root, LifecycleKind::Loaded).unwrap()),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_walk, bench_broadcast);
criterion_main!(benches);
