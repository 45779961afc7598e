use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use treestate_core::{
    validate_global_keys, Component, ComponentContext, ComponentTree, InlineScheduler, Size,
};
use treestate_testing::{increment, keyed_counters_tree, LooperScheduler};

const ROOT_SIZE: Size = Size::new(1080.0, 1920.0);
const COUNTER_SAMPLES: &[usize] = &[8, 32, 128, 512];
const UPDATES_PER_REBUILD: usize = 16;

fn counter_keys(count: usize) -> Vec<String> {
    (0..count).map(|index| format!("c{index}")).collect()
}

fn counters_root(context: &ComponentContext, count: usize) -> Component {
    let keys = counter_keys(count);
    let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
    keyed_counters_tree(context, &keys)
}

fn bench_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("validate_global_keys");
    for &count in COUNTER_SAMPLES {
        let context = ComponentContext::new();
        let root = counters_root(&context, count);
        group.bench_with_input(BenchmarkId::new("counters", count), &root, |b, root| {
            b.iter(|| black_box(validate_global_keys(root)));
        });
    }
    group.finish();
}

fn bench_relayout(c: &mut Criterion) {
    let mut group = c.benchmark_group("relayout");
    for &count in COUNTER_SAMPLES {
        let context = ComponentContext::new();
        let tree = ComponentTree::builder(&context, counters_root(&context, count))
            .scheduler(Arc::new(InlineScheduler))
            .build();
        // Mount once so only state transfer is measured.
        let _ = tree.set_size(ROOT_SIZE);
        group.bench_function(BenchmarkId::new("counters", count), |b| {
            b.iter(|| black_box(tree.set_size(ROOT_SIZE)));
        });
    }
    group.finish();
}

fn bench_batched_updates(c: &mut Criterion) {
    let context = ComponentContext::new();
    let looper = Arc::new(LooperScheduler::new());
    let tree = ComponentTree::builder(&context, counters_root(&context, 64))
        .scheduler(looper.clone())
        .size(ROOT_SIZE)
        .build();
    let _ = tree.set_size(ROOT_SIZE);

    c.bench_function("enqueue_and_rebuild", |b| {
        b.iter(|| {
            for _ in 0..UPDATES_PER_REBUILD {
                tree.update_state_async("100,c7", increment());
            }
            looper.run_to_idle();
            black_box(tree.generation());
        });
    });
}

criterion_group!(rebuild, bench_validate, bench_relayout, bench_batched_updates);
criterion_main!(rebuild);
