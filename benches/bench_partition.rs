#[path = "shared.rs"]
mod shared;
use shared::*;

use criterion::{criterion_group, Criterion};
use sjoin::config::SortOrder;
use sjoin::engine::JoinStats;
use sjoin::entry::{Side, TreeEntry};
use sjoin::tree::build_tree;
use std::hint::black_box;

fn build_with(order: SortOrder) -> usize {
    let entries: Vec<TreeEntry> = generate_points(BENCH_DATASET_SIZE, 11)
        .into_iter()
        .enumerate()
        .map(|(i, object)| TreeEntry::new(object, Side::A, i as u32, BENCH_EPSILON))
        .collect();
    let ids: Vec<usize> = (0..entries.len()).collect();
    let mut stats = JoinStats::default();
    let tree = build_tree(black_box(&entries), &ids, order, 16, 4, &mut stats);
    tree.total_nodes()
}

fn bench_build_hilbert(c: &mut Criterion) {
    c.bench_function("partition_build_hilbert", |b| {
        b.iter(|| build_with(SortOrder::Hilbert))
    });
}

fn bench_build_center_x(c: &mut Criterion) {
    c.bench_function("partition_build_center_x", |b| {
        b.iter(|| build_with(SortOrder::CenterX))
    });
}

criterion_group! {
    name = benches;
    config = configure_criterion();
    targets = bench_build_hilbert, bench_build_center_x
}
