//! B-tree benchmarks for the storage core.
//!
//! Runs with `SyncMode::Off` so the numbers track codec and tree costs
//! rather than fsync latency; the durability path is exercised by the
//! test suite instead.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use duskdb::storage::Rid;
use duskdb::{BTree, SyncMode};
use tempfile::tempdir;

fn shuffled(count: u64) -> Vec<u64> {
    // Stride permutation; 7919 is prime and divides none of the counts
    // used below, so each key appears exactly once.
    (0..count).map(|i| (i * 7919) % count).collect()
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("btree_insert");

    for &count in &[100u64, 1000, 10_000] {
        group.throughput(Throughput::Elements(count));

        group.bench_with_input(BenchmarkId::new("sequential", count), &count, |b, &count| {
            b.iter_with_setup(
                || {
                    let dir = tempdir().unwrap();
                    let tree = BTree::open_with(dir.path().join("bench.idx"), SyncMode::Off).unwrap();
                    (dir, tree)
                },
                |(dir, mut tree)| {
                    for i in 0..count {
                        tree.insert(i, Rid::new(i as u32, 0)).unwrap();
                    }
                    (dir, tree)
                },
            );
        });

        group.bench_with_input(BenchmarkId::new("shuffled", count), &count, |b, &count| {
            b.iter_with_setup(
                || {
                    let dir = tempdir().unwrap();
                    let tree = BTree::open_with(dir.path().join("bench.idx"), SyncMode::Off).unwrap();
                    (dir, tree, shuffled(count))
                },
                |(dir, mut tree, keys)| {
                    for key in keys {
                        tree.insert(key, Rid::new(key as u32, 0)).unwrap();
                    }
                    (dir, tree)
                },
            );
        });
    }

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("btree_get");

    for &count in &[1000u64, 10_000] {
        let dir = tempdir().unwrap();
        let mut tree = BTree::open_with(dir.path().join("bench.idx"), SyncMode::Off).unwrap();
        for i in 0..count {
            tree.insert(i, Rid::new(i as u32, 0)).unwrap();
        }

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("point", count), &count, |b, &count| {
            let mut key = 0u64;
            b.iter(|| {
                key = (key + 7919) % count;
                black_box(tree.get(black_box(key)).unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_insert, bench_get);
criterion_main!(benches);
