//! Benchmarks for pathbind
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pathbind::{Binding, BindingServices, Dispose, ObservableList, PathBuilder, Record, Value};

// =============================================================================
// SCALAR BINDING BENCHMARKS
// =============================================================================

fn bench_bind_two_members(c: &mut Criterion) {
    c.bench_function("bind_two_members", |b| {
        b.iter(|| {
            let services = BindingServices::new();
            let root = Record::with([("a", Value::Int(1)), ("b", Value::Int(2))]);
            let binding = Binding::new(
                services,
                Value::object(root),
                PathBuilder::new().member("a").build(),
                PathBuilder::new().member("b").build(),
            );
            binding.bind().unwrap();
            black_box(binding)
        })
    });
}

fn bench_scalar_propagation(c: &mut Criterion) {
    let services = BindingServices::new();
    let root = Record::with([("a", Value::Int(0)), ("b", Value::Int(0))]);
    let binding = Binding::new(
        services,
        Value::object(root.clone()),
        PathBuilder::new().member("a").build(),
        PathBuilder::new().member("b").build(),
    );
    binding.bind().unwrap();

    let mut next = 0i64;
    c.bench_function("scalar_propagation", |b| {
        b.iter(|| {
            next += 1;
            root.set("b", Value::Int(black_box(next)));
        })
    });
}

fn bench_propagation_same_value(c: &mut Criterion) {
    let services = BindingServices::new();
    let root = Record::with([("a", Value::Int(42)), ("b", Value::Int(42))]);
    let binding = Binding::new(
        services,
        Value::object(root.clone()),
        PathBuilder::new().member("a").build(),
        PathBuilder::new().member("b").build(),
    );
    binding.bind().unwrap();

    c.bench_function("propagation_same_value", |b| {
        b.iter(|| {
            root.set("b", Value::Int(black_box(42)));
        })
    });
}

// =============================================================================
// COLLECTION BINDING BENCHMARKS
// =============================================================================

fn bench_collection_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection_push");
    for size in [16usize, 256, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let services = BindingServices::new();
            let start: Vec<Value> = (0..size as i64).map(Value::Int).collect();
            let source = ObservableList::from_values(start);
            let mirror = ObservableList::new();
            let root = Record::with([
                ("items", Value::list(source.clone())),
                ("mirror", Value::list(mirror)),
            ]);
            let binding = Binding::new(
                services,
                Value::object(root),
                PathBuilder::new()
                    .readonly_member("items")
                    .filter(|v| v.as_int().is_some_and(|n| n % 2 == 0))
                    .collection()
                    .build(),
                PathBuilder::new().readonly_member("mirror").collection().build(),
            );
            binding.bind().unwrap();

            let mut next = size as i64;
            b.iter(|| {
                next += 1;
                source.push(Value::Int(black_box(next)));
            });
            binding.dispose();
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_bind_two_members,
    bench_scalar_propagation,
    bench_propagation_same_value,
    bench_collection_push
);
criterion_main!(benches);
