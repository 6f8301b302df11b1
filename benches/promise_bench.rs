//! Promise and cleanup benchmarks
//!
//! Measures the cost of the completion path (create a promise, complete it,
//! read the result) and of tearing down owners with many registered objects.
//!
//! ## Running Benchmarks
//! ```bash
//! cargo bench --bench promise_bench
//!
//! # Specific benchmark
//! cargo bench --bench promise_bench -- cleanup_all/1024
//! ```

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use firebase_sdk_core::{
    ApiId, CleanupRegistry, Dependent, FutureManager, ObjectId, PromiseFactory, ERROR_NONE,
};
use std::thread;

#[derive(Debug, Clone, Copy)]
enum BenchFn {
    Get,
}

impl ApiId for BenchFn {
    const COUNT: usize = 1;

    fn index(self) -> usize {
        self as usize
    }
}

/// Create, complete, and read one promise
fn bench_promise_roundtrip(c: &mut Criterion) {
    let cleanup = CleanupRegistry::new();
    let manager = FutureManager::new();
    let factory = PromiseFactory::<BenchFn>::new(&cleanup, &manager);

    c.bench_function("promise_roundtrip", |b| {
        b.iter(|| {
            let promise = factory.create_promise::<u64>(BenchFn::Get);
            let future = promise.future();
            promise.set_value(black_box(7));
            black_box(future.result())
        })
    });
}

/// Promises completed from a background thread, batch sizes 1..256
fn bench_cross_thread_completion(c: &mut Criterion) {
    let cleanup = CleanupRegistry::new();
    let manager = FutureManager::new();
    let factory = PromiseFactory::<BenchFn>::new(&cleanup, &manager);

    let mut group = c.benchmark_group("cross_thread_completion");
    for batch in [1_usize, 16, 256] {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            b.iter(|| {
                let promises: Vec<_> = (0..batch)
                    .map(|_| factory.create_promise::<u64>(BenchFn::Get))
                    .collect();
                let futures: Vec<_> = promises.iter().map(|p| p.future()).collect();
                let completer = thread::spawn(move || {
                    for (i, promise) in promises.into_iter().enumerate() {
                        promise.set_value(i as u64);
                    }
                });
                completer.join().expect("completer thread");
                for future in &futures {
                    black_box(future.error() == ERROR_NONE);
                }
            })
        });
    }
    group.finish();
}

/// Tear down a registry holding N dependents
fn bench_cleanup_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("cleanup_all");
    for count in [16_usize, 1024] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || {
                    let registry = CleanupRegistry::new();
                    let dependents: Vec<_> = (0..count)
                        .map(|i| Dependent::new(&registry, i))
                        .collect();
                    (registry, dependents)
                },
                |(registry, dependents)| {
                    black_box(registry.cleanup_all());
                    dependents
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

/// Allocate and release one table in a shared manager
fn bench_manager_alloc_release(c: &mut Criterion) {
    let manager = FutureManager::new();
    c.bench_function("manager_alloc_release", |b| {
        b.iter(|| {
            let owner = ObjectId::next();
            let table = manager.alloc_api(owner, 4);
            black_box(table.api_count());
            manager.release_api(owner)
        })
    });
}

criterion_group!(
    benches,
    bench_promise_roundtrip,
    bench_cross_thread_completion,
    bench_cleanup_all,
    bench_manager_alloc_release
);
criterion_main!(benches);
