//! Criterion micro-benchmarks for batch submission and frame stepping.

use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use rivet_bench::{populate, profile_config};
use rivet_core::ThreadingMode;
use rivet_engine::{CommandBatch, Dispatcher, SolverRegistry};

/// Flush a 256-command batch and drain it.
fn bench_batch_flush_256(c: &mut Criterion) {
    let registry = SolverRegistry::new(profile_config(ThreadingMode::TaskGraph)).unwrap();
    let solvers = populate(&registry, 4);
    let counter = Arc::new(AtomicU64::new(0));

    c.bench_function("batch_flush_256", |b| {
        b.iter(|| {
            let mut batch = CommandBatch::new();
            for i in 0..256usize {
                let counter = Arc::clone(&counter);
                match i % 3 {
                    0 => batch.enqueue_global(move || {
                        counter.fetch_add(1, Ordering::Relaxed);
                    }),
                    1 => batch.enqueue_task(move |_| {
                        counter.fetch_add(1, Ordering::Relaxed);
                    }),
                    _ => batch.enqueue_solver(&solvers[i % solvers.len()], move |_| {
                        counter.fetch_add(1, Ordering::Relaxed);
                    }),
                }
            }
            batch.flush(&registry);
            black_box(registry.execute());
        });
    });
}

/// One synchronous frame over 64 active solvers.
fn bench_sync_frame_64(c: &mut Criterion) {
    let registry = SolverRegistry::new(profile_config(ThreadingMode::Synchronous)).unwrap();
    populate(&registry, 64);

    c.bench_function("sync_frame_64", |b| {
        b.iter(|| black_box(registry.start_frame(1.0 / 60.0).wait()));
    });
}

/// One task-graph frame over 64 active solvers.
fn bench_task_graph_frame_64(c: &mut Criterion) {
    let registry = SolverRegistry::new(profile_config(ThreadingMode::TaskGraph)).unwrap();
    populate(&registry, 64);

    c.bench_function("task_graph_frame_64", |b| {
        b.iter(|| black_box(registry.start_frame(1.0 / 60.0).wait()));
    });
}

criterion_group!(
    benches,
    bench_batch_flush_256,
    bench_sync_frame_64,
    bench_task_graph_frame_64
);
criterion_main!(benches);
