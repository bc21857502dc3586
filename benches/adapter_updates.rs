use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use registro::registry::CollectorRegistry;
use registro::storage::{Adapter, InMemory, Sqlite};

const NUM_THREADS: usize = 8;
const ITERATIONS_PER_THREAD: usize = 10_000;

fn hammer(adapter: Arc<dyn Adapter>) -> f64 {
    let registry = CollectorRegistry::new(adapter);
    let counter = registry
        .register_counter("bench", "requests_total", "Benchmark requests", &["method"])
        .unwrap();
    let mut handles = vec![];

    for _ in 0..NUM_THREADS {
        let counter = counter.clone();
        let handle = thread::spawn(move || {
            for _ in 0..ITERATIONS_PER_THREAD {
                counter.inc(&["GET"]).unwrap();
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    registry.collect().unwrap()[0].samples[0].value
}

fn bench_counter_increments(c: &mut Criterion) {
    let mut group = c.benchmark_group("counter_increment");
    group.sample_size(10);
    let label = format!("{}threads x {}iter", NUM_THREADS, ITERATIONS_PER_THREAD);

    group.bench_function(BenchmarkId::new("InMemory", &label), |b| {
        b.iter(|| black_box(hammer(Arc::new(InMemory::new()))))
    });

    group.bench_function(BenchmarkId::new("Sqlite (:memory:)", &label), |b| {
        b.iter(|| black_box(hammer(Arc::new(Sqlite::in_memory()))))
    });

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bench.sqlite");
    group.bench_function(BenchmarkId::new("Sqlite (file, WAL)", &label), |b| {
        b.iter(|| {
            let adapter = Arc::new(Sqlite::new(&path));
            adapter.wipe_storage().unwrap();
            black_box(hammer(adapter))
        })
    });

    group.finish();
}

fn bench_histogram_observations(c: &mut Criterion) {
    let mut group = c.benchmark_group("histogram_observe");

    group.bench_function("InMemory (default buckets)", |b| {
        let registry = CollectorRegistry::new(Arc::new(InMemory::new()));
        let histogram = registry
            .register_histogram("bench", "latency_seconds", "Benchmark latency", &[], None)
            .unwrap();
        let mut value = 0.0;
        b.iter(|| {
            value = (value + 0.37) % 12.0;
            histogram.observe(black_box(value), &[]).unwrap();
        })
    });

    group.bench_function("collect (InMemory, 100 series)", |b| {
        let registry = CollectorRegistry::new(Arc::new(InMemory::new()));
        let histogram = registry
            .register_histogram("bench", "latency_seconds", "Benchmark latency", &["id"], None)
            .unwrap();
        for i in 0..100 {
            let id = i.to_string();
            histogram.observe(i as f64 / 10.0, &[id.as_str()]).unwrap();
        }
        b.iter(|| black_box(registry.collect().unwrap()))
    });

    group.finish();
}

criterion_group!(benches, bench_counter_increments, bench_histogram_observations);
criterion_main!(benches);
