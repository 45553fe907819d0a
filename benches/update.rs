//! Statistics Update Benchmarks
//!
//! Measures single-threaded update throughput per representation, contended
//! updates on one hot key, and collection cost.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use stataggr::aggregation::{AggregationType, Representation, StatisticsManager};
use stataggr::engine::StatisticsManagerBuilder;
use stataggr::schema::{DescriptorRegistry, FieldDescriptor, StatisticsEntry};
use stataggr::types::{EntryTypeId, ValueType};
use std::hint::black_box;
use std::sync::Arc;
use std::thread;

// =============================================================================
// Test Data Generators
// =============================================================================

struct Request {
    endpoint: u32,
    latency_us: i64,
}

impl StatisticsEntry for Request {
    fn fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::key("endpoint", ValueType::Int32)
                .with_getter(|r: &Request| r.endpoint as i32),
            FieldDescriptor::aggregated("latency_us", ValueType::Int64, AggregationType::ALL)
                .with_getter(|r: &Request| r.latency_us),
        ]
    }
}

const REPRESENTATIONS: [Representation; 3] = [
    Representation::Plain,
    Representation::Atomic,
    Representation::Adder,
];

fn manager(representation: Representation) -> Arc<StatisticsManager> {
    let registry = DescriptorRegistry::new();
    registry.register::<Request>();
    Arc::new(
        StatisticsManagerBuilder::new()
            .with_descriptor_source(registry)
            .with_default_representation(representation)
            .with_metrics(false)
            .build()
            .expect("manager should build"),
    )
}

fn requests(count: usize, endpoints: u32) -> Vec<Request> {
    (0..count)
        .map(|i| Request {
            endpoint: i as u32 % endpoints,
            latency_us: 100 + (i as i64 * 7919) % 5000,
        })
        .collect()
}

fn update(manager: &StatisticsManager, request: &Request) {
    manager
        .update_statistics(request, EntryTypeId::of::<Request>(), "requests")
        .expect("update should succeed");
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_single_thread_updates(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_single_thread");
    let batch = requests(10_000, 64);
    group.throughput(Throughput::Elements(batch.len() as u64));

    for representation in REPRESENTATIONS {
        let manager = manager(representation);
        group.bench_with_input(
            BenchmarkId::from_parameter(representation),
            &batch,
            |b, batch| {
                b.iter(|| {
                    for request in batch {
                        update(&manager, black_box(request));
                    }
                })
            },
        );
    }
    group.finish();
}

fn bench_contended_hot_key(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_hot_key");
    let threads = 4;
    let per_thread = 5_000;
    group.throughput(Throughput::Elements((threads * per_thread) as u64));

    for representation in REPRESENTATIONS {
        let manager = manager(representation);
        group.bench_function(BenchmarkId::from_parameter(representation), |b| {
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let manager = Arc::clone(&manager);
                        thread::spawn(move || {
                            for request in requests(per_thread, 1) {
                                update(&manager, &request);
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().expect("Thread panicked");
                }
            })
        });
    }
    group.finish();
}

fn bench_collect(c: &mut Criterion) {
    let mut group = c.benchmark_group("collect");

    for endpoints in [16u32, 1024] {
        let manager = manager(Representation::Atomic);
        for request in requests(endpoints as usize * 4, endpoints) {
            update(&manager, &request);
        }
        group.throughput(Throughput::Elements(endpoints as u64));
        group.bench_with_input(BenchmarkId::new("buckets", endpoints), &manager, |b, manager| {
            b.iter(|| black_box(manager.collect_statistics(Some("requests"), |_| true, false)))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_single_thread_updates,
    bench_contended_hot_key,
    bench_collect
);
criterion_main!(benches);
