//! Pipeline throughput benchmarks.
//!
//! Compares the parallel pipeline at various worker counts against a
//! serial produce→transform→consume baseline on the same workload.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use conveyor::{CollectSink, FnTransform, IterSource, Pipeline};

const ITEMS: u64 = 100_000;

/// Cheap but non-trivial per-item work, so workers have something to chew.
fn mix(mut x: u64) -> u64 {
    for _ in 0..32 {
        x = x.wrapping_mul(0x9e37_79b9_7f4a_7c15).rotate_left(17) ^ 0x2545_f491_4f6c_dd1d;
    }
    x
}

fn serial_baseline(c: &mut Criterion) {
    let mut group = c.benchmark_group("ptc_serial");
    group.throughput(Throughput::Elements(ITEMS));
    group.bench_function("baseline", |b| {
        b.iter(|| {
            let mut out = Vec::with_capacity(ITEMS as usize);
            for i in 0..ITEMS {
                out.push(mix(black_box(i)));
            }
            out
        });
    });
    group.finish();
}

fn pipeline_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("ptc_pipeline");
    group.sample_size(20);

    for num_workers in [1, 2, 4, 8] {
        group.throughput(Throughput::Elements(ITEMS));
        group.bench_with_input(
            BenchmarkId::new("workers", num_workers),
            &num_workers,
            |b, &n| {
                b.iter(|| {
                    let mut pipeline = Pipeline::new(
                        IterSource::new(0..ITEMS),
                        FnTransform::new(|x: u64| mix(black_box(x))),
                        CollectSink::new(),
                        n,
                    );
                    pipeline.start();
                    pipeline.wait_for_finish().expect("pipeline failed");
                    pipeline.into_sink().expect("sink survives").into_items()
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, serial_baseline, pipeline_throughput);
criterion_main!(benches);
