//! High-contention and repeated-lifecycle checks.

use std::time::Duration;

use crate::{CollectSink, FnTransform, Identity, IterSource, Pipeline};

/// Eight workers over nine slots a side, 100k trivial items: every item
/// arrives exactly once.
#[test]
fn conservation_under_contention() {
    let total = 100_000u64;
    let mut pipeline = Pipeline::builder(
        IterSource::new(0..total),
        FnTransform::new(|x: u64| x),
        CollectSink::new(),
    )
    .workers(8)
    .producer_slots(9)
    .consumer_slots(9)
    .build();
    pipeline.start();
    pipeline.wait_for_finish().unwrap();

    let mut out = pipeline.into_sink().unwrap().into_items();
    assert_eq!(out.len() as u64, total);
    out.sort_unstable();
    out.dedup();
    assert_eq!(out.len() as u64, total);
}

/// Start/finish many short-lived pipelines back to back; shutdown must
/// leave nothing behind.
#[test]
fn repeated_short_runs_shut_down_cleanly() {
    for round in 0..20u64 {
        let mut pipeline = Pipeline::new(
            IterSource::new(0..round * 7),
            Identity,
            CollectSink::new(),
            3,
        );
        pipeline.start();
        pipeline.wait_for_finish().unwrap();
        assert!(pipeline.finished());
        let out = pipeline.into_sink().unwrap().into_items();
        assert_eq!(out.len() as u64, round * 7);
    }
}

#[test]
fn polling_stress_conserves_items() {
    let total = 20_000u64;
    let mut pipeline =
        Pipeline::builder(IterSource::new(0..total), Identity, CollectSink::new())
            .workers(4)
            .polling(Duration::from_millis(1))
            .build();
    pipeline.start();
    pipeline.wait_for_finish().unwrap();

    let mut out = pipeline.into_sink().unwrap().into_items();
    assert_eq!(out.len() as u64, total);
    out.sort_unstable();
    out.dedup();
    assert_eq!(out.len() as u64, total);
}
