use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::{IterSource, PipelineError, Producer, SleepPoll, Source};

#[test]
fn drains_source_to_eof() {
    let mut producer = Producer::new(IterSource::new(0..100u64));
    producer.start(4);

    let mut got = Vec::new();
    while let Some(item) = producer.take() {
        got.push(item);
    }
    got.sort_unstable();
    assert_eq!(got, (0..100).collect::<Vec<_>>());
    assert!(producer.eof());
    assert!(producer.idle());
    assert_eq!(producer.items_produced(), 100);
    assert!(producer.take_failure().is_none());
}

#[test]
fn empty_source_returns_none_immediately() {
    let mut producer = Producer::new(IterSource::new(std::iter::empty::<u64>()));
    producer.start(2);
    assert!(producer.take().is_none());
    assert!(producer.eof());
    assert!(producer.idle());
    assert_eq!(producer.items_produced(), 0);
}

/// Source yields exactly as many items as there are slots; all of them
/// must come out the other side.
#[test]
fn exactly_num_slots_items_all_delivered() {
    let mut producer = Producer::new(IterSource::new(0..4u32));
    producer.start(4);
    let mut got = Vec::new();
    while let Some(item) = producer.take() {
        got.push(item);
    }
    got.sort_unstable();
    assert_eq!(got, (0..4).collect::<Vec<_>>());
    assert!(producer.idle());
}

#[test]
fn single_slot_still_delivers_everything() {
    let mut producer = Producer::new(IterSource::new(0..50u32));
    producer.start(1);
    let mut got = Vec::new();
    while let Some(item) = producer.take() {
        got.push(item);
    }
    got.sort_unstable();
    assert_eq!(got, (0..50).collect::<Vec<_>>());
}

/// Many takers racing on one producer: every item is handed to exactly
/// one taker.
#[test]
fn concurrent_takers_conserve_items() {
    let mut producer = Producer::new(IterSource::new(0..1000u64));
    producer.start(5);
    let producer = Arc::new(producer);

    let taken = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for _ in 0..4 {
        let producer = Arc::clone(&producer);
        let taken = Arc::clone(&taken);
        handles.push(thread::spawn(move || {
            let mut local = Vec::new();
            while let Some(item) = producer.take() {
                local.push(item);
            }
            taken.lock().unwrap().extend(local);
        }));
    }
    for handle in handles {
        handle.join().expect("taker panicked");
    }

    let mut all = taken.lock().unwrap().clone();
    all.sort_unstable();
    assert_eq!(all, (0..1000).collect::<Vec<_>>());
    assert!(producer.idle());
}

#[derive(Debug)]
struct FailingSource {
    remaining: u32,
}

impl Source for FailingSource {
    type Item = u32;
    type Error = std::io::Error;

    fn pull(&mut self) -> Result<Option<u32>, Self::Error> {
        if self.remaining == 0 {
            Err(std::io::Error::other("disk vanished"))
        } else {
            self.remaining -= 1;
            Ok(Some(self.remaining))
        }
    }
}

/// A failing source must still unblock takers: eof is set, the error is
/// captured, and everything produced before the failure is delivered.
#[test]
fn source_failure_sets_eof_and_surfaces_error() {
    let mut producer = Producer::new(FailingSource { remaining: 3 });
    producer.start(2);

    let mut got = Vec::new();
    while let Some(item) = producer.take() {
        got.push(item);
    }
    assert_eq!(got.len(), 3);
    assert!(producer.eof());
    assert!(matches!(
        producer.take_failure(),
        Some(PipelineError::Source { .. })
    ));
}

#[test]
fn polling_mode_drains_source() {
    let mut producer =
        Producer::<_, SleepPoll>::with_period(IterSource::new(0..50u32), Duration::from_millis(1));
    producer.start(4);
    let mut got = Vec::new();
    while let Some(item) = producer.take() {
        got.push(item);
    }
    got.sort_unstable();
    assert_eq!(got, (0..50).collect::<Vec<_>>());
}

#[test]
#[should_panic(expected = "producer already started")]
fn start_twice_panics() {
    let mut producer = Producer::new(IterSource::new(0..1u32));
    producer.start(1);
    producer.start(1);
}

#[test]
#[should_panic(expected = "at least one slot")]
fn zero_slots_panics() {
    let mut producer = Producer::new(IterSource::new(0..1u32));
    producer.start(0);
}

#[test]
#[should_panic(expected = "producer not started")]
fn take_before_start_panics() {
    let producer = Producer::new(IterSource::new(0..1u32));
    let _ = producer.take();
}
