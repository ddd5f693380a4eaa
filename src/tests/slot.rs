use std::sync::{Arc, Mutex};
use std::thread;

use crate::slot::SlotArray;

#[test]
fn place_take_roundtrip() {
    let slots = SlotArray::new(4);
    assert!(slots.all_empty());
    slots.try_place(Box::new(7u64)).unwrap();
    assert!(!slots.all_empty());
    assert_eq!(slots.try_take().map(|b| *b), Some(7));
    assert!(slots.all_empty());
    assert!(slots.try_take().is_none());
}

#[test]
fn rejects_place_when_full() {
    let slots = SlotArray::new(2);
    slots.try_place(Box::new(1u32)).unwrap();
    slots.try_place(Box::new(2u32)).unwrap();
    let back = slots.try_place(Box::new(3u32)).unwrap_err();
    assert_eq!(*back, 3);
}

#[test]
fn take_at_clears_a_single_cell() {
    let slots = SlotArray::new(3);
    slots.place_at(1, Box::new(9u32));
    assert!(slots.is_empty_at(0));
    assert!(!slots.is_empty_at(1));
    assert_eq!(slots.take_at(1).map(|b| *b), Some(9));
    assert!(slots.take_at(1).is_none());
}

/// Items still sitting in cells are freed when the array drops.
#[test]
fn drop_frees_leftover_items() {
    let marker = Arc::new(());
    let slots = SlotArray::new(4);
    slots.try_place(Box::new(Arc::clone(&marker))).unwrap();
    slots.try_place(Box::new(Arc::clone(&marker))).unwrap();
    assert_eq!(Arc::strong_count(&marker), 3);
    drop(slots);
    assert_eq!(Arc::strong_count(&marker), 1);
}

/// Racing takers: every item is taken exactly once, none twice.
#[test]
fn concurrent_takers_take_each_item_once() {
    let slots = Arc::new(SlotArray::new(8));
    for i in 0..8u64 {
        slots.try_place(Box::new(i)).unwrap();
    }

    let taken = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for _ in 0..4 {
        let slots = Arc::clone(&slots);
        let taken = Arc::clone(&taken);
        handles.push(thread::spawn(move || {
            while let Some(item) = slots.try_take() {
                taken.lock().unwrap().push(*item);
            }
        }));
    }
    for handle in handles {
        handle.join().expect("taker panicked");
    }

    let mut all = taken.lock().unwrap().clone();
    all.sort_unstable();
    assert_eq!(all, (0..8).collect::<Vec<_>>());
    assert!(slots.all_empty());
}

#[test]
#[should_panic(expected = "at least one slot")]
fn zero_length_array_panics() {
    let _ = SlotArray::<u64>::new(0);
}
