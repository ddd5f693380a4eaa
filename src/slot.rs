//! Fixed-size array of atomic item slots.
//!
//! Each cell holds either null ("empty") or an owning pointer produced by
//! `Box::into_raw`. Ownership transfers on every successful CAS or swap;
//! a handle is owned by exactly one party at any time.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// One item cell. Cache-line aligned to prevent false sharing between
/// neighbouring cells under concurrent CAS traffic.
#[repr(C, align(128))]
struct Slot<T> {
    cell: AtomicPtr<T>,
}

/// Fixed-length array of item cells, allocated once at stage start.
pub(crate) struct SlotArray<T> {
    slots: Box<[Slot<T>]>,
}

// AtomicPtr is Send + Sync for any T, which would make the array shareable
// even when the owned items are not. The array owns its items, so gate on
// T: Send.
unsafe impl<T: Send> Send for SlotArray<T> {}
unsafe impl<T: Send> Sync for SlotArray<T> {}

impl<T> SlotArray<T> {
    pub(crate) fn new(len: usize) -> Self {
        assert!(len >= 1, "slot array needs at least one slot");
        let slots = (0..len)
            .map(|_| Slot {
                cell: AtomicPtr::new(ptr::null_mut()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { slots }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if the cell at `idx` currently reads empty.
    ///
    /// A stale non-null read only makes the caller skip the cell, so no
    /// ordering is needed.
    #[inline]
    pub(crate) fn is_empty_at(&self, idx: usize) -> bool {
        self.slots[idx].cell.load(Ordering::Relaxed).is_null()
    }

    /// Store an item into a cell the caller knows is empty.
    ///
    /// Sole-writer path: only the producer thread stores into its own
    /// array, after observing the cell empty.
    #[inline]
    pub(crate) fn place_at(&self, idx: usize, item: Box<T>) {
        // Ordering: Release — publishes the item contents before a taker's
        // Acquire CAS can move the pointer out.
        self.slots[idx].cell.store(Box::into_raw(item), Ordering::Release);
    }

    /// Scan for an empty cell and CAS the item in. Returns the item back
    /// if every cell is occupied.
    pub(crate) fn try_place(&self, item: Box<T>) -> Result<(), Box<T>> {
        let ptr = Box::into_raw(item);
        for slot in &self.slots {
            if !slot.cell.load(Ordering::Relaxed).is_null() {
                continue;
            }
            // Ordering: AcqRel on success — Release publishes the item,
            // Acquire orders the store after the drainer's clearing of the
            // cell. A completed place is therefore visible to a subsequent
            // idle() observer.
            if slot
                .cell
                .compare_exchange(ptr::null_mut(), ptr, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Ok(());
            }
        }
        // SAFETY: the pointer came from Box::into_raw above and was not
        // stored anywhere; we still own it.
        Err(unsafe { Box::from_raw(ptr) })
    }

    /// Scan for an occupied cell and take exclusive ownership of its item.
    ///
    /// Many threads may race here; exactly one CAS wins a given handle,
    /// the rest observe the cell empty.
    pub(crate) fn try_take(&self) -> Option<Box<T>> {
        for slot in &self.slots {
            let ptr = slot.cell.load(Ordering::Relaxed);
            if ptr.is_null() {
                continue;
            }
            // Ordering: Acquire on success — pairs with the producer's
            // Release store so the item contents are visible to the taker.
            if slot
                .cell
                .compare_exchange(ptr, ptr::null_mut(), Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                // SAFETY: non-null pointers in a cell were created by
                // Box::into_raw; the successful CAS transferred exclusive
                // ownership to us.
                return Some(unsafe { Box::from_raw(ptr) });
            }
        }
        None
    }

    /// Take the item at `idx`, if any. Sole-consumer path.
    pub(crate) fn take_at(&self, idx: usize) -> Option<Box<T>> {
        // Ordering: AcqRel — Acquire to see the item contents, Release so
        // the emptied cell is visible to a pusher's subsequent CAS.
        let ptr = self.slots[idx].cell.swap(ptr::null_mut(), Ordering::AcqRel);
        if ptr.is_null() {
            None
        } else {
            // SAFETY: non-null pointers in a cell were created by
            // Box::into_raw; the swap transferred exclusive ownership to us.
            Some(unsafe { Box::from_raw(ptr) })
        }
    }

    /// True if every cell reads empty.
    pub(crate) fn all_empty(&self) -> bool {
        // Ordering: Acquire — pairs with the AcqRel place so idle() cannot
        // report true while a completed place is still unobserved.
        self.slots
            .iter()
            .all(|slot| slot.cell.load(Ordering::Acquire).is_null())
    }
}

impl<T> Drop for SlotArray<T> {
    fn drop(&mut self) {
        for slot in &mut self.slots {
            let ptr = *slot.cell.get_mut();
            if !ptr.is_null() {
                // SAFETY: non-null pointers were created by Box::into_raw
                // and never taken; &mut self proves exclusive access.
                drop(unsafe { Box::from_raw(ptr) });
            }
        }
    }
}
