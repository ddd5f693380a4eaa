//! Produce stage: a dedicated thread that fills item slots from a source.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use crate::error::{FailureCell, PipelineError};
use crate::slot::SlotArray;
use crate::source::Source;
use crate::wait::{DEFAULT_SLEEP, Semaphore, WaitPolicy};

/// State shared between the producer thread and item takers.
pub(crate) struct ProduceShared<T, W> {
    pub(crate) slots: SlotArray<T>,
    eof: AtomicBool,
    cancelled: AtomicBool,
    produced: AtomicU64,
    /// Signaled once per placed item; broadcast `num_slots` times on EOF.
    item_ready: W,
    /// Signaled once per emptied slot. Only the producer thread waits here.
    slot_free: W,
}

impl<T, W: WaitPolicy> ProduceShared<T, W> {
    fn new(num_slots: usize, period: Duration) -> Self {
        Self {
            slots: SlotArray::new(num_slots),
            eof: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            produced: AtomicU64::new(0),
            item_ready: W::with_period(period),
            slot_free: W::with_period(period),
        }
    }

    /// Blocking take. Returns `None` once EOF is set and a scan of the
    /// slots finds nothing, or immediately after cancellation.
    pub(crate) fn take(&self) -> Option<T> {
        loop {
            // Ordering: Acquire — pairs with cancel()'s Release store.
            if self.cancelled.load(Ordering::Acquire) {
                self.item_ready.signal(1);
                return None;
            }
            // eof is sampled before the slot scan: a final item placed
            // before the eof store is either seen by this scan, or the
            // re-loop sees eof still set against empty slots and returns
            // None. Sampling after the scan could drop that item.
            let eof = self.eof();
            if let Some(item) = self.slots.try_take() {
                self.slot_free.signal(1);
                return Some(*item);
            }
            if eof {
                // Pass the wake-up along for any waiter beyond the reach
                // of the EOF broadcast (more takers than slots).
                self.item_ready.signal(1);
                return None;
            }
            self.item_ready.wait();
        }
    }

    /// Stop the stage early: set EOF plus the cancelled flag and wake
    /// every waiter on both sides. Remaining slot items are discarded at
    /// drop. Idempotent.
    pub(crate) fn cancel(&self) {
        // Ordering: Release — pairs with the Acquire loads in take() and
        // the producer loop.
        self.cancelled.store(true, Ordering::Release);
        self.eof.store(true, Ordering::Release);
        self.item_ready.signal(self.slots.len());
        self.slot_free.signal(self.slots.len());
    }

    #[inline]
    pub(crate) fn eof(&self) -> bool {
        // Ordering: Acquire — pairs with the Release store by the producer
        // thread's exit guard.
        self.eof.load(Ordering::Acquire)
    }

    pub(crate) fn idle(&self) -> bool {
        self.eof() && self.slots.all_empty()
    }

    #[inline]
    pub(crate) fn items_produced(&self) -> u64 {
        self.produced.load(Ordering::Relaxed)
    }
}

/// Sets EOF and broadcasts on drop, so takers can never sleep through an
/// abnormal producer exit.
struct EofGuard<'a, T, W: WaitPolicy>(&'a ProduceShared<T, W>);

impl<T, W: WaitPolicy> Drop for EofGuard<'_, T, W> {
    fn drop(&mut self) {
        // Ordering: Release — pairs with the Acquire in eof().
        self.0.eof.store(true, Ordering::Release);
        self.0.item_ready.signal(self.0.slots.len());
    }
}

/// Producer thread body. Scans for empty slots and fills them from the
/// source until exhaustion, failure, or cancellation.
fn produce_loop<Q, W>(mut source: Q, shared: &ProduceShared<Q::Item, W>, failure: &FailureCell)
where
    Q: Source,
    Q::Error: std::error::Error + Send + Sync + 'static,
    W: WaitPolicy,
{
    let _guard = EofGuard(shared);
    loop {
        let mut found_empty = false;
        for idx in 0..shared.slots.len() {
            // Ordering: Acquire — pairs with cancel()'s Release store.
            if shared.cancelled.load(Ordering::Acquire) {
                return;
            }
            if !shared.slots.is_empty_at(idx) {
                continue;
            }
            found_empty = true;
            match source.pull() {
                Ok(Some(item)) => {
                    shared.slots.place_at(idx, Box::new(item));
                    shared.produced.fetch_add(1, Ordering::Relaxed);
                    shared.item_ready.signal(1);
                }
                Ok(None) => {
                    log::debug!(
                        "producer: source exhausted after {} items",
                        shared.items_produced()
                    );
                    return;
                }
                Err(err) => {
                    failure.record(PipelineError::Source {
                        source: Box::new(err),
                        items_produced: shared.items_produced(),
                    });
                    return;
                }
            }
        }
        if !found_empty {
            shared.slot_free.wait();
        }
    }
}

/// Hosts a [`Source`] and a dedicated thread that materializes its items
/// into a bounded array of slots.
///
/// [`take`](Producer::take) may be called from any number of threads
/// concurrently; each handed-off item goes to exactly one caller.
///
/// # Example
///
/// ```
/// use conveyor::{IterSource, Producer};
///
/// let mut producer = Producer::new(IterSource::new(0..3));
/// producer.start(2);
/// let mut got = Vec::new();
/// while let Some(item) = producer.take() {
///     got.push(item);
/// }
/// got.sort_unstable();
/// assert_eq!(got, vec![0, 1, 2]);
/// assert!(producer.idle());
/// ```
pub struct Producer<Q: Source, W: WaitPolicy = Semaphore> {
    source: Option<Q>,
    shared: Option<Arc<ProduceShared<Q::Item, W>>>,
    thread: Option<thread::JoinHandle<()>>,
    failure: FailureCell,
    period: Duration,
}

impl<Q: Source> Producer<Q> {
    /// Create an idle producer with semaphore-driven blocking.
    pub fn new(source: Q) -> Self {
        Self::with_period(source, DEFAULT_SLEEP)
    }
}

impl<Q: Source, W: WaitPolicy> Producer<Q, W> {
    /// Create an idle producer with an explicit wait-policy period.
    ///
    /// The period only matters for polling policies such as
    /// [`SleepPoll`](crate::SleepPoll).
    pub fn with_period(source: Q, period: Duration) -> Self {
        Self {
            source: Some(source),
            shared: None,
            thread: None,
            failure: FailureCell::default(),
            period,
        }
    }

    /// Allocate `num_slots` empty slots and spawn the producer thread.
    ///
    /// # Panics
    ///
    /// Panics if called twice, or with `num_slots == 0`.
    pub fn start(&mut self, num_slots: usize)
    where
        Q: Send + 'static,
        Q::Item: Send + 'static,
        Q::Error: std::error::Error + Send + Sync + 'static,
    {
        assert!(self.shared.is_none(), "producer already started");
        assert!(num_slots >= 1, "producer needs at least one slot");
        let source = self.source.take().expect("unstarted producer holds its source");
        let shared = Arc::new(ProduceShared::new(num_slots, self.period));
        let failure = self.failure.clone();
        let thread_shared = Arc::clone(&shared);
        log::debug!("producer: starting with {num_slots} slots");
        self.thread = Some(thread::spawn(move || {
            produce_loop(source, &thread_shared, &failure);
        }));
        self.shared = Some(shared);
    }

    /// Blocking take of one item.
    ///
    /// Returns `Some(item)` when an item is handed off, `None` once the
    /// source is exhausted and every slot has been observed empty.
    ///
    /// # Panics
    ///
    /// Panics if the producer was never started.
    pub fn take(&self) -> Option<Q::Item> {
        self.shared().take()
    }

    /// Current EOF flag. `false` before `start`.
    pub fn eof(&self) -> bool {
        self.shared.as_deref().is_some_and(ProduceShared::eof)
    }

    /// True iff EOF is set and all slots are empty.
    pub fn idle(&self) -> bool {
        self.shared.as_deref().is_some_and(ProduceShared::idle)
    }

    /// Number of items the source has handed off so far.
    pub fn items_produced(&self) -> u64 {
        self.shared
            .as_deref()
            .map_or(0, ProduceShared::items_produced)
    }

    /// Take the captured failure, if the source failed or panicked.
    pub fn take_failure(&self) -> Option<PipelineError> {
        self.failure.take()
    }

    pub(crate) fn shared_arc(&self) -> Arc<ProduceShared<Q::Item, W>> {
        Arc::clone(self.shared())
    }

    fn shared(&self) -> &Arc<ProduceShared<Q::Item, W>> {
        self.shared.as_ref().expect("producer not started")
    }

    /// Stop the stage early; tolerant of an unstarted producer.
    pub(crate) fn cancel(&self) {
        if let Some(shared) = &self.shared {
            shared.cancel();
        }
    }

    /// Join the producer thread, recording a panic as a failure.
    pub(crate) fn join_thread(&mut self) {
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                self.failure.record(PipelineError::SourcePanicked {
                    items_produced: self.items_produced(),
                });
            }
        }
    }
}

impl<Q: Source, W: WaitPolicy> Drop for Producer<Q, W> {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.cancel();
            self.join_thread();
        }
    }
}
