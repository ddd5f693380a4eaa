//! Reduce stage: a dedicated thread that drains item slots into a sink.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::error::{FailureCell, PipelineError, SendError};
use crate::sink::Sink;
use crate::slot::SlotArray;
use crate::wait::{DEFAULT_SLEEP, Semaphore, WaitPolicy};

/// State shared between the reducer thread and item pushers.
pub(crate) struct ReduceShared<T, W> {
    pub(crate) slots: SlotArray<T>,
    /// Cleared by `shut_down`; the drain loop exits only after a clean
    /// scan with `run` false.
    run: AtomicBool,
    /// True while the reducer thread is draining. Cleared on any exit so
    /// pushers never block on a dead consumer.
    live: AtomicBool,
    /// Signaled once per placed item, and once by `shut_down`.
    item_ready: W,
    /// Signaled once per drained slot; broadcast when the drain stops.
    slot_free: W,
}

impl<T, W: WaitPolicy> ReduceShared<T, W> {
    fn new(num_slots: usize, period: Duration) -> Self {
        Self {
            slots: SlotArray::new(num_slots),
            run: AtomicBool::new(true),
            live: AtomicBool::new(true),
            item_ready: W::with_period(period),
            slot_free: W::with_period(period),
        }
    }

    /// Blocking push. Returns the item if the reducer has stopped.
    pub(crate) fn push(&self, item: T) -> Result<(), SendError<T>> {
        let mut boxed = Box::new(item);
        loop {
            // Ordering: Acquire — pairs with the drain guard's Release.
            if !self.live.load(Ordering::Acquire) {
                // Pass the wake-up along for any pusher beyond the reach
                // of the drain guard's broadcast.
                self.slot_free.signal(1);
                return Err(SendError(*boxed));
            }
            match self.slots.try_place(boxed) {
                Ok(()) => {
                    self.item_ready.signal(1);
                    return Ok(());
                }
                Err(back) => {
                    boxed = back;
                    self.slot_free.wait();
                }
            }
        }
    }

    pub(crate) fn idle(&self) -> bool {
        self.slots.all_empty()
    }

    #[inline]
    pub(crate) fn live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}

/// Clears `live` and wakes all pushers on drop, so a sink failure or
/// panic cannot leave pushers blocked on a full slot array.
struct DrainGuard<'a, T, W: WaitPolicy>(&'a ReduceShared<T, W>);

impl<T, W: WaitPolicy> Drop for DrainGuard<'_, T, W> {
    fn drop(&mut self) {
        // Ordering: Release — pairs with the Acquire in push() and live().
        self.0.live.store(false, Ordering::Release);
        self.0.slot_free.signal(self.0.slots.len());
    }
}

/// Reducer thread body. Drains slots into the sink until `run` is cleared
/// and a full scan finds nothing, so every item pushed before shutdown
/// reaches the sink. Returns the sink to the joining thread.
fn drain_loop<T, K, W>(mut sink: K, shared: &ReduceShared<T, W>, failure: &FailureCell) -> K
where
    K: Sink<T>,
    K::Error: std::error::Error + Send + Sync + 'static,
    W: WaitPolicy,
{
    let _guard = DrainGuard(shared);
    loop {
        let mut drained = false;
        for idx in 0..shared.slots.len() {
            if let Some(item) = shared.slots.take_at(idx) {
                shared.slot_free.signal(1);
                drained = true;
                if let Err(err) = sink.send(*item) {
                    failure.record(PipelineError::Sink {
                        source: Box::new(err),
                    });
                    return sink;
                }
            }
        }
        if !drained {
            // Ordering: Acquire — pairs with shut_down()'s Release store.
            if !shared.run.load(Ordering::Acquire) {
                break;
            }
            shared.item_ready.wait();
        }
    }
    if let Err(err) = sink.flush() {
        failure.record(PipelineError::Sink {
            source: Box::new(err),
        });
    }
    sink
}

/// Hosts a [`Sink`] and a dedicated thread that drains a bounded array of
/// slots into it.
///
/// [`push`](Reducer::push) may be called from any number of threads
/// concurrently. The sink is moved into the reducer thread at `start` and
/// handed back at [`shut_down`](Reducer::shut_down).
///
/// # Example
///
/// ```
/// use conveyor::{CollectSink, Reducer};
///
/// let mut reducer = Reducer::new(CollectSink::new());
/// reducer.start(2);
/// for i in 0..5u64 {
///     reducer.push(i).unwrap();
/// }
/// let mut items = reducer.into_sink().unwrap().into_items();
/// items.sort_unstable();
/// assert_eq!(items, vec![0, 1, 2, 3, 4]);
/// ```
pub struct Reducer<T, K: Sink<T>, W: WaitPolicy = Semaphore> {
    sink: Option<K>,
    shared: Option<Arc<ReduceShared<T, W>>>,
    thread: Option<thread::JoinHandle<K>>,
    failure: FailureCell,
    period: Duration,
}

impl<T, K: Sink<T>> Reducer<T, K> {
    /// Create an idle reducer with semaphore-driven blocking.
    pub fn new(sink: K) -> Self {
        Self::with_period(sink, DEFAULT_SLEEP)
    }
}

impl<T, K: Sink<T>, W: WaitPolicy> Reducer<T, K, W> {
    /// Create an idle reducer with an explicit wait-policy period.
    pub fn with_period(sink: K, period: Duration) -> Self {
        Self {
            sink: Some(sink),
            shared: None,
            thread: None,
            failure: FailureCell::default(),
            period,
        }
    }

    /// Allocate `num_slots` empty slots and spawn the reducer thread.
    ///
    /// # Panics
    ///
    /// Panics if called twice, or with `num_slots == 0`.
    pub fn start(&mut self, num_slots: usize)
    where
        T: Send + 'static,
        K: Send + 'static,
        K::Error: std::error::Error + Send + Sync + 'static,
    {
        assert!(self.shared.is_none(), "reducer already started");
        assert!(num_slots >= 1, "reducer needs at least one slot");
        let sink = self.sink.take().expect("unstarted reducer holds its sink");
        let shared = Arc::new(ReduceShared::new(num_slots, self.period));
        let failure = self.failure.clone();
        let thread_shared = Arc::clone(&shared);
        log::debug!("reducer: starting with {num_slots} slots");
        self.thread = Some(thread::spawn(move || {
            drain_loop(sink, &thread_shared, &failure)
        }));
        self.shared = Some(shared);
    }

    /// Blocking push of one item.
    ///
    /// Blocks until the item lands in an empty slot. Returns the item
    /// inside [`SendError`] if the reducer has stopped (shutdown or sink
    /// failure).
    ///
    /// # Panics
    ///
    /// Panics if the reducer was never started.
    pub fn push(&self, item: T) -> Result<(), SendError<T>> {
        self.shared().push(item)
    }

    /// Drain remaining items, stop the reducer thread and take the sink
    /// back. Idempotent; a second call is a no-op.
    ///
    /// After this returns, every item pushed before the call has been
    /// passed to the sink and [`idle`](Reducer::idle) holds.
    pub fn shut_down(&mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };
        let shared = self.shared.as_ref().expect("started reducer has shared state");
        // Ordering: Release — pairs with the drain loop's Acquire.
        shared.run.store(false, Ordering::Release);
        shared.item_ready.signal(1);
        match handle.join() {
            Ok(sink) => self.sink = Some(sink),
            Err(_) => self.failure.record(PipelineError::SinkPanicked),
        }
        log::debug!("reducer: shut down");
    }

    /// True iff all slots are empty.
    pub fn idle(&self) -> bool {
        self.shared.as_deref().is_none_or(ReduceShared::idle)
    }

    /// Take the captured failure, if the sink failed or panicked.
    pub fn take_failure(&self) -> Option<PipelineError> {
        self.failure.take()
    }

    /// Shut down and return the sink.
    ///
    /// `None` if the sink was lost to a panic in the reducer thread.
    pub fn into_sink(mut self) -> Option<K> {
        self.shut_down();
        self.sink.take()
    }

    pub(crate) fn take_sink(&mut self) -> Option<K> {
        self.sink.take()
    }

    pub(crate) fn shared_arc(&self) -> Arc<ReduceShared<T, W>> {
        Arc::clone(self.shared())
    }

    fn shared(&self) -> &Arc<ReduceShared<T, W>> {
        self.shared.as_ref().expect("reducer not started")
    }
}

impl<T, K: Sink<T>, W: WaitPolicy> Drop for Reducer<T, K, W> {
    fn drop(&mut self) {
        self.shut_down();
    }
}
