//! PTC unit: composes a producer, a worker pool, and a reducer.

use std::thread;

use crate::builder::PipelineBuilder;
use crate::error::{FailureCell, PipelineError};
use crate::producer::{ProduceShared, Producer};
use crate::reducer::{ReduceShared, Reducer};
use crate::sink::Sink;
use crate::source::{Source, Transform};
use crate::wait::{Semaphore, WaitPolicy};

/// Spin-then-yield until `condition` holds, sized for the end-of-run
/// drain wait: by this point only two threads are still live, the caller
/// and the reducer emptying its last slots.
fn spin_until_drained(condition: impl Fn() -> bool) {
    const LIVE_THREADS: usize = 2; // this caller + the reducer thread

    let cores = thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(1);
    // Spin a little per spare core before handing the CPU to the reducer;
    // on a machine without headroom, yield immediately.
    #[allow(clippy::cast_possible_truncation)]
    let spin_limit = if cores < LIVE_THREADS {
        0
    } else {
        ((cores - LIVE_THREADS + 1) as u32 * 32).min(256)
    };

    let mut spins = 0u32;
    while !condition() {
        if spins < spin_limit {
            std::hint::spin_loop();
            spins += 1;
        } else {
            thread::yield_now();
            spins = 0;
        }
    }
}

/// Worker body: take, transform, push, until the producer reports EOF.
///
/// A transform error (or a push against a stopped reducer) cancels the
/// producer so every other thread unblocks, then exits the worker.
fn worker_loop<T, X, W>(
    produce: &ProduceShared<T, W>,
    reduce: &ReduceShared<X::Output, W>,
    transform: &mut X,
    failure: &FailureCell,
) where
    X: Transform<T>,
    X::Error: std::error::Error + Send + Sync + 'static,
    W: WaitPolicy,
{
    while let Some(item) = produce.take() {
        match transform.apply(item) {
            Ok(out) => {
                if reduce.push(out).is_err() {
                    produce.cancel();
                    return;
                }
            }
            Err(err) => {
                failure.record(PipelineError::Transform {
                    source: Box::new(err),
                });
                produce.cancel();
                return;
            }
        }
    }
}

/// An in-process produce / transform / consume pipeline.
///
/// One dedicated thread materializes items from the source, `num_workers`
/// threads apply the transform in parallel, and one dedicated thread
/// drains results into the sink in arrival order (not source order).
/// Memory stays bounded by the fixed slot arrays on each side.
///
/// # Example
///
/// ```
/// use conveyor::{CollectSink, FnTransform, IterSource, Pipeline};
///
/// let mut pipeline = Pipeline::new(
///     IterSource::new(1u64..=100),
///     FnTransform::new(|x: u64| x * 2),
///     CollectSink::new(),
///     4,
/// );
/// pipeline.start();
/// pipeline.wait_for_finish().unwrap();
///
/// let mut doubled = pipeline.into_sink().unwrap().into_items();
/// doubled.sort_unstable();
/// assert_eq!(doubled.len(), 100);
/// assert_eq!(doubled.first(), Some(&2));
/// assert_eq!(doubled.last(), Some(&200));
/// ```
pub struct Pipeline<Q, X, K, W = Semaphore>
where
    Q: Source,
    X: Transform<Q::Item>,
    K: Sink<X::Output>,
    W: WaitPolicy,
{
    producer: Producer<Q, W>,
    reducer: Reducer<X::Output, K, W>,
    transform: X,
    workers: Vec<thread::JoinHandle<()>>,
    num_workers: usize,
    producer_slots: usize,
    consumer_slots: usize,
    failure: FailureCell,
    started: bool,
}

impl<Q, X, K> Pipeline<Q, X, K>
where
    Q: Source,
    X: Transform<Q::Item>,
    K: Sink<X::Output>,
{
    /// Compose a pipeline with default slot counts (`num_workers + 1` on
    /// each side — every worker can hold an item while each stage thread
    /// stays one step ahead).
    pub fn new(source: Q, transform: X, sink: K, num_workers: usize) -> Self {
        Self::builder(source, transform, sink)
            .workers(num_workers)
            .build()
    }

    /// Start configuring a pipeline.
    pub fn builder(source: Q, transform: X, sink: K) -> PipelineBuilder<Q, X, K> {
        PipelineBuilder::new(source, transform, sink)
    }
}

impl<Q, X, K, W> Pipeline<Q, X, K, W>
where
    Q: Source,
    X: Transform<Q::Item>,
    K: Sink<X::Output>,
    W: WaitPolicy,
{
    pub(crate) fn assemble(
        producer: Producer<Q, W>,
        reducer: Reducer<X::Output, K, W>,
        transform: X,
        num_workers: usize,
        producer_slots: usize,
        consumer_slots: usize,
    ) -> Self {
        Self {
            producer,
            reducer,
            transform,
            workers: Vec::new(),
            num_workers,
            producer_slots,
            consumer_slots,
            failure: FailureCell::default(),
            started: false,
        }
    }

    /// Start both stage threads and the worker pool.
    ///
    /// # Panics
    ///
    /// Panics if called twice.
    pub fn start(&mut self)
    where
        Q: Send + 'static,
        Q::Item: Send + 'static,
        Q::Error: std::error::Error + Send + Sync + 'static,
        X: Clone + Send + 'static,
        X::Output: Send + 'static,
        X::Error: std::error::Error + Send + Sync + 'static,
        K: Send + 'static,
        K::Error: std::error::Error + Send + Sync + 'static,
    {
        assert!(!self.started, "pipeline already started");
        self.started = true;
        self.producer.start(self.producer_slots);
        self.reducer.start(self.consumer_slots);
        log::debug!(
            "pipeline: {} workers, {}+{} slots",
            self.num_workers,
            self.producer_slots,
            self.consumer_slots
        );
        for _ in 0..self.num_workers {
            let produce = self.producer.shared_arc();
            let reduce = self.reducer.shared_arc();
            let mut transform = self.transform.clone();
            let failure = self.failure.clone();
            self.workers.push(thread::spawn(move || {
                worker_loop(&produce, &reduce, &mut transform, &failure);
            }));
        }
    }

    /// Wait for the source to drain, every item to reach the sink, and all
    /// threads to stop. Surfaces the first captured failure.
    ///
    /// With zero workers the calling thread runs the transform loop itself
    /// before draining — serial produce → transform → consume.
    ///
    /// # Panics
    ///
    /// Panics if the pipeline was never started.
    pub fn wait_for_finish(&mut self) -> Result<(), PipelineError>
    where
        X: Clone,
        X::Error: std::error::Error + Send + Sync + 'static,
    {
        assert!(self.started, "pipeline not started");
        if self.num_workers == 0 {
            let produce = self.producer.shared_arc();
            let reduce = self.reducer.shared_arc();
            let mut transform = self.transform.clone();
            worker_loop(&produce, &reduce, &mut transform, &self.failure);
        }
        let mut panicked = None;
        for (worker_id, handle) in self.workers.drain(..).enumerate() {
            if handle.join().is_err() && panicked.is_none() {
                panicked = Some(worker_id);
            }
        }
        if let Some(worker_id) = panicked {
            self.failure.record(PipelineError::WorkerPanicked { worker_id });
            self.producer.cancel();
        }
        self.producer.join_thread();

        // Workers push synchronously, but joined workers do not mean the
        // reducer has drained. Wait until its slots empty out (or its
        // thread stopped on a sink failure) before shutting it down.
        let reduce = self.reducer.shared_arc();
        spin_until_drained(|| !reduce.live() || reduce.idle());
        self.reducer.shut_down();

        if let Some(err) = self.producer.take_failure() {
            return Err(err);
        }
        if let Some(err) = self.failure.take() {
            return Err(err);
        }
        if let Some(err) = self.reducer.take_failure() {
            return Err(err);
        }
        log::debug!(
            "pipeline: finished, {} items produced",
            self.producer.items_produced()
        );
        Ok(())
    }

    /// True once the source is exhausted. Advisory only: items may still
    /// be in flight; use [`wait_for_finish`](Pipeline::wait_for_finish)
    /// to wait for drain completion.
    pub fn finished(&self) -> bool {
        self.producer.eof()
    }

    /// Number of items the source has handed off so far.
    pub fn items_produced(&self) -> u64 {
        self.producer.items_produced()
    }

    /// Tear the pipeline down and hand back the sink.
    ///
    /// Intended after [`wait_for_finish`](Pipeline::wait_for_finish); on a
    /// still-running pipeline this cancels the remaining input first.
    /// `None` if the sink was lost to a panic in the reducer thread.
    pub fn into_sink(mut self) -> Option<K> {
        self.abort_threads();
        self.reducer.shut_down();
        self.reducer.take_sink()
    }

    /// Cancel outstanding production and join all owned threads.
    fn abort_threads(&mut self) {
        if !self.workers.is_empty() {
            self.producer.cancel();
            for handle in self.workers.drain(..) {
                let _ = handle.join();
            }
        }
        self.producer.join_thread();
    }
}

impl<Q, X, K, W> Drop for Pipeline<Q, X, K, W>
where
    Q: Source,
    X: Transform<Q::Item>,
    K: Sink<X::Output>,
    W: WaitPolicy,
{
    fn drop(&mut self) {
        self.abort_threads();
    }
}
