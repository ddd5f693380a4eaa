//! Builder pattern for configuring pipelines.

use std::marker::PhantomData;
use std::time::Duration;

use crate::pipeline::Pipeline;
use crate::producer::Producer;
use crate::reducer::Reducer;
use crate::sink::Sink;
use crate::source::{Source, Transform};
use crate::wait::{DEFAULT_SLEEP, Semaphore, SleepPoll, WaitPolicy};

/// Builder for constructing a [`Pipeline`].
///
/// Created via [`Pipeline::builder()`]. Configure options with chained
/// methods, then call [`.build()`](Self::build) to assemble the pipeline.
///
/// # Example
///
/// ```
/// use conveyor::{CollectSink, Identity, IterSource, Pipeline};
/// use std::time::Duration;
///
/// // Semaphore-driven blocking, default slot counts.
/// let pipeline = Pipeline::builder(IterSource::new(0u32..10), Identity, CollectSink::new())
///     .workers(2)
///     .build();
/// # drop(pipeline);
///
/// // Timed polling instead of semaphores.
/// let pipeline = Pipeline::builder(IterSource::new(0u32..10), Identity, CollectSink::new())
///     .workers(2)
///     .polling(Duration::from_millis(1))
///     .build();
/// # drop(pipeline);
/// ```
pub struct PipelineBuilder<Q, X, K, W = Semaphore> {
    source: Q,
    transform: X,
    sink: K,
    num_workers: usize,
    producer_slots: Option<usize>,
    consumer_slots: Option<usize>,
    period: Duration,
    _marker: PhantomData<W>,
}

impl<Q, X, K> PipelineBuilder<Q, X, K> {
    pub(crate) fn new(source: Q, transform: X, sink: K) -> Self {
        Self {
            source,
            transform,
            sink,
            num_workers: 1,
            producer_slots: None,
            consumer_slots: None,
            period: DEFAULT_SLEEP,
            _marker: PhantomData,
        }
    }
}

impl<Q, X, K, W> PipelineBuilder<Q, X, K, W> {
    /// Set the worker thread count. Zero degenerates to a serial pipeline
    /// driven by the caller of `wait_for_finish`. Default: 1.
    pub fn workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    /// Override the producer-side slot count. Default: `workers + 1`.
    pub fn producer_slots(mut self, num_slots: usize) -> Self {
        self.producer_slots = Some(num_slots);
        self
    }

    /// Override the consumer-side slot count. Default: `workers + 1`.
    pub fn consumer_slots(mut self, num_slots: usize) -> Self {
        self.consumer_slots = Some(num_slots);
        self
    }

    /// Set the polling period used by timed wait policies. Default: 10 ms.
    pub fn sleep_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Switch to the dependency-free timed-polling wait policy: every
    /// internal wait becomes a sleep for `period` and signals are no-ops.
    pub fn polling(self, period: Duration) -> PipelineBuilder<Q, X, K, SleepPoll> {
        PipelineBuilder {
            source: self.source,
            transform: self.transform,
            sink: self.sink,
            num_workers: self.num_workers,
            producer_slots: self.producer_slots,
            consumer_slots: self.consumer_slots,
            period,
            _marker: PhantomData,
        }
    }

    /// Assemble the [`Pipeline`]. Threads are not spawned until
    /// [`Pipeline::start`].
    pub fn build(self) -> Pipeline<Q, X, K, W>
    where
        Q: Source,
        X: Transform<Q::Item>,
        K: Sink<X::Output>,
        W: WaitPolicy,
    {
        let default_slots = self.num_workers + 1;
        let producer_slots = self.producer_slots.unwrap_or(default_slots).max(1);
        let consumer_slots = self.consumer_slots.unwrap_or(default_slots).max(1);
        Pipeline::assemble(
            Producer::with_period(self.source, self.period),
            Reducer::with_period(self.sink, self.period),
            self.transform,
            self.num_workers,
            producer_slots,
            consumer_slots,
        )
    }
}
