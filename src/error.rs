//! Error types for pipeline stages.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use snafu::Snafu;

/// Boxed error from a user-supplied source, transform, or sink.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A failure captured inside one of the pipeline threads.
///
/// The first failure wins; anything that goes wrong afterwards is a
/// consequence of the shutdown it triggered and is dropped.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum PipelineError {
    /// The source returned an error from `pull`.
    #[snafu(display("source failed after {items_produced} items"))]
    Source {
        /// The source's own error.
        source: BoxedError,
        /// Items handed off before the failure.
        items_produced: u64,
    },

    /// The source panicked inside the producer thread.
    #[snafu(display("source panicked after {items_produced} items"))]
    SourcePanicked {
        /// Items handed off before the panic.
        items_produced: u64,
    },

    /// A transform returned an error inside a worker thread.
    #[snafu(display("transform failed"))]
    Transform {
        /// The transform's own error.
        source: BoxedError,
    },

    /// The sink returned an error from `send` or `flush`.
    #[snafu(display("sink failed"))]
    Sink {
        /// The sink's own error.
        source: BoxedError,
    },

    /// The sink panicked inside the reducer thread. The sink is lost.
    #[snafu(display("sink panicked"))]
    SinkPanicked,

    /// A worker thread panicked while transforming an item.
    #[snafu(display("worker {worker_id} panicked"))]
    WorkerPanicked {
        /// Index of the worker that panicked.
        worker_id: usize,
    },
}

/// Error returned by [`Reducer::push`](crate::Reducer::push) when the
/// reducer has stopped. Carries the rejected item back to the caller.
pub struct SendError<T>(
    /// The rejected item.
    pub T,
);

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SendError(..)")
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("pushing to a stopped reducer")
    }
}

impl<T> std::error::Error for SendError<T> {}

/// First-failure-wins cell shared between a stage and its owning handle.
#[derive(Clone, Default)]
pub(crate) struct FailureCell(Arc<Mutex<Option<PipelineError>>>);

impl FailureCell {
    /// Record a failure unless one is already present.
    pub(crate) fn record(&self, err: PipelineError) {
        let mut slot = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            log::warn!("pipeline failure captured: {err}");
            *slot = Some(err);
        } else {
            log::debug!("dropping follow-on failure: {err}");
        }
    }

    /// Take the recorded failure, leaving the cell empty.
    pub(crate) fn take(&self) -> Option<PipelineError> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}
