//! In-process produce / transform / consume pipeline with lock-free slot
//! handoff.
//!
//! A single producer thread materializes items from a [`Source`] into a
//! bounded array of atomic slots; a fixed pool of worker threads applies a
//! [`Transform`] to each item in parallel; a single reducer thread drains
//! transformed items into a [`Sink`] in arrival order (not source order).
//! I/O overlaps with CPU while memory stays bounded by the slot arrays.
//!
//! Each slot is one atomic pointer: ownership of an item transfers on a
//! single CAS, so no locks are held anywhere on the item path. Waiting is
//! pluggable via [`WaitPolicy`]: a counting [`Semaphore`] for immediate
//! wake-ups, or [`SleepPoll`] for dependency-free timed polling.
//!
//! # Example
//!
//! ```
//! use conveyor::{CollectSink, FnTransform, IterSource, Pipeline};
//!
//! let mut pipeline = Pipeline::new(
//!     IterSource::new(1u64..=1000),
//!     FnTransform::new(|x: u64| x * 2),
//!     CollectSink::new(),
//!     4,
//! );
//! pipeline.start();
//! pipeline.wait_for_finish().unwrap();
//!
//! let mut doubled = pipeline.into_sink().unwrap().into_items();
//! doubled.sort_unstable();
//! assert_eq!(doubled.len(), 1000);
//! assert_eq!(doubled.first(), Some(&2));
//! ```
//!
//! The stages also work standalone: a [`Producer`] is a bounded prefetch
//! buffer over any [`Source`], a [`Reducer`] a bounded write-behind buffer
//! over any [`Sink`].

#![warn(missing_docs)]

mod builder;
mod error;
mod pipeline;
mod producer;
mod reducer;
mod sink;
mod slot;
mod source;
mod wait;

#[cfg(test)]
mod tests;

pub use builder::PipelineBuilder;
pub use error::{BoxedError, PipelineError, SendError};
pub use pipeline::Pipeline;
pub use producer::Producer;
pub use reducer::Reducer;
pub use sink::{ChannelSink, CollectSink, DropSink, FnSink, MutexSinkError, Sink};
pub use source::{FnSource, FnTransform, Identity, IterSource, Source, Transform};
pub use wait::{DEFAULT_SLEEP, Semaphore, SleepPoll, WaitPolicy};
