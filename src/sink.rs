//! Sink seam: consumes transformed items at the end of a pipeline.

use std::convert::Infallible;
use std::fmt;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

/// Consumes items.
///
/// Invoked only from the reducer thread, so implementations need not be
/// thread-safe.
pub trait Sink<T> {
    /// The error type returned by fallible operations.
    type Error;

    /// Consume an item.
    fn send(&mut self, item: T) -> Result<(), Self::Error>;

    /// Consume multiple items from an iterator.
    ///
    /// Default implementation calls `send` for each item. Implementors can
    /// override for batch optimizations.
    #[inline]
    fn send_all(&mut self, items: impl Iterator<Item = T>) -> Result<(), Self::Error> {
        for item in items {
            self.send(item)?;
        }
        Ok(())
    }

    /// Flush buffered data. Called once when the reducer drains cleanly.
    #[inline]
    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Drops all items.
#[derive(Debug, Clone, Copy, Default)]
pub struct DropSink;

impl<T> Sink<T> for DropSink {
    type Error = Infallible;

    #[inline]
    fn send(&mut self, _item: T) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Collects items into a Vec.
///
/// # Example
///
/// ```
/// use conveyor::{CollectSink, Sink};
///
/// let mut sink = CollectSink::new();
/// sink.send(7u64).unwrap();
/// assert_eq!(sink.into_items(), vec![7]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CollectSink<T> {
    items: Vec<T>,
}

impl<T> CollectSink<T> {
    /// Create a new collecting sink.
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Get collected items.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Take collected items, leaving an empty Vec.
    pub fn take(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items)
    }

    /// Consume the sink and return collected items.
    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

impl<T> Sink<T> for CollectSink<T> {
    type Error = Infallible;

    #[inline]
    fn send(&mut self, item: T) -> Result<(), Self::Error> {
        self.items.push(item);
        Ok(())
    }

    #[inline]
    fn send_all(&mut self, items: impl Iterator<Item = T>) -> Result<(), Self::Error> {
        self.items.extend(items);
        Ok(())
    }
}

/// Calls a closure for each item.
#[derive(Debug)]
pub struct FnSink<F>(
    /// The closure invoked per item.
    pub F,
);

impl<T, F: FnMut(T)> Sink<T> for FnSink<F> {
    type Error = Infallible;

    #[inline]
    fn send(&mut self, item: T) -> Result<(), Self::Error> {
        (self.0)(item);
        Ok(())
    }
}

/// Streams items out of the pipeline over an [`mpsc`] channel.
///
/// Lets a caller consume results while the pipeline is still running; the
/// reducer fails (stopping the pipeline) if the receiver hangs up.
#[derive(Debug, Clone)]
pub struct ChannelSink<T> {
    sender: mpsc::Sender<T>,
}

impl<T> ChannelSink<T> {
    /// Create a new channel sink from a sender.
    pub fn new(sender: mpsc::Sender<T>) -> Self {
        Self { sender }
    }

    /// Get a reference to the underlying sender.
    pub fn sender(&self) -> &mpsc::Sender<T> {
        &self.sender
    }

    /// Consume the sink and return the sender.
    pub fn into_sender(self) -> mpsc::Sender<T> {
        self.sender
    }
}

impl<T> Sink<T> for ChannelSink<T> {
    type Error = mpsc::SendError<T>;

    #[inline]
    fn send(&mut self, item: T) -> Result<(), Self::Error> {
        self.sender.send(item)
    }
}

/// Error from an `Arc<Mutex<S>>` sink.
///
/// Wraps either the inner sink's error or a mutex poison error.
#[derive(Debug)]
pub enum MutexSinkError<E> {
    /// The inner sink returned an error.
    Sink(E),
    /// The mutex was poisoned by a panicked thread.
    Poisoned,
}

impl<E: fmt::Display> fmt::Display for MutexSinkError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sink(e) => write!(f, "{e}"),
            Self::Poisoned => write!(f, "mutex poisoned"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for MutexSinkError<E> {}

/// Thread-safe sink wrapper using `Arc<Mutex<S>>`.
///
/// Lets the caller keep a handle on the collected output while the reducer
/// thread owns a clone.
impl<T, S: Sink<T>> Sink<T> for Arc<Mutex<S>> {
    type Error = MutexSinkError<S::Error>;

    #[inline]
    fn send(&mut self, item: T) -> Result<(), Self::Error> {
        self.lock()
            .map_err(|_| MutexSinkError::Poisoned)?
            .send(item)
            .map_err(MutexSinkError::Sink)
    }

    #[inline]
    fn flush(&mut self) -> Result<(), Self::Error> {
        self.lock()
            .map_err(|_| MutexSinkError::Poisoned)?
            .flush()
            .map_err(MutexSinkError::Sink)
    }
}
