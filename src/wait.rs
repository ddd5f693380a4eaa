//! Blocking and polling wait policies for slot handoff.
//!
//! A pipeline uses four wait primitives (item-ready and slot-free, on each
//! side of the worker pool). All four share one policy, chosen at
//! construction time through the `W` type parameter: [`Semaphore`] blocks
//! until signaled, [`SleepPoll`] replaces every wait with a timed sleep and
//! turns signals into no-ops. Correctness is identical in both modes; only
//! wake-up latency and idle CPU differ.

use std::sync::{Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// Default polling period for [`SleepPoll`].
pub const DEFAULT_SLEEP: Duration = Duration::from_millis(10);

/// Wait/signal primitive used between pipeline stages.
pub trait WaitPolicy: Send + Sync + 'static {
    /// Build an instance for a pipeline configured with `period`.
    ///
    /// [`Semaphore`] ignores the period; [`SleepPoll`] sleeps for it.
    fn with_period(period: Duration) -> Self;

    /// Block until a permit is available, or until the polling period
    /// elapses for policies that never receive permits.
    fn wait(&self);

    /// Post `n` permits, waking up to `n` waiters.
    fn signal(&self, n: usize);
}

/// Counting semaphore over a mutex-guarded permit count.
///
/// FIFO wake order is not guaranteed and not needed: every waiter re-scans
/// the slot array after waking.
///
/// No user code ever runs under the permit lock, so a poisoning panic
/// cannot leave the count mid-update; `wait`/`signal` recover the guard
/// with `PoisonError::into_inner` instead of surfacing an error.
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl WaitPolicy for Semaphore {
    fn with_period(_period: Duration) -> Self {
        Self {
            permits: Mutex::new(0),
            available: Condvar::new(),
        }
    }

    fn wait(&self) {
        let mut permits = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        while *permits == 0 {
            permits = self
                .available
                .wait(permits)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *permits -= 1;
    }

    fn signal(&self, n: usize) {
        if n == 0 {
            return;
        }
        let mut permits = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        *permits = permits.saturating_add(n);
        drop(permits);
        if n == 1 {
            self.available.notify_one();
        } else {
            self.available.notify_all();
        }
    }
}

/// Timed-polling fallback: `wait` sleeps for the configured period,
/// `signal` does nothing.
///
/// Dependency-free mode for callers that can tolerate up to one period of
/// extra latency per handoff.
pub struct SleepPoll {
    period: Duration,
}

impl WaitPolicy for SleepPoll {
    fn with_period(period: Duration) -> Self {
        Self { period }
    }

    fn wait(&self) {
        thread::sleep(self.period);
    }

    #[inline]
    fn signal(&self, _n: usize) {}
}
