//! Counting Latch
//!
//! A reusable counting gate: any number of threads move the counter up and
//! down by one, and waiters block until it reaches a target value.
//!
//! ## Failure model
//!
//! A wait that outlives its timeout is a test-harness defect (an unreleased
//! `delay()`, a deadlocked release), never a runtime condition. The wait
//! panics with the latch's name instead of returning an error.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Default bound for every latch wait (1 second)
pub const DEFAULT_LATCH_TIMEOUT: Duration = Duration::from_secs(1);

/// A named counter with blocking wait-for-value
#[derive(Debug)]
pub struct Latch {
    name: String,
    count: Mutex<u64>,
    changed: Condvar,
    timeout: Duration,
}

impl Latch {
    /// Create a latch at zero with the default timeout
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_timeout(name, DEFAULT_LATCH_TIMEOUT)
    }

    /// Create a latch at zero with a custom wait timeout
    #[must_use]
    pub fn with_timeout(name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            count: Mutex::new(0),
            changed: Condvar::new(),
            timeout,
        }
    }

    /// Diagnostic name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Timeout applied by [`Latch::await_value`]
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Current counter value
    #[must_use]
    pub fn count(&self) -> u64 {
        *self.lock()
    }

    /// Add one, returning the new value
    pub fn increment(&self) -> u64 {
        let mut count = self.lock();
        *count += 1;
        let value = *count;
        drop(count);
        self.changed.notify_all();
        value
    }

    /// Subtract one, returning the new value.
    ///
    /// The counter never goes below zero: decrementing an idle latch leaves
    /// it at zero and returns `None`, so an unbalanced decrement cannot
    /// pre-pay a later increment.
    pub fn decrement(&self) -> Option<u64> {
        let mut count = self.lock();
        if *count == 0 {
            return None;
        }
        *count -= 1;
        let value = *count;
        drop(count);
        self.changed.notify_all();
        Some(value)
    }

    /// Block until the counter equals `target`.
    ///
    /// # Panics
    ///
    /// Panics, naming the latch, when the timeout elapses first.
    pub fn await_value(&self, target: u64) {
        self.await_value_then(target, self.timeout, || ());
    }

    /// Block until the counter equals `target`, then run `on_acquire` while
    /// still holding the latch. No increment or decrement can interleave with
    /// `on_acquire`.
    ///
    /// # Panics
    ///
    /// Panics, naming the latch, when `timeout` elapses first.
    pub fn await_value_then<R>(
        &self,
        target: u64,
        timeout: Duration,
        on_acquire: impl FnOnce() -> R,
    ) -> R {
        let guard = self.lock();
        let (guard, wait) = self
            .changed
            .wait_timeout_while(guard, timeout, |count| *count != target)
            .unwrap_or_else(PoisonError::into_inner);

        if wait.timed_out() && *guard != target {
            let current = *guard;
            drop(guard);
            tracing::error!(latch = %self.name, target, current, "latch wait timed out");
            panic!(
                "latch `{}` timed out after {}ms waiting for count {} (current count {})",
                self.name,
                timeout.as_millis(),
                target,
                current
            );
        }

        let result = on_acquire();
        drop(guard);
        result
    }

    fn lock(&self) -> MutexGuard<'_, u64> {
        // The counter stays consistent even if a holder panicked.
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
