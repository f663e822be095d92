//! Stubs
//!
//! A stub binds one [`RequestPattern`] to one [`ResponseVariant`] and owns a
//! private delay [`Latch`]. Tests hold a [`StubHandle`] to postpone the
//! stub's completion while they observe intermediate state.

use crate::latch::{Latch, DEFAULT_LATCH_TIMEOUT};
use crate::matcher::RequestPattern;
use crate::response::{ResponseSink, ResponseVariant};
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// A registered (pattern, response) pair
#[derive(Debug)]
pub struct Stub {
    id: Uuid,
    pattern: RequestPattern,
    response: ResponseVariant,
    delay: Latch,
    hits: AtomicUsize,
    completions: AtomicUsize,
}

impl Stub {
    /// Create a stub whose delay latch waits at most `timeout`
    #[must_use]
    pub fn new(pattern: RequestPattern, response: ResponseVariant, timeout: Duration) -> Self {
        let delay = Latch::with_timeout(format!("delay latch for {pattern}"), timeout);
        Self {
            id: Uuid::new_v4(),
            pattern,
            response,
            delay,
            hits: AtomicUsize::new(0),
            completions: AtomicUsize::new(0),
        }
    }

    /// Unique stub id
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Request pattern
    #[must_use]
    pub const fn pattern(&self) -> &RequestPattern {
        &self.pattern
    }

    /// Response emitted on completion
    #[must_use]
    pub const fn response(&self) -> &ResponseVariant {
        &self.response
    }

    /// Outstanding `delay()` calls not yet matched by `release()`
    #[must_use]
    pub fn pending_delays(&self) -> u64 {
        self.delay.count()
    }

    /// Times this stub was selected for a request
    #[must_use]
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Times this stub emitted its response
    #[must_use]
    pub fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }

    /// Block until every `delay()` has been released.
    ///
    /// # Panics
    ///
    /// Panics when the delay latch times out.
    pub fn await_permission_to_complete(&self) {
        self.delay.await_value(0);
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn emit(&self, sink: &mut dyn ResponseSink, url: &str) {
        self.response.emit(sink, url);
        self.completions.fetch_add(1, Ordering::SeqCst);
    }
}

impl fmt::Display for Stub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} -> {} (pending delays: {}, hits: {})",
            self.id,
            self.pattern,
            self.response,
            self.pending_delays(),
            self.hits()
        )
    }
}

/// Shared handle to a registered stub
#[derive(Debug, Clone)]
pub struct StubHandle(Arc<Stub>);

impl StubHandle {
    /// Wrap a stub
    #[must_use]
    pub fn new(stub: Stub) -> Self {
        Self(Arc::new(stub))
    }

    /// Stub with the default latch timeout
    #[must_use]
    pub fn from_parts(pattern: RequestPattern, response: ResponseVariant) -> Self {
        Self::new(Stub::new(pattern, response, DEFAULT_LATCH_TIMEOUT))
    }

    /// Hold this stub's completion until a matching [`StubHandle::release`].
    ///
    /// Calls nest: N delays need N releases.
    pub fn delay(&self) -> Self {
        let pending = self.0.delay.increment();
        tracing::debug!(stub = %self.0.id, pending, "stub delayed");
        self.clone()
    }

    /// Undo one [`StubHandle::delay`].
    ///
    /// Releasing a stub with no outstanding delay does nothing.
    pub fn release(&self) {
        match self.0.delay.decrement() {
            Some(pending) => tracing::debug!(stub = %self.0.id, pending, "stub released"),
            None => tracing::warn!(stub = %self.0.id, "release without outstanding delay ignored"),
        }
    }

    /// Alias for [`StubHandle::release`]
    pub fn go(&self) {
        self.release();
    }

    /// Whether two handles refer to the same stub
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for StubHandle {
    type Target = Stub;

    fn deref(&self) -> &Stub {
        &self.0
    }
}

impl fmt::Display for StubHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
