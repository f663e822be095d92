//! Stub Registry
//!
//! Ordered collection of stubs, newest first. The most recently registered
//! stub that matches a request wins.
//!
//! A shared in-flight [`Latch`] counts match attempts currently evaluating.
//! [`StubRegistry::clear_all`] waits for it to drain and empties the list
//! while holding the latch, so no match can start between the two steps.

use crate::config::StubConfig;
use crate::latch::Latch;
use crate::matcher::RequestPattern;
use crate::request::InterceptedRequest;
use crate::response::ResponseVariant;
use crate::result::StubResult;
use crate::stub::{Stub, StubHandle};
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Anything that names the absolute URL of a resource under test
pub trait ResourceProvider {
    /// Absolute URL of the resource
    fn url(&self) -> String;
}

impl ResourceProvider for str {
    fn url(&self) -> String {
        self.to_string()
    }
}

impl ResourceProvider for String {
    fn url(&self) -> String {
        self.clone()
    }
}

impl<T: ResourceProvider + ?Sized> ResourceProvider for &T {
    fn url(&self) -> String {
        (**self).url()
    }
}

/// Marks one match attempt as in flight until dropped
#[derive(Debug)]
#[must_use = "the attempt stops counting as in flight when the guard drops"]
pub struct InFlightGuard {
    latch: Arc<Latch>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.latch.decrement();
    }
}

/// Registry of stubs consulted by the interceptor
#[derive(Debug)]
pub struct StubRegistry {
    config: StubConfig,
    stubs: Mutex<VecDeque<StubHandle>>,
    in_flight: Arc<Latch>,
}

impl Default for StubRegistry {
    fn default() -> Self {
        Self::new(StubConfig::default())
    }
}

impl StubRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new(config: StubConfig) -> Self {
        let in_flight = Arc::new(Latch::with_timeout(
            "in-flight match latch",
            config.latch_timeout,
        ));
        Self {
            config,
            stubs: Mutex::new(VecDeque::new()),
            in_flight,
        }
    }

    /// Create an empty registry ready to share with an interceptor
    #[must_use]
    pub fn shared(config: StubConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    /// Configuration
    #[must_use]
    pub const fn config(&self) -> &StubConfig {
        &self.config
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register a stub; it takes priority over every earlier one
    pub fn add_stub(&self, stub: StubHandle) -> StubHandle {
        tracing::debug!(stub = %stub.id(), pattern = %stub.pattern(), "stub registered");
        self.lock_stubs().push_front(stub.clone());
        stub
    }

    /// Register `pattern` answered by `response`
    pub fn add(
        &self,
        pattern: RequestPattern,
        response: impl Into<ResponseVariant>,
    ) -> StubHandle {
        let stub = Stub::new(pattern, response.into(), self.config.latch_timeout);
        self.add_stub(StubHandle::new(stub))
    }

    /// Register an empty response with `status` for `method` on `resource`
    pub fn add_status<R>(&self, method: &str, resource: &R, status: u16) -> StubResult<StubHandle>
    where
        R: ResourceProvider + ?Sized,
    {
        self.add_response(method, resource, ResponseVariant::status(status))
    }

    /// Register `response` for `method` on `resource`
    pub fn add_response<R>(
        &self,
        method: &str,
        resource: &R,
        response: impl Into<ResponseVariant>,
    ) -> StubResult<StubHandle>
    where
        R: ResourceProvider + ?Sized,
    {
        let pattern = RequestPattern::new(method, &resource.url())?;
        Ok(self.add(pattern, response))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Remove every stub once no match is evaluating.
    ///
    /// Call from a quiescent point such as between tests.
    ///
    /// # Panics
    ///
    /// Panics when in-flight matches do not drain within the latch timeout.
    pub fn clear_all(&self) {
        let cleared = self
            .in_flight
            .await_value_then(0, self.config.latch_timeout, || {
                let mut stubs = self.lock_stubs();
                let cleared = stubs.len();
                stubs.clear();
                cleared
            });
        tracing::debug!(cleared, "registry cleared");
    }

    /// Alias for [`StubRegistry::clear_all`]
    pub fn reset(&self) {
        self.clear_all();
    }

    /// Clear and drop this handle
    pub fn dispose(self: Arc<Self>) {
        self.clear_all();
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Count one match attempt as in flight until the guard drops
    pub fn begin_match(&self) -> InFlightGuard {
        self.in_flight.increment();
        InFlightGuard {
            latch: Arc::clone(&self.in_flight),
        }
    }

    /// Match attempts currently in flight
    #[must_use]
    pub fn in_flight(&self) -> u64 {
        self.in_flight.count()
    }

    /// Newest stub matching `request` with extracted `body`.
    ///
    /// # Panics
    ///
    /// Panics with the request and every registered stub when nothing
    /// matches. An unmatched request is a defect in the test's setup.
    pub fn find(&self, request: &InterceptedRequest, body: Option<&[u8]>) -> StubHandle {
        let _attempt = self.begin_match();
        let snapshot = self.stubs();

        if let Some(stub) = snapshot
            .into_iter()
            .find(|stub| stub.pattern().matches(request, body))
        {
            stub.record_hit();
            tracing::debug!(
                request = %request.id(),
                method = %request.method,
                url = %request.url,
                stub = %stub.id(),
                "request matched"
            );
            return stub;
        }

        tracing::error!(method = %request.method, url = %request.url, "no stub matches request");
        panic!(
            "no stub matches request {}\n{}",
            describe_unmatched(request, body),
            self.describe()
        );
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Snapshot of registered stubs, newest first
    #[must_use]
    pub fn stubs(&self) -> Vec<StubHandle> {
        self.lock_stubs().iter().cloned().collect()
    }

    /// Number of registered stubs
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_stubs().len()
    }

    /// Whether no stub is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock_stubs().is_empty()
    }

    /// Multi-line listing of registered stubs, newest first
    #[must_use]
    pub fn describe(&self) -> String {
        let stubs = self.stubs();
        let mut out = format!("registered stubs ({}):", stubs.len());
        for (index, stub) in stubs.iter().enumerate() {
            let _ = write!(out, "\n  {index}: {stub}");
        }
        out
    }

    fn lock_stubs(&self) -> MutexGuard<'_, VecDeque<StubHandle>> {
        self.stubs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn describe_unmatched(request: &InterceptedRequest, body: Option<&[u8]>) -> String {
    let mut headers: Vec<_> = request.headers.iter().collect();
    headers.sort();
    let body = body.map_or_else(
        || "<none>".to_string(),
        |bytes| format!("{:?}", String::from_utf8_lossy(bytes)),
    );
    format!(
        "{} {}\n  headers: {:?}\n  body: {}",
        request.method, request.url, headers, body
    )
}
