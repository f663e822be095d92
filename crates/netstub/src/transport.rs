//! In-process Transport
//!
//! A blocking stand-in for the network-loading layer. Code under test sends
//! requests through it; every request runs the interceptor's full
//! `can_accept -> resolve -> start -> stop` lifecycle on the sending thread.

use crate::interceptor::Interceptor;
use crate::registry::StubRegistry;
use crate::request::InterceptedRequest;
use crate::response::{Delivery, RecordingSink, StubbedResponse};
use crate::result::{StubError, StubResult};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Transport answering every request from an interceptor
#[derive(Debug, Clone)]
pub struct StubTransport {
    interceptor: Arc<Interceptor>,
}

impl StubTransport {
    /// Transport over a fresh interceptor for `registry`
    #[must_use]
    pub fn new(registry: Arc<StubRegistry>) -> Self {
        Self::with_interceptor(Arc::new(Interceptor::new(registry)))
    }

    /// Transport over an existing interceptor
    #[must_use]
    pub const fn with_interceptor(interceptor: Arc<Interceptor>) -> Self {
        Self { interceptor }
    }

    /// Underlying interceptor
    #[must_use]
    pub const fn interceptor(&self) -> &Arc<Interceptor> {
        &self.interceptor
    }

    /// Send `request` and block until its stub completes.
    ///
    /// A failure stub yields [`StubError::Network`].
    ///
    /// # Panics
    ///
    /// Panics when no stub matches or a latch times out.
    pub fn send(&self, mut request: InterceptedRequest) -> StubResult<StubbedResponse> {
        let id = request.id();
        self.interceptor.can_accept(&request);
        self.interceptor.resolve(&mut request)?;

        let mut sink = RecordingSink::new();
        self.interceptor.start(id, &mut sink)?;
        self.interceptor.stop(id);

        match sink.into_delivery() {
            Some(Delivery::Response(response)) => Ok(response),
            Some(Delivery::Failed(failure)) => Err(failure.into()),
            None => Err(StubError::Incomplete { id }),
        }
    }

    /// Send `request` from a new thread
    pub fn send_async(&self, request: InterceptedRequest) -> JoinHandle<StubResult<StubbedResponse>> {
        let transport = self.clone();
        thread::spawn(move || transport.send(request))
    }
}
