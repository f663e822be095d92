//! Netstub: Deterministic Network Stubbing for Tests
//!
//! Intercepts every outbound request made by code under test and answers it
//! from pre-registered stubs, with no real network I/O. Tests control *when*
//! each stubbed response completes, so they can assert on intermediate state
//! while a request is still outstanding.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    NETSTUB Architecture                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Test Setup │    │ Stub       │    │ Intercep-  │            │
//! │   │ add(stub)  │───►│ Registry   │◄───│ tor        │◄── request │
//! │   └────────────┘    └────────────┘    └─────┬──────┘            │
//! │                                             │ delay latch       │
//! │                                             ▼                   │
//! │                                       ResponseSink ──► caller   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use netstub::prelude::*;
//!
//! let registry = StubRegistry::shared(StubConfig::new());
//! let transport = StubTransport::new(registry.clone());
//!
//! let stub = registry.add(RequestPattern::get("https://api.test/widgets"), ResponseVariant::text("[]"));
//! stub.delay();
//! let pending = transport.send_async(InterceptedRequest::get("https://api.test/widgets"));
//! // ... assert on the "loading" state of the code under test ...
//! stub.release();
//!
//! let response = pending.join().unwrap().unwrap();
//! assert_eq!(response.body_string(), "[]");
//! ```

#![warn(missing_docs)]

mod config;
mod interceptor;
mod latch;
mod latency;
mod logging;
mod matcher;
mod registry;
mod request;
mod response;
mod result;
mod stub;
mod transport;

pub use config::{LatencyPolicy, StubConfig, LATCH_TIMEOUT_ENV, RANDOM_LATENCY_ENV};
pub use interceptor::{Interceptor, RequestContext};
pub use latch::{Latch, DEFAULT_LATCH_TIMEOUT};
pub use latency::LatencyInjector;
pub use logging::{init_test_logging, init_test_logging_with_level};
pub use matcher::RequestPattern;
pub use registry::{InFlightGuard, ResourceProvider, StubRegistry};
pub use request::{InterceptedRequest, RequestBody, RequestId, BODY_CHUNK_SIZE};
pub use response::{
    AbortReason, CachePolicy, Delivery, HttpResponse, NetworkFailure, RecordingSink,
    ResponseHead, ResponseSink, ResponseVariant, StubbedResponse, HTTP_VERSION,
};
pub use result::{StubError, StubResult};
pub use stub::{Stub, StubHandle};
pub use transport::StubTransport;

/// Prelude for convenient imports
pub mod prelude {
    pub use super::config::*;
    pub use super::interceptor::*;
    pub use super::latch::*;
    pub use super::matcher::*;
    pub use super::registry::*;
    pub use super::request::*;
    pub use super::response::*;
    pub use super::result::*;
    pub use super::stub::*;
    pub use super::transport::*;
    pub use super::{init_test_logging, init_test_logging_with_level};
}
