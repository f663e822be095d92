//! Stubbed Responses
//!
//! What a stub hands back to the caller: an HTTP-shaped success or a network
//! failure. Both are delivered through a [`ResponseSink`], the callback
//! surface of the network-loading layer.
//!
//! Every delivery ends with exactly one terminal signal: `did_finish` for a
//! response, `did_fail` for a failure.

use crate::result::StubResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Protocol version reported on synthesized responses
pub const HTTP_VERSION: &str = "HTTP/1.1";

/// Reasons a simulated network call fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbortReason {
    /// Request failed
    Failed,
    /// Request was aborted
    Aborted,
    /// Request timed out
    TimedOut,
    /// Connection was refused
    ConnectionRefused,
    /// Connection was reset
    ConnectionReset,
    /// Internet is disconnected
    InternetDisconnected,
    /// DNS name could not be resolved
    NameNotResolved,
}

impl AbortReason {
    /// Error code for this abort reason
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::Failed => "net::ERR_FAILED",
            Self::Aborted => "net::ERR_ABORTED",
            Self::TimedOut => "net::ERR_TIMED_OUT",
            Self::ConnectionRefused => "net::ERR_CONNECTION_REFUSED",
            Self::ConnectionReset => "net::ERR_CONNECTION_RESET",
            Self::InternetDisconnected => "net::ERR_INTERNET_DISCONNECTED",
            Self::NameNotResolved => "net::ERR_NAME_NOT_RESOLVED",
        }
    }
}

/// The failure surfaced to the caller by a failure stub
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{}{}", .reason.message(), description_suffix(.description))]
pub struct NetworkFailure {
    /// Failure kind
    pub reason: AbortReason,
    /// Optional human-readable detail
    pub description: Option<String>,
}

fn description_suffix(description: &Option<String>) -> String {
    description
        .as_ref()
        .map(|d| format!(": {d}"))
        .unwrap_or_default()
}

impl NetworkFailure {
    /// Failure with no detail
    #[must_use]
    pub const fn new(reason: AbortReason) -> Self {
        Self {
            reason,
            description: None,
        }
    }

    /// Attach a description
    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

/// Storage policy attached to a synthesized response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CachePolicy {
    /// Response may be stored
    Allowed,
    /// Response must not be stored
    #[default]
    NotAllowed,
}

/// Status line and headers delivered before any body bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHead {
    /// URL of the request being answered
    pub url: String,
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HashMap<String, String>,
    /// Protocol version
    pub http_version: String,
    /// Storage policy
    pub cache_policy: CachePolicy,
}

/// Callbacks of the network-loading layer that receive a stubbed delivery
pub trait ResponseSink {
    /// Response head is available
    fn did_receive_response(&mut self, head: ResponseHead);

    /// Body bytes are available
    fn did_load(&mut self, data: &[u8]);

    /// Successful terminal signal
    fn did_finish(&mut self);

    /// Failed terminal signal
    fn did_fail(&mut self, failure: NetworkFailure);
}

/// A successful HTTP-shaped response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HashMap<String, String>,
    /// Response body
    pub body: Option<Vec<u8>>,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self {
            status: 200,
            headers: HashMap::new(),
            body: None,
        }
    }
}

impl HttpResponse {
    /// 200 with no headers or body
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// What a stub emits: a response or a failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseVariant {
    /// Successful response
    Http(HttpResponse),
    /// Simulated network failure
    Failure(NetworkFailure),
}

impl Default for ResponseVariant {
    fn default() -> Self {
        Self::Http(HttpResponse::default())
    }
}

impl From<HttpResponse> for ResponseVariant {
    fn from(response: HttpResponse) -> Self {
        Self::Http(response)
    }
}

impl From<NetworkFailure> for ResponseVariant {
    fn from(failure: NetworkFailure) -> Self {
        Self::Failure(failure)
    }
}

impl ResponseVariant {
    /// Empty 200 response
    #[must_use]
    pub fn ok() -> Self {
        Self::default()
    }

    /// Empty response with `status`
    #[must_use]
    pub fn status(status: u16) -> Self {
        Self::Http(HttpResponse {
            status,
            ..HttpResponse::default()
        })
    }

    /// 200 text response
    #[must_use]
    pub fn text(content: &str) -> Self {
        Self::ok()
            .with_header("Content-Type", "text/plain")
            .with_body(content)
    }

    /// 200 JSON response
    pub fn json<T: Serialize>(data: &T) -> StubResult<Self> {
        let body = serde_json::to_vec(data)?;
        Ok(Self::ok()
            .with_header("Content-Type", "application/json")
            .with_body(body))
    }

    /// Simulated network failure
    #[must_use]
    pub const fn failure(reason: AbortReason) -> Self {
        Self::Failure(NetworkFailure::new(reason))
    }

    /// Set status code; no effect on a failure
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        if let Self::Http(response) = &mut self {
            response.status = status;
        }
        self
    }

    /// Add a header; no effect on a failure
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let Self::Http(response) = &mut self {
            response.headers.insert(name.to_string(), value.to_string());
        }
        self
    }

    /// Set body; no effect on a failure
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        if let Self::Http(response) = &mut self {
            response.body = Some(body.into());
        }
        self
    }

    /// Whether this variant ends in `did_fail`
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Deliver this variant to `sink` as the answer to `url`
    pub fn emit(&self, sink: &mut dyn ResponseSink, url: &str) {
        match self {
            Self::Http(response) => {
                tracing::debug!(url, status = response.status, "emitting stubbed response");
                sink.did_receive_response(ResponseHead {
                    url: url.to_string(),
                    status: response.status,
                    headers: response.headers.clone(),
                    http_version: HTTP_VERSION.to_string(),
                    cache_policy: CachePolicy::NotAllowed,
                });
                if let Some(body) = &response.body {
                    sink.did_load(body);
                }
                sink.did_finish();
            }
            Self::Failure(failure) => {
                tracing::debug!(url, %failure, "emitting stubbed failure");
                sink.did_fail(failure.clone());
            }
        }
    }
}

impl fmt::Display for ResponseVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(response) => {
                write!(f, "{}", response.status)?;
                if let Some(body) = &response.body {
                    write!(f, " ({} bytes)", body.len())?;
                }
                Ok(())
            }
            Self::Failure(failure) => write!(f, "failure {failure}"),
        }
    }
}

/// A response received by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubbedResponse {
    /// Status line and headers
    pub head: ResponseHead,
    /// Concatenated body bytes
    pub body: Vec<u8>,
}

impl StubbedResponse {
    /// HTTP status code
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.head.status
    }

    /// Header value by exact name
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.headers.get(name).map(String::as_str)
    }

    /// Get body as string
    #[must_use]
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

/// Final outcome of one delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// `did_finish` was signalled
    Response(StubbedResponse),
    /// `did_fail` was signalled
    Failed(NetworkFailure),
}

/// [`ResponseSink`] that records everything it receives
#[derive(Debug, Default)]
pub struct RecordingSink {
    head: Option<ResponseHead>,
    body: Vec<u8>,
    finished: bool,
    failure: Option<NetworkFailure>,
    terminal_signals: usize,
}

impl RecordingSink {
    /// Empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of terminal signals seen (`did_finish` plus `did_fail`)
    #[must_use]
    pub const fn terminal_signals(&self) -> usize {
        self.terminal_signals
    }

    /// Whether a terminal signal was seen
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.terminal_signals > 0
    }

    /// Outcome, or `None` while no terminal signal has arrived
    #[must_use]
    pub fn into_delivery(self) -> Option<Delivery> {
        if let Some(failure) = self.failure {
            return Some(Delivery::Failed(failure));
        }
        if !self.finished {
            return None;
        }
        self.head.map(|head| {
            Delivery::Response(StubbedResponse {
                head,
                body: self.body,
            })
        })
    }
}

impl ResponseSink for RecordingSink {
    fn did_receive_response(&mut self, head: ResponseHead) {
        self.head = Some(head);
    }

    fn did_load(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
    }

    fn did_finish(&mut self) {
        self.finished = true;
        self.terminal_signals += 1;
    }

    fn did_fail(&mut self, failure: NetworkFailure) {
        self.failure = Some(failure);
        self.terminal_signals += 1;
    }
}
