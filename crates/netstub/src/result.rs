//! Result and error types for Netstub.
//!
//! Unmatched requests and latch timeouts are not represented here: both are
//! test-infrastructure defects and abort the calling test with a panic.

use crate::request::RequestId;
use crate::response::NetworkFailure;
use thiserror::Error;

/// Result type for Netstub operations
pub type StubResult<T> = Result<T, StubError>;

/// Errors that can occur in Netstub
#[derive(Debug, Error)]
pub enum StubError {
    /// HTTP method token was empty or contained non-token characters
    #[error("Invalid HTTP method: {method:?}")]
    InvalidMethod {
        /// The rejected method token
        method: String,
    },

    /// Reading a streamed request body failed
    #[error("Failed to read body of {method} {url}: {source}")]
    BodyRead {
        /// Request method
        method: String,
        /// Request URL
        url: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A completion was requested for a request that was never resolved
    #[error("No resolved request with id {id}")]
    UnknownRequest {
        /// Request identifier
        id: RequestId,
    },

    /// The same request was resolved twice
    #[error("Request {id} was already resolved")]
    AlreadyResolved {
        /// Request identifier
        id: RequestId,
    },

    /// Delivery ended without `did_finish` or `did_fail`
    #[error("Request {id} completed without a terminal signal")]
    Incomplete {
        /// Request identifier
        id: RequestId,
    },

    /// A failure stub answered the request
    #[error("Network failure: {0}")]
    Network(#[from] NetworkFailure),

    /// An environment override could not be parsed
    #[error("Invalid configuration for {key}: {message}")]
    InvalidConfig {
        /// Environment variable name
        key: String,
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
