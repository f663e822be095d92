//! Intercepted Requests
//!
//! The description of an outbound request as the network-loading layer hands
//! it to the interceptor: identity, method, URL, headers and a body that is
//! either in memory or still behind a reader.

use crate::matcher::normalize_method;
use crate::result::{StubError, StubResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io::{ErrorKind, Read};
use uuid::Uuid;

/// Chunk size used when draining a streamed body
pub const BODY_CHUNK_SIZE: usize = 64 * 1024;

/// Identity of one request across its resolve/start lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Mint a fresh identifier
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request body as supplied by the caller
#[derive(Default)]
pub enum RequestBody {
    /// No body
    #[default]
    Empty,
    /// Body already in memory
    Bytes(Vec<u8>),
    /// Body behind a reader, drained once before matching
    Stream(Box<dyn Read + Send>),
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Stream(_) => write!(f, "Stream(..)"),
        }
    }
}

/// An outbound request seen by the interceptor
#[derive(Debug)]
pub struct InterceptedRequest {
    id: RequestId,
    /// HTTP method, uppercase
    pub method: String,
    /// Absolute URL, compared verbatim
    pub url: String,
    /// Request headers, names lowercased by the builders
    pub headers: HashMap<String, String>,
    body: RequestBody,
}

impl InterceptedRequest {
    /// Create a request without headers or body
    pub fn new(method: &str, url: &str) -> StubResult<Self> {
        Ok(Self {
            id: RequestId::new(),
            method: normalize_method(method)?,
            url: url.to_string(),
            headers: HashMap::new(),
            body: RequestBody::Empty,
        })
    }

    /// GET request
    #[must_use]
    pub fn get(url: &str) -> Self {
        Self::with_known_method("GET", url)
    }

    /// POST request
    #[must_use]
    pub fn post(url: &str) -> Self {
        Self::with_known_method("POST", url)
    }

    fn with_known_method(method: &str, url: &str) -> Self {
        Self {
            id: RequestId::new(),
            method: method.to_string(),
            url: url.to_string(),
            headers: HashMap::new(),
            body: RequestBody::Empty,
        }
    }

    /// Add a header, replacing any earlier value under the same name in any case
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Set an in-memory body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = RequestBody::Bytes(body.into());
        self
    }

    /// Set a streamed body
    #[must_use]
    pub fn with_body_stream(mut self, reader: impl Read + Send + 'static) -> Self {
        self.body = RequestBody::Stream(Box::new(reader));
        self
    }

    /// Request identity
    #[must_use]
    pub const fn id(&self) -> RequestId {
        self.id
    }

    /// Header value, looked up case-insensitively by name
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Body bytes, draining a streamed body in [`BODY_CHUNK_SIZE`] chunks.
    ///
    /// A drained stream is replaced by its bytes, so repeated calls return
    /// the same body.
    pub fn body_bytes(&mut self) -> StubResult<Option<&[u8]>> {
        if let RequestBody::Stream(reader) = &mut self.body {
            let bytes = drain(reader.as_mut()).map_err(|source| StubError::BodyRead {
                method: self.method.clone(),
                url: self.url.clone(),
                source,
            })?;
            tracing::trace!(request = %self.id, len = bytes.len(), "drained streamed body");
            self.body = RequestBody::Bytes(bytes);
        }

        Ok(match &self.body {
            RequestBody::Bytes(bytes) => Some(bytes.as_slice()),
            RequestBody::Empty | RequestBody::Stream(_) => None,
        })
    }
}

impl fmt::Display for InterceptedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)?;
        if !self.headers.is_empty() {
            let mut headers: Vec<_> = self.headers.iter().collect();
            headers.sort();
            write!(f, " headers={:?}", headers)?;
        }
        match &self.body {
            RequestBody::Empty => Ok(()),
            RequestBody::Bytes(bytes) => {
                write!(f, " body={:?}", String::from_utf8_lossy(bytes))
            }
            RequestBody::Stream(_) => write!(f, " body=<stream>"),
        }
    }
}

fn drain(reader: &mut dyn Read) -> std::io::Result<Vec<u8>> {
    let mut body = Vec::new();
    let mut chunk = vec![0u8; BODY_CHUNK_SIZE];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => return Ok(body),
            Ok(n) => body.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}
