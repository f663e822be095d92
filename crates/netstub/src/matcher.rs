//! Request Matching
//!
//! A [`RequestPattern`] is an immutable predicate over intercepted requests.
//! Method and URL must match exactly; header and body expectations only
//! constrain what they name.

use crate::request::InterceptedRequest;
use crate::result::{StubError, StubResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Uppercase and validate an HTTP method token
pub(crate) fn normalize_method(method: &str) -> StubResult<String> {
    let is_token_char =
        |c: char| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c);
    if method.is_empty() || !method.chars().all(is_token_char) {
        return Err(StubError::InvalidMethod {
            method: method.to_string(),
        });
    }
    Ok(method.to_ascii_uppercase())
}

/// Which requests a stub applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPattern {
    method: String,
    url: String,
    /// Header name to expected value; `None` means the header must be absent
    headers: HashMap<String, Option<String>>,
    body: Option<Vec<u8>>,
}

impl RequestPattern {
    /// Match `method` (any case) and the exact `url`
    pub fn new(method: &str, url: &str) -> StubResult<Self> {
        Ok(Self::from_parts(normalize_method(method)?, url))
    }

    /// Match GET requests for `url`
    #[must_use]
    pub fn get(url: &str) -> Self {
        Self::from_parts("GET".to_string(), url)
    }

    /// Match POST requests for `url`
    #[must_use]
    pub fn post(url: &str) -> Self {
        Self::from_parts("POST".to_string(), url)
    }

    /// Match PUT requests for `url`
    #[must_use]
    pub fn put(url: &str) -> Self {
        Self::from_parts("PUT".to_string(), url)
    }

    /// Match DELETE requests for `url`
    #[must_use]
    pub fn delete(url: &str) -> Self {
        Self::from_parts("DELETE".to_string(), url)
    }

    fn from_parts(method: String, url: &str) -> Self {
        Self {
            method,
            url: url.to_string(),
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Require header `name` to equal `value`
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), Some(value.to_string()));
        self
    }

    /// Require header `name` to be absent
    #[must_use]
    pub fn without_header(mut self, name: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), None);
        self
    }

    /// Require the body to equal `body` byte for byte
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Require the body to equal the JSON serialisation of `data`
    pub fn with_json_body<T: Serialize>(mut self, data: &T) -> StubResult<Self> {
        self.body = Some(serde_json::to_vec(data)?);
        Ok(self)
    }

    /// Expected method
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Expected URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Check a request and its extracted body against this pattern
    #[must_use]
    pub fn matches(&self, request: &InterceptedRequest, body: Option<&[u8]>) -> bool {
        if request.method != self.method || request.url != self.url {
            return false;
        }

        let headers_match = self
            .headers
            .iter()
            .all(|(name, expected)| request.header(name) == expected.as_deref());
        if !headers_match {
            return false;
        }

        match &self.body {
            Some(expected) => body == Some(expected.as_slice()),
            None => true,
        }
    }
}

impl fmt::Display for RequestPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)?;
        if !self.headers.is_empty() {
            let mut headers: Vec<_> = self.headers.iter().collect();
            headers.sort();
            let rendered: Vec<String> = headers
                .into_iter()
                .map(|(name, value)| match value {
                    Some(value) => format!("{name}={value}"),
                    None => format!("{name}=<absent>"),
                })
                .collect();
            write!(f, " headers{{{}}}", rendered.join(", "))?;
        }
        if let Some(body) = &self.body {
            write!(f, " body={:?}", String::from_utf8_lossy(body))?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const URL: &str = "https://api.test/widgets";

    fn matches(pattern: &RequestPattern, mut request: InterceptedRequest) -> bool {
        let body = request.body_bytes().unwrap().map(<[u8]>::to_vec);
        pattern.matches(&request, body.as_deref())
    }

    mod method_tests {
        use super::*;

        #[test]
        fn test_method_case_insensitive_at_construction() {
            let pattern = RequestPattern::new("get", URL).unwrap();
            assert_eq!(pattern.method(), "GET");
            assert!(matches(&pattern, InterceptedRequest::get(URL)));
        }

        #[test]
        fn test_method_mismatch() {
            let pattern = RequestPattern::get(URL);
            assert!(!matches(&pattern, InterceptedRequest::post(URL)));
        }

        #[test]
        fn test_invalid_method() {
            assert!(RequestPattern::new("GET /", URL).is_err());
            assert!(RequestPattern::new("", URL).is_err());
            assert!(RequestPattern::new("M-SEARCH", URL).is_ok());
        }
    }

    mod url_tests {
        use super::*;

        #[test]
        fn test_url_exact() {
            let pattern = RequestPattern::get(URL);
            assert!(matches(&pattern, InterceptedRequest::get(URL)));
        }

        #[test]
        fn test_url_not_normalized() {
            let pattern = RequestPattern::get(URL);
            assert!(!matches(&pattern, InterceptedRequest::get("https://api.test/widgets/")));
            assert!(!matches(&pattern, InterceptedRequest::get("HTTPS://api.test/widgets")));
            assert!(!matches(&pattern, InterceptedRequest::get("https://api.test/widgets?a=1")));
        }
    }

    mod header_tests {
        use super::*;

        #[test]
        fn test_no_expectations_is_wildcard() {
            let pattern = RequestPattern::get(URL);
            let request = InterceptedRequest::get(URL).with_header("Accept", "text/html");
            assert!(matches(&pattern, request));
        }

        #[test]
        fn test_required_header_value() {
            let pattern = RequestPattern::get(URL).with_header("Accept", "application/json");
            assert!(matches(
                &pattern,
                InterceptedRequest::get(URL).with_header("accept", "application/json")
            ));
            assert!(!matches(
                &pattern,
                InterceptedRequest::get(URL).with_header("Accept", "text/html")
            ));
            assert!(!matches(&pattern, InterceptedRequest::get(URL)));
        }

        #[test]
        fn test_absent_header() {
            let pattern = RequestPattern::get(URL).without_header("Authorization");
            assert!(matches(&pattern, InterceptedRequest::get(URL)));
            assert!(!matches(
                &pattern,
                InterceptedRequest::get(URL).with_header("Authorization", "")
            ));
            assert!(!matches(
                &pattern,
                InterceptedRequest::get(URL).with_header("Authorization", "Bearer t")
            ));
        }

        #[test]
        fn test_later_expectation_replaces_earlier_in_any_case() {
            let pattern = RequestPattern::get(URL)
                .with_header("X-Mode", "a")
                .without_header("x-mode");
            assert_eq!(pattern, RequestPattern::get(URL).without_header("X-MODE"));
            assert!(matches(&pattern, InterceptedRequest::get(URL)));
            assert!(!matches(
                &pattern,
                InterceptedRequest::get(URL).with_header("X-Mode", "a")
            ));
        }
    }

    mod body_tests {
        use super::*;

        #[test]
        fn test_body_exact() {
            let pattern = RequestPattern::post(URL).with_body("name=foo");
            assert!(matches(
                &pattern,
                InterceptedRequest::post(URL).with_body("name=foo")
            ));
            assert!(!matches(
                &pattern,
                InterceptedRequest::post(URL).with_body("name=bar")
            ));
        }

        #[test]
        fn test_body_no_partial_match() {
            let pattern = RequestPattern::post(URL).with_body("name");
            assert!(!matches(
                &pattern,
                InterceptedRequest::post(URL).with_body("name=foo")
            ));
            assert!(!matches(&pattern, InterceptedRequest::post(URL)));
        }

        #[test]
        fn test_body_from_stream() {
            let pattern = RequestPattern::post(URL).with_body("streamed");
            let request = InterceptedRequest::post(URL)
                .with_body_stream(std::io::Cursor::new(b"streamed".to_vec()));
            assert!(matches(&pattern, request));
        }

        #[test]
        fn test_json_body() {
            let pattern = RequestPattern::post(URL)
                .with_json_body(&serde_json::json!({"name": "foo"}))
                .unwrap();
            assert!(matches(
                &pattern,
                InterceptedRequest::post(URL).with_body(r#"{"name":"foo"}"#)
            ));
        }
    }

    mod display_tests {
        use super::*;

        #[test]
        fn test_display_lists_expectations() {
            let pattern = RequestPattern::post(URL)
                .with_header("X", "y")
                .without_header("Authorization")
                .with_body("hi");
            assert_eq!(
                pattern.to_string(),
                "POST https://api.test/widgets headers{authorization=<absent>, x=y} body=\"hi\""
            );
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_matches_is_pure(
                path in "[a-z]{1,12}",
                header in proptest::option::of("[a-z]{0,8}"),
                body in proptest::option::of(proptest::collection::vec(any::<u8>(), 0..32)),
            ) {
                let url = format!("https://api.test/{path}");
                let mut pattern = RequestPattern::post(&url).with_header("X-Flag", "on");
                if let Some(body) = &body {
                    pattern = pattern.with_body(body.clone());
                }
                let mut request = InterceptedRequest::post(&url);
                if let Some(value) = &header {
                    request = request.with_header("X-Flag", value);
                }
                let snapshot = pattern.clone();

                let first = pattern.matches(&request, body.as_deref());
                let second = pattern.matches(&request, body.as_deref());
                prop_assert_eq!(first, second);
                prop_assert_eq!(first, header.as_deref() == Some("on"));
                prop_assert_eq!(&pattern, &snapshot);
            }
        }
    }
}
