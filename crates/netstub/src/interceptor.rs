//! Request Interceptor
//!
//! The hook the network-loading layer calls for every outbound request.
//! Requests go through two phases:
//!
//! 1. `can_accept` + `resolve`: the request is matched against the registry
//!    and the chosen stub is stored in a per-request context.
//! 2. `start`: the context is consumed, the stub's delay gate is awaited,
//!    optional latency is injected, and the response is emitted.
//!
//! Matching and completion are separate phases: a delayed stub holds back
//! only its own completion, never other requests' matching.

use crate::latency::LatencyInjector;
use crate::registry::{InFlightGuard, StubRegistry};
use crate::request::{InterceptedRequest, RequestId};
use crate::response::ResponseSink;
use crate::result::{StubError, StubResult};
use crate::stub::StubHandle;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Per-request state carried from `resolve` to `start`
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Request identity
    pub request_id: RequestId,
    /// Stub chosen for the request
    pub stub: StubHandle,
    /// URL answered by the stub
    pub url: String,
}

/// Interception point between the network-loading layer and the registry
#[derive(Debug)]
pub struct Interceptor {
    registry: Arc<StubRegistry>,
    latency: LatencyInjector,
    admitted: Mutex<HashMap<RequestId, InFlightGuard>>,
    contexts: Mutex<HashMap<RequestId, RequestContext>>,
}

impl Interceptor {
    /// Interceptor over `registry`, using its latency settings
    #[must_use]
    pub fn new(registry: Arc<StubRegistry>) -> Self {
        let config = registry.config();
        let latency = LatencyInjector::new(config.latency, config.latency_seed);
        Self {
            registry,
            latency,
            admitted: Mutex::new(HashMap::new()),
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// Registry consulted by this interceptor
    #[must_use]
    pub const fn registry(&self) -> &Arc<StubRegistry> {
        &self.registry
    }

    /// Admit a request. Always accepts; the request counts as in flight
    /// until it is resolved or stopped.
    pub fn can_accept(&self, request: &InterceptedRequest) -> bool {
        let guard = self.registry.begin_match();
        lock(&self.admitted).insert(request.id(), guard);
        tracing::trace!(request = %request.id(), "request admitted");
        true
    }

    /// Match `request` and attach the chosen stub to its context.
    ///
    /// # Panics
    ///
    /// Panics when no registered stub matches (see [`StubRegistry::find`]).
    pub fn resolve(&self, request: &mut InterceptedRequest) -> StubResult<RequestContext> {
        let id = request.id();
        // Held until the match has been evaluated, then dropped on every path.
        let _admission = lock(&self.admitted).remove(&id);
        if lock(&self.contexts).contains_key(&id) {
            return Err(StubError::AlreadyResolved { id });
        }

        let body = request.body_bytes()?.map(<[u8]>::to_vec);
        let stub = self.registry.find(request, body.as_deref());

        let context = RequestContext {
            request_id: id,
            stub,
            url: request.url.clone(),
        };
        lock(&self.contexts).insert(id, context.clone());
        Ok(context)
    }

    /// Complete a resolved request: await the stub's delay gate, inject
    /// latency if enabled, then emit the response to `sink`.
    ///
    /// # Panics
    ///
    /// Panics when the stub's delay latch times out.
    pub fn start(&self, id: RequestId, sink: &mut dyn ResponseSink) -> StubResult<()> {
        let context = lock(&self.contexts)
            .remove(&id)
            .ok_or(StubError::UnknownRequest { id })?;

        context.stub.await_permission_to_complete();
        if let Some(latency) = self.latency.maybe_sleep() {
            tracing::debug!(request = %id, ?latency, "latency injected");
        }
        context.stub.emit(sink, &context.url);
        tracing::debug!(request = %id, stub = %context.stub.id(), "request completed");
        Ok(())
    }

    /// Loading finished or was cancelled by the caller.
    ///
    /// Drops any admission or context still held for `id`. A request
    /// abandoned before `resolve` no longer counts as in flight, and one
    /// abandoned before `start` no longer holds its stub.
    pub fn stop(&self, id: RequestId) {
        let admission = lock(&self.admitted).remove(&id);
        let context = lock(&self.contexts).remove(&id);
        tracing::trace!(
            request = %id,
            admitted = admission.is_some(),
            resolved = context.is_some(),
            "request stopped"
        );
    }

    /// Requests resolved but not yet started
    #[must_use]
    pub fn pending_contexts(&self) -> usize {
        lock(&self.contexts).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::config::{LatencyPolicy, StubConfig};
    use crate::matcher::RequestPattern;
    use crate::response::{AbortReason, Delivery, RecordingSink, ResponseVariant};
    use std::thread;
    use std::time::Duration;

    const URL: &str = "https://api.test/widgets";

    fn interceptor() -> Interceptor {
        let config = StubConfig::new()
            .with_latch_timeout(Duration::from_secs(2))
            .with_latency(LatencyPolicy::Disabled);
        Interceptor::new(StubRegistry::shared(config))
    }

    fn complete(interceptor: &Interceptor, mut request: InterceptedRequest) -> Delivery {
        assert!(interceptor.can_accept(&request));
        let context = interceptor.resolve(&mut request).unwrap();
        let mut sink = RecordingSink::new();
        interceptor.start(context.request_id, &mut sink).unwrap();
        interceptor.stop(context.request_id);
        sink.into_delivery().expect("terminal signal")
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn test_resolve_attaches_context() {
            let interceptor = interceptor();
            let stub = interceptor
                .registry()
                .add(RequestPattern::get(URL), ResponseVariant::text("[]"));

            let mut request = InterceptedRequest::get(URL);
            interceptor.can_accept(&request);
            assert_eq!(interceptor.registry().in_flight(), 1);

            let context = interceptor.resolve(&mut request).unwrap();
            assert_eq!(context.request_id, request.id());
            assert!(context.stub.ptr_eq(&stub));
            assert_eq!(interceptor.pending_contexts(), 1);
            assert_eq!(interceptor.registry().in_flight(), 0);
        }

        #[test]
        fn test_start_consumes_context() {
            let interceptor = interceptor();
            interceptor
                .registry()
                .add(RequestPattern::get(URL), ResponseVariant::text("[]"));

            let delivery = complete(&interceptor, InterceptedRequest::get(URL));
            let Delivery::Response(response) = delivery else {
                panic!("expected response");
            };
            assert_eq!(response.status(), 200);
            assert_eq!(response.body_string(), "[]");
            assert_eq!(interceptor.pending_contexts(), 0);
        }

        #[test]
        fn test_failure_stub_delivers_failure() {
            let interceptor = interceptor();
            interceptor.registry().add(
                RequestPattern::get(URL),
                ResponseVariant::failure(AbortReason::ConnectionReset),
            );
            let delivery = complete(&interceptor, InterceptedRequest::get(URL));
            assert!(matches!(
                delivery,
                Delivery::Failed(failure) if failure.reason == AbortReason::ConnectionReset
            ));
        }

        #[test]
        fn test_start_unknown_request() {
            let interceptor = interceptor();
            let mut sink = RecordingSink::new();
            let err = interceptor.start(RequestId::new(), &mut sink).unwrap_err();
            assert!(matches!(err, StubError::UnknownRequest { .. }));
            assert!(!sink.is_complete());
        }

        #[test]
        fn test_resolve_twice() {
            let interceptor = interceptor();
            interceptor
                .registry()
                .add(RequestPattern::get(URL), ResponseVariant::ok());
            let mut request = InterceptedRequest::get(URL);
            interceptor.resolve(&mut request).unwrap();
            let err = interceptor.resolve(&mut request).unwrap_err();
            assert!(matches!(err, StubError::AlreadyResolved { .. }));
        }

        #[test]
        fn test_stop_before_resolve_releases_admission() {
            let interceptor = interceptor();
            let request = InterceptedRequest::get(URL);
            interceptor.can_accept(&request);
            assert_eq!(interceptor.registry().in_flight(), 1);

            interceptor.stop(request.id());
            assert_eq!(interceptor.registry().in_flight(), 0);
            interceptor.registry().clear_all();
        }

        #[test]
        fn test_readmitted_request_releases_admission() {
            let interceptor = interceptor();
            interceptor
                .registry()
                .add(RequestPattern::get(URL), ResponseVariant::ok());
            let mut request = InterceptedRequest::get(URL);
            interceptor.can_accept(&request);
            interceptor.resolve(&mut request).unwrap();

            interceptor.can_accept(&request);
            let err = interceptor.resolve(&mut request).unwrap_err();
            assert!(matches!(err, StubError::AlreadyResolved { .. }));
            assert_eq!(interceptor.registry().in_flight(), 0);
            interceptor.registry().clear_all();
            assert!(interceptor.registry().is_empty());
        }

        #[test]
        fn test_stop_after_resolve_drops_context() {
            let interceptor = interceptor();
            interceptor
                .registry()
                .add(RequestPattern::get(URL), ResponseVariant::ok());
            for _ in 0..10 {
                let mut request = InterceptedRequest::get(URL);
                interceptor.can_accept(&request);
                interceptor.resolve(&mut request).unwrap();
                interceptor.stop(request.id());
            }
            assert_eq!(interceptor.pending_contexts(), 0);
            assert_eq!(interceptor.registry().in_flight(), 0);
        }

        #[test]
        fn test_start_after_stop_is_unknown() {
            let interceptor = interceptor();
            interceptor
                .registry()
                .add(RequestPattern::get(URL), ResponseVariant::ok());
            let mut request = InterceptedRequest::get(URL);
            let id = interceptor.resolve(&mut request).unwrap().request_id;
            interceptor.stop(id);

            let mut sink = RecordingSink::new();
            let err = interceptor.start(id, &mut sink).unwrap_err();
            assert!(matches!(err, StubError::UnknownRequest { .. }));
            assert!(!sink.is_complete());
        }

        #[test]
        fn test_body_read_failure_releases_admission() {
            struct Broken;
            impl std::io::Read for Broken {
                fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                    Err(std::io::Error::other("socket closed"))
                }
            }

            let interceptor = interceptor();
            let mut request = InterceptedRequest::post(URL).with_body_stream(Broken);
            interceptor.can_accept(&request);
            let err = interceptor.resolve(&mut request).unwrap_err();
            assert!(matches!(err, StubError::BodyRead { .. }));
            assert_eq!(interceptor.registry().in_flight(), 0);
        }

        #[test]
        fn test_streamed_body_matches() {
            let interceptor = interceptor();
            interceptor.registry().add(
                RequestPattern::post(URL).with_body("name=foo"),
                ResponseVariant::status(201),
            );
            let request = InterceptedRequest::post(URL)
                .with_body_stream(std::io::Cursor::new(b"name=foo".to_vec()));
            let Delivery::Response(response) = complete(&interceptor, request) else {
                panic!("expected response");
            };
            assert_eq!(response.status(), 201);
        }
    }

    mod delay_tests {
        use super::*;

        #[test]
        fn test_delayed_stub_blocks_only_its_completion() {
            let interceptor = Arc::new(interceptor());
            let slow = interceptor
                .registry()
                .add(RequestPattern::get(URL), ResponseVariant::text("slow"))
                .delay();
            interceptor.registry().add(
                RequestPattern::get("https://api.test/fast"),
                ResponseVariant::text("fast"),
            );

            let mut slow_request = InterceptedRequest::get(URL);
            let slow_id = interceptor.resolve(&mut slow_request).unwrap().request_id;
            let completer = {
                let interceptor = Arc::clone(&interceptor);
                thread::spawn(move || {
                    let mut sink = RecordingSink::new();
                    interceptor.start(slow_id, &mut sink).unwrap();
                    sink
                })
            };

            // Another request resolves and completes while the first is held.
            let fast = complete(&interceptor, InterceptedRequest::get("https://api.test/fast"));
            assert!(matches!(fast, Delivery::Response(_)));
            assert!(!completer.is_finished());
            assert_eq!(slow.completions(), 0);

            slow.release();
            let sink = completer.join().unwrap();
            assert!(sink.is_complete());
            assert_eq!(slow.completions(), 1);
        }

        #[test]
        fn test_latency_enabled_still_delivers() {
            let config = StubConfig::new()
                .with_latency(LatencyPolicy::Enabled)
                .with_latency_seed(11);
            let interceptor = Interceptor::new(StubRegistry::shared(config));
            interceptor
                .registry()
                .add(RequestPattern::get(URL), ResponseVariant::ok());
            assert!(matches!(
                complete(&interceptor, InterceptedRequest::get(URL)),
                Delivery::Response(_)
            ));
        }
    }
}
