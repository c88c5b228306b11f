//! Transport context passed explicitly through the pipeline
//!
//! The inbound request snapshot and the response header sink are plain values carried
//! by [`crate::AuthorizeRequest`] and by outbound request attributes. Code sitting at a
//! framework boundary can expose them through a [`TransportContextAccessor`], and async
//! callers can bind them for a whole continuation with [`propagate::scope`].

use std::fmt;
use std::sync::Arc;

use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use parking_lot::Mutex;

use crate::types::Principal;

/// Snapshot of the inbound request that triggered the outbound call
#[derive(Debug, Clone)]
pub struct InboundRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
}

impl InboundRequest {
    /// Create a snapshot from its parts
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        Self {
            method,
            uri,
            headers,
        }
    }

    /// Snapshot an `http::Request` without taking its body
    pub fn from_request<B>(request: &http::Request<B>) -> Self {
        Self::new(
            request.method().clone(),
            request.uri().clone(),
            request.headers().clone(),
        )
    }

    /// Request method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request URI
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Request headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value as a string, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// First value of a decoded query parameter
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.uri.query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}

/// Shared header sink for the response paired with the inbound request
///
/// Clones write to the same map.
#[derive(Debug, Clone, Default)]
pub struct ResponseHeaders {
    headers: Arc<Mutex<HeaderMap>>,
}

impl ResponseHeaders {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, replacing any previous value
    pub fn insert(&self, name: HeaderName, value: HeaderValue) {
        self.headers.lock().insert(name, value);
    }

    /// Append a header value
    pub fn append(&self, name: HeaderName, value: HeaderValue) {
        self.headers.lock().append(name, value);
    }

    /// Current value of a header
    pub fn get(&self, name: &str) -> Option<HeaderValue> {
        self.headers.lock().get(name).cloned()
    }

    /// Copy of everything written so far
    pub fn snapshot(&self) -> HeaderMap {
        self.headers.lock().clone()
    }
}

/// Request/response handles of the call being served
#[derive(Debug, Clone, Default)]
pub struct TransportContext {
    /// Inbound request snapshot
    pub request: Option<InboundRequest>,
    /// Response header sink
    pub response: Option<ResponseHeaders>,
}

impl TransportContext {
    /// Create a context from both handles
    pub fn new(request: InboundRequest, response: ResponseHeaders) -> Self {
        Self {
            request: Some(request),
            response: Some(response),
        }
    }

    /// Set the inbound request
    #[must_use]
    pub fn with_request(mut self, request: InboundRequest) -> Self {
        self.request = Some(request);
        self
    }

    /// Set the response header sink
    #[must_use]
    pub fn with_response(mut self, response: ResponseHeaders) -> Self {
        self.response = Some(response);
        self
    }

    /// Neither handle is set
    pub fn is_empty(&self) -> bool {
        self.request.is_none() && self.response.is_none()
    }
}

/// Everything an outbound call may inherit from the code that issued it
#[derive(Debug, Clone, Default)]
pub struct AmbientContext {
    /// Transport handles
    pub transport: TransportContext,
    /// Authenticated principal, if any
    pub principal: Option<Principal>,
}

impl AmbientContext {
    /// Create an ambient context
    pub fn new(transport: TransportContext, principal: Option<Principal>) -> Self {
        Self {
            transport,
            principal,
        }
    }
}

/// Boundary adapter that captures the ambient context at call time
///
/// Returns `None` when nothing is bound. Any `Fn() -> Option<AmbientContext>` closure
/// implements it.
pub trait TransportContextAccessor: Send + Sync {
    /// The context bound to the current call, if any
    fn current(&self) -> Option<AmbientContext>;
}

impl<F> TransportContextAccessor for F
where
    F: Fn() -> Option<AmbientContext> + Send + Sync,
{
    fn current(&self) -> Option<AmbientContext> {
        self()
    }
}

impl fmt::Debug for dyn TransportContextAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TransportContextAccessor")
    }
}

/// Task-scoped propagation of an [`AmbientContext`]
pub mod propagate {
    use std::future::Future;

    use super::AmbientContext;

    tokio::task_local! {
        static AMBIENT: AmbientContext;
    }

    /// Run `future` with `context` bound for its whole execution
    ///
    /// Anything awaited inside, including the bridge service, sees the context through
    /// [`current`]. Spawned tasks do not inherit it.
    pub async fn scope<F>(context: AmbientContext, future: F) -> F::Output
    where
        F: Future,
    {
        AMBIENT.scope(context, future).await
    }

    /// The context bound by the innermost enclosing [`scope`]
    pub fn current() -> Option<AmbientContext> {
        AMBIENT.try_with(Clone::clone).ok()
    }
}
