//! Tower Service that attaches bearer tokens to outbound requests

use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use tower::BoxError;
use tower_service::Service;

use super::RequestAttributeBridge;

/// Wraps an outbound HTTP service and authorizes each request before forwarding it
///
/// Requests that resolve no client are forwarded unmodified. Manager errors are
/// returned to the caller and the inner service is not called.
#[derive(Debug, Clone)]
pub struct OAuth2ClientService<S> {
    inner: S,
    bridge: Arc<RequestAttributeBridge>,
}

impl<S> OAuth2ClientService<S> {
    /// Create a service
    pub fn new(inner: S, bridge: Arc<RequestAttributeBridge>) -> Self {
        Self { inner, bridge }
    }

    /// Get a reference to the inner service
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Get a mutable reference to the inner service
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }
}

/// Future returned by [`OAuth2ClientService`]
pub type OAuth2ClientServiceFuture<T> = BoxFuture<'static, Result<T, BoxError>>;

impl<S, B> Service<http::Request<B>> for OAuth2ClientService<S>
where
    S: Service<http::Request<B>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = OAuth2ClientServiceFuture<S::Response>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, mut req: http::Request<B>) -> Self::Future {
        let bridge = Arc::clone(&self.bridge);
        let inner = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner);

        Box::pin(async move {
            bridge.apply(&mut req).await?;
            inner.call(req).await.map_err(Into::into)
        })
    }
}
