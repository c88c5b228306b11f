//! Tower Layer that attaches bearer tokens to outbound requests

use std::sync::Arc;

use tower::Layer;

use super::RequestAttributeBridge;
use super::service::OAuth2ClientService;

/// Tower Layer wrapping an outbound HTTP service with [`OAuth2ClientService`]
///
/// # Example
///
/// ```rust,ignore
/// use tower::ServiceBuilder;
/// use tokenwarden::bridge::{OAuth2ClientLayer, RequestAttributeBridge};
///
/// let client = ServiceBuilder::new()
///     .layer(OAuth2ClientLayer::new(RequestAttributeBridge::new(manager)))
///     .service(http_client);
/// ```
#[derive(Debug, Clone)]
pub struct OAuth2ClientLayer {
    bridge: Arc<RequestAttributeBridge>,
}

impl OAuth2ClientLayer {
    /// Create a layer around `bridge`
    pub fn new(bridge: RequestAttributeBridge) -> Self {
        Self {
            bridge: Arc::new(bridge),
        }
    }

    /// Create a layer from a shared bridge
    pub fn from_arc(bridge: Arc<RequestAttributeBridge>) -> Self {
        Self { bridge }
    }

    /// The bridge used by wrapped services
    pub fn bridge(&self) -> &Arc<RequestAttributeBridge> {
        &self.bridge
    }
}

impl<S> Layer<S> for OAuth2ClientLayer {
    type Service = OAuth2ClientService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        OAuth2ClientService::new(inner, Arc::clone(&self.bridge))
    }
}
