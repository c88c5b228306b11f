//! Bearer propagation for outbound requests
//!
//! Outbound `http::Request`s carry [`ClientRequestAttributes`] in their extensions. The
//! [`RequestAttributeBridge`] completes them from the calling context, resolves which
//! client to authorize, runs the [`AuthorizedClientManager`] and sets the
//! `Authorization: Bearer` header. With the `middleware` feature the same flow is
//! available as a tower layer.
//!
//! ```rust,ignore
//! use tokenwarden::bridge::{self, RequestAttributesExt};
//!
//! let request = http::Request::get("https://api.example.com/repos")
//!     .body(())?
//!     .with_attributes(bridge::client_registration_id("github"))
//!     .with_attributes(bridge::principal(Principal::new("alice")));
//! ```

use std::fmt;
use std::sync::Arc;

use http::HeaderValue;
use http::header::AUTHORIZATION;
use tracing::{debug, trace};

use crate::error::{AuthError, AuthResult};
use crate::manager::{AuthorizeRequest, AuthorizeRequestBuilder, AuthorizedClientManager};
use crate::transport::{
    AmbientContext, InboundRequest, ResponseHeaders, TransportContext, TransportContextAccessor,
    propagate,
};
use crate::types::{AuthorizedClient, Principal};

#[cfg(feature = "middleware")]
mod layer;
#[cfg(feature = "middleware")]
mod service;

#[cfg(feature = "middleware")]
pub use layer::OAuth2ClientLayer;
#[cfg(feature = "middleware")]
pub use service::{OAuth2ClientService, OAuth2ClientServiceFuture};

/// Per-request authorization attributes, stored in the request extensions
#[derive(Debug, Clone, Default)]
pub struct ClientRequestAttributes {
    /// Client to re-authorize
    pub authorized_client: Option<AuthorizedClient>,
    /// Registration to authorize
    pub client_registration_id: Option<String>,
    /// Principal the call is made for
    pub principal: Option<Principal>,
    /// Inbound request that triggered the call
    pub transport_request: Option<InboundRequest>,
    /// Response paired with the inbound request
    pub transport_response: Option<ResponseHeaders>,
}

impl ClientRequestAttributes {
    /// Fill fields that are still empty from `ambient`
    pub fn merge_missing(&mut self, ambient: AmbientContext) {
        if self.principal.is_none() {
            self.principal = ambient.principal;
        }
        if self.transport_request.is_none() {
            self.transport_request = ambient.transport.request;
        }
        if self.transport_response.is_none() {
            self.transport_response = ambient.transport.response;
        }
    }

    /// Transport context assembled from the request/response fields
    pub fn transport(&self) -> Option<TransportContext> {
        let transport = TransportContext {
            request: self.transport_request.clone(),
            response: self.transport_response.clone(),
        };
        (!transport.is_empty()).then_some(transport)
    }
}

/// Set the client to re-authorize
pub fn authorized_client(client: AuthorizedClient) -> impl FnOnce(&mut ClientRequestAttributes) {
    move |attrs| attrs.authorized_client = Some(client)
}

/// Set the registration to authorize
pub fn client_registration_id(
    registration_id: impl Into<String>,
) -> impl FnOnce(&mut ClientRequestAttributes) {
    let registration_id = registration_id.into();
    move |attrs| attrs.client_registration_id = Some(registration_id)
}

/// Set the principal
pub fn principal(principal: Principal) -> impl FnOnce(&mut ClientRequestAttributes) {
    move |attrs| attrs.principal = Some(principal)
}

/// Set the inbound request
pub fn transport_request(request: InboundRequest) -> impl FnOnce(&mut ClientRequestAttributes) {
    move |attrs| attrs.transport_request = Some(request)
}

/// Set the response header sink
pub fn transport_response(
    response: ResponseHeaders,
) -> impl FnOnce(&mut ClientRequestAttributes) {
    move |attrs| attrs.transport_response = Some(response)
}

/// Applies attribute builders to an outbound request
pub trait RequestAttributesExt {
    /// Apply `f` to the request's attributes, creating them if needed
    #[must_use]
    fn with_attributes(self, f: impl FnOnce(&mut ClientRequestAttributes)) -> Self;

    /// The request's attributes, if any were set
    fn client_attributes(&self) -> Option<&ClientRequestAttributes>;
}

impl<B> RequestAttributesExt for http::Request<B> {
    fn with_attributes(mut self, f: impl FnOnce(&mut ClientRequestAttributes)) -> Self {
        let extensions = self.extensions_mut();
        match extensions.get_mut::<ClientRequestAttributes>() {
            Some(attrs) => f(attrs),
            None => {
                let mut attrs = ClientRequestAttributes::default();
                f(&mut attrs);
                extensions.insert(attrs);
            }
        }
        self
    }

    fn client_attributes(&self) -> Option<&ClientRequestAttributes> {
        self.extensions().get::<ClientRequestAttributes>()
    }
}

/// Registration defaults for requests that name no client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Registration used when the request names none
    pub default_client_registration_id: Option<String>,
    /// Fall back to the registration the principal logged in with
    pub default_oauth2_authorized_client: bool,
}

impl BridgeConfig {
    /// Set the default registration id
    #[must_use]
    pub fn default_client_registration_id(mut self, registration_id: impl Into<String>) -> Self {
        self.default_client_registration_id = Some(registration_id.into());
        self
    }

    /// Enable the principal's registration as a fallback
    #[must_use]
    pub fn default_oauth2_authorized_client(mut self, enabled: bool) -> Self {
        self.default_oauth2_authorized_client = enabled;
        self
    }
}

/// Resolves, authorizes and attaches the bearer token for outbound requests
pub struct RequestAttributeBridge {
    manager: Arc<AuthorizedClientManager>,
    config: BridgeConfig,
    accessor: Option<Arc<dyn TransportContextAccessor>>,
}

impl fmt::Debug for RequestAttributeBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestAttributeBridge")
            .field("config", &self.config)
            .field("accessor", &self.accessor.is_some())
            .finish_non_exhaustive()
    }
}

impl RequestAttributeBridge {
    /// Create a bridge with no defaults and no accessor
    pub fn new(manager: Arc<AuthorizedClientManager>) -> Self {
        Self {
            manager,
            config: BridgeConfig::default(),
            accessor: None,
        }
    }

    /// Set the registration defaults
    #[must_use]
    pub fn with_config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the boundary accessor consulted last
    #[must_use]
    pub fn with_accessor(mut self, accessor: Arc<dyn TransportContextAccessor>) -> Self {
        self.accessor = Some(accessor);
        self
    }

    /// Registration defaults
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Complete explicit attributes from the task scope, then from the accessor
    pub fn prepare(&self, explicit: Option<ClientRequestAttributes>) -> ClientRequestAttributes {
        let mut attrs = explicit.unwrap_or_default();
        if let Some(ambient) = propagate::current() {
            trace!("merging task-scoped context");
            attrs.merge_missing(ambient);
        }
        if let Some(ambient) = self.accessor.as_ref().and_then(|a| a.current()) {
            trace!("merging accessor context");
            attrs.merge_missing(ambient);
        }
        attrs
    }

    /// Registration to authorize when no client is attached
    pub fn resolve_client_registration_id(
        &self,
        attrs: &ClientRequestAttributes,
    ) -> Option<String> {
        attrs
            .client_registration_id
            .clone()
            .or_else(|| self.config.default_client_registration_id.clone())
            .or_else(|| {
                if !self.config.default_oauth2_authorized_client {
                    return None;
                }
                attrs
                    .principal
                    .as_ref()
                    .and_then(|p| p.authorized_client_registration_id())
                    .map(str::to_string)
            })
    }

    /// Authorize the client described by `attrs`
    ///
    /// An attached client is re-authorized first. When that yields nothing, the
    /// resolved registration id is authorized instead. Returns `None` when neither
    /// produces a client.
    ///
    /// # Errors
    ///
    /// Propagates every manager error.
    pub async fn authorize(
        &self,
        attrs: &ClientRequestAttributes,
    ) -> AuthResult<Option<AuthorizedClient>> {
        let mut fallback_principal = None;
        if let Some(client) = &attrs.authorized_client {
            let principal = attrs
                .principal
                .clone()
                .unwrap_or_else(|| Principal::new(client.principal_name()));
            let request = AuthorizeRequest::with_authorized_client(client.clone())
                .principal(principal.clone());
            if let Some(client) = self.send(request, attrs).await? {
                return Ok(Some(client));
            }
            debug!(
                registration_id = client.registration_id(),
                "attached client not renewed, resolving registration"
            );
            fallback_principal = Some(principal);
        }

        let Some(registration_id) = self.resolve_client_registration_id(attrs) else {
            trace!("no client registration resolved");
            return Ok(None);
        };
        let principal = fallback_principal
            .or_else(|| attrs.principal.clone())
            .unwrap_or_else(Principal::anonymous);
        let request =
            AuthorizeRequest::with_client_registration_id(registration_id).principal(principal);
        self.send(request, attrs).await
    }

    async fn send(
        &self,
        builder: AuthorizeRequestBuilder,
        attrs: &ClientRequestAttributes,
    ) -> AuthResult<Option<AuthorizedClient>> {
        let builder = match attrs.transport() {
            Some(transport) => builder.transport(transport),
            None => builder,
        };
        self.manager.authorize(builder.build()?).await
    }

    /// Authorize `request` and set its bearer header
    ///
    /// The completed attributes are written back to the request extensions. The request
    /// is left untouched apart from that when nothing resolves.
    ///
    /// # Errors
    ///
    /// Propagates manager errors, and returns [`AuthError::TokenExchange`] if the token
    /// is not a valid header value.
    pub async fn apply<B>(&self, request: &mut http::Request<B>) -> AuthResult<()> {
        let explicit = request.extensions_mut().remove::<ClientRequestAttributes>();
        let attrs = self.prepare(explicit);
        let authorized = self.authorize(&attrs).await;
        request.extensions_mut().insert(attrs);

        if let Some(client) = authorized? {
            bearer(request, &client)?;
            debug!(
                registration_id = client.registration_id(),
                "attached bearer token to outbound request"
            );
        }
        Ok(())
    }
}

/// Set `Authorization: Bearer <token>` from `client`
///
/// # Errors
///
/// Returns [`AuthError::TokenExchange`] if the token is not a valid header value.
pub fn bearer<B>(request: &mut http::Request<B>, client: &AuthorizedClient) -> AuthResult<()> {
    let value = HeaderValue::from_str(&format!(
        "Bearer {}",
        client.access_token().token_value
    ))
    .map_err(|_| {
        AuthError::token_exchange(
            client.registration_id(),
            "access token is not a valid header value",
        )
    })?;
    request.headers_mut().insert(AUTHORIZATION, value);
    Ok(())
}
