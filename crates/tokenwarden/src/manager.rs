//! Authorized client manager
//!
//! Coordinates registry lookup, store lookup, the provider chain and persistence for a
//! single [`AuthorizeRequest`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::Duration;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::clock::{Clock, SystemClock};
use crate::context::{
    AuthorizationContext, PASSWORD_ATTRIBUTE_NAME, REQUEST_SCOPE_ATTRIBUTE_NAME,
    USERNAME_ATTRIBUTE_NAME,
};
use crate::error::{AuthError, AuthResult};
use crate::providers::{AuthorizedClientProvider, DEFAULT_CLOCK_SKEW_SECS, ProviderChain};
use crate::registration::ClientRegistry;
use crate::store::AuthorizedClientStore;
use crate::transport::TransportContext;
use crate::types::{AuthorizedClient, Principal};

#[derive(Debug, Clone)]
enum Target {
    RegistrationId(String),
    AuthorizedClient(AuthorizedClient),
}

/// Input of [`AuthorizedClientManager::authorize`]
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    target: Target,
    principal: Principal,
    transport: Option<TransportContext>,
    attributes: HashMap<String, Value>,
    allow_stale: bool,
}

impl AuthorizeRequest {
    /// Authorize the client registered under `registration_id`
    pub fn with_client_registration_id(
        registration_id: impl Into<String>,
    ) -> AuthorizeRequestBuilder {
        AuthorizeRequestBuilder::new(Target::RegistrationId(registration_id.into()))
    }

    /// Re-authorize an existing client
    ///
    /// The principal defaults to one named after the client's principal name.
    pub fn with_authorized_client(client: AuthorizedClient) -> AuthorizeRequestBuilder {
        let principal = Principal::new(client.principal_name());
        let mut builder = AuthorizeRequestBuilder::new(Target::AuthorizedClient(client));
        builder.principal = Some(principal);
        builder
    }

    /// Registration id being authorized
    pub fn client_registration_id(&self) -> &str {
        match &self.target {
            Target::RegistrationId(id) => id,
            Target::AuthorizedClient(client) => client.registration_id(),
        }
    }

    /// Existing client, if the request was built from one
    pub fn authorized_client(&self) -> Option<&AuthorizedClient> {
        match &self.target {
            Target::AuthorizedClient(client) => Some(client),
            Target::RegistrationId(_) => None,
        }
    }

    /// Principal the call is made for
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Transport context of the call, if any
    pub fn transport(&self) -> Option<&TransportContext> {
        self.transport.as_ref()
    }

    /// Caller-supplied attributes
    pub fn attributes(&self) -> &HashMap<String, Value> {
        &self.attributes
    }

    /// Whether an expired existing client may be returned when nothing renews it
    pub fn allows_stale(&self) -> bool {
        self.allow_stale
    }
}

/// Builder for [`AuthorizeRequest`]
#[derive(Debug)]
pub struct AuthorizeRequestBuilder {
    target: Target,
    principal: Option<Principal>,
    transport: Option<TransportContext>,
    attributes: HashMap<String, Value>,
    allow_stale: bool,
}

impl AuthorizeRequestBuilder {
    fn new(target: Target) -> Self {
        Self {
            target,
            principal: None,
            transport: None,
            attributes: HashMap::new(),
            allow_stale: false,
        }
    }

    /// Set the principal
    #[must_use]
    pub fn principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Set an authenticated principal by name
    #[must_use]
    pub fn principal_name(self, name: impl Into<String>) -> Self {
        self.principal(Principal::new(name))
    }

    /// Set the transport context
    #[must_use]
    pub fn transport(mut self, transport: TransportContext) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set an attribute
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Merge attributes
    #[must_use]
    pub fn attributes(mut self, attributes: HashMap<String, Value>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    /// Accept an expired existing client when nothing renews it
    #[must_use]
    pub fn allow_stale(mut self, allow_stale: bool) -> Self {
        self.allow_stale = allow_stale;
        self
    }

    /// Build the request
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the principal is missing or the
    /// registration id is empty.
    pub fn build(self) -> AuthResult<AuthorizeRequest> {
        if let Target::RegistrationId(id) = &self.target
            && id.trim().is_empty()
        {
            return Err(AuthError::configuration(
                "client registration id cannot be empty",
            ));
        }
        let principal = self
            .principal
            .ok_or_else(|| AuthError::configuration("principal is required"))?;

        Ok(AuthorizeRequest {
            target: self.target,
            principal,
            transport: self.transport,
            attributes: self.attributes,
            allow_stale: self.allow_stale,
        })
    }
}

/// Derives provider attributes from an [`AuthorizeRequest`]
///
/// Closures `Fn(&AuthorizeRequest) -> HashMap<String, Value>` implement it.
pub trait ContextAttributesMapper: Send + Sync {
    /// Attributes for the authorization context
    fn map(&self, request: &AuthorizeRequest) -> HashMap<String, Value>;
}

impl<F> ContextAttributesMapper for F
where
    F: Fn(&AuthorizeRequest) -> HashMap<String, Value> + Send + Sync,
{
    fn map(&self, request: &AuthorizeRequest) -> HashMap<String, Value> {
        self(request)
    }
}

impl fmt::Debug for dyn ContextAttributesMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContextAttributesMapper")
    }
}

fn query_param(request: &AuthorizeRequest, name: &str) -> Option<String> {
    request
        .transport()
        .and_then(|t| t.request.as_ref())
        .and_then(|r| r.query_param(name))
}

/// Maps the space-delimited `scope` query parameter to `request_scope`
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeAttributesMapper;

impl ContextAttributesMapper for ScopeAttributesMapper {
    fn map(&self, request: &AuthorizeRequest) -> HashMap<String, Value> {
        let mut attributes = HashMap::new();
        if let Some(scope) = query_param(request, "scope").filter(|s| !s.trim().is_empty()) {
            let scopes = scope
                .split_whitespace()
                .map(|s| Value::String(s.to_string()))
                .collect();
            attributes.insert(
                REQUEST_SCOPE_ATTRIBUTE_NAME.to_string(),
                Value::Array(scopes),
            );
        }
        attributes
    }
}

/// Maps `scope`, `username` and `password` query parameters
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordAttributesMapper;

impl ContextAttributesMapper for PasswordAttributesMapper {
    fn map(&self, request: &AuthorizeRequest) -> HashMap<String, Value> {
        let mut attributes = ScopeAttributesMapper.map(request);
        for name in [USERNAME_ATTRIBUTE_NAME, PASSWORD_ATTRIBUTE_NAME] {
            if let Some(value) = query_param(request, name) {
                attributes.insert(name.to_string(), Value::String(value));
            }
        }
        attributes
    }
}

/// Mapper for password-grant deployments
pub fn password_attributes_mapper() -> PasswordAttributesMapper {
    PasswordAttributesMapper
}

/// Obtains, renews and persists authorized clients
///
/// Immutable after construction; share it through an `Arc`.
#[derive(Debug, Clone)]
pub struct AuthorizedClientManager {
    registry: Arc<dyn ClientRegistry>,
    store: Arc<dyn AuthorizedClientStore>,
    provider: Arc<dyn AuthorizedClientProvider>,
    attributes_mapper: Arc<dyn ContextAttributesMapper>,
    clock: Arc<dyn Clock>,
    clock_skew: Duration,
}

impl AuthorizedClientManager {
    /// Create a manager with the scope attributes mapper and the system clock
    pub fn new(
        registry: Arc<dyn ClientRegistry>,
        store: Arc<dyn AuthorizedClientStore>,
        provider: Arc<dyn AuthorizedClientProvider>,
    ) -> Self {
        Self {
            registry,
            store,
            provider,
            attributes_mapper: Arc::new(ScopeAttributesMapper),
            clock: Arc::new(SystemClock),
            clock_skew: Duration::seconds(i64::from(DEFAULT_CLOCK_SKEW_SECS)),
        }
    }

    /// Create a manager around a [`ProviderChain`]
    ///
    /// The staleness check reads the chain's clock and skew, so it never disagrees
    /// with the strategies about whether a token is expired.
    pub fn with_provider_chain(
        registry: Arc<dyn ClientRegistry>,
        store: Arc<dyn AuthorizedClientStore>,
        chain: ProviderChain,
    ) -> Self {
        let clock = Arc::clone(chain.clock());
        let clock_skew = chain.clock_skew();
        Self {
            clock,
            clock_skew,
            ..Self::new(registry, store, Arc::new(chain))
        }
    }

    /// Replace the context attributes mapper
    #[must_use]
    pub fn with_context_attributes_mapper(
        mut self,
        mapper: Arc<dyn ContextAttributesMapper>,
    ) -> Self {
        self.attributes_mapper = mapper;
        self
    }

    /// Clock and skew for the staleness check when the provider is not a [`ProviderChain`]
    #[must_use]
    pub fn with_expiry_clock(mut self, clock: Arc<dyn Clock>, clock_skew: Duration) -> Self {
        self.clock = clock;
        self.clock_skew = clock_skew;
        self
    }

    /// The store clients are persisted to
    pub fn store(&self) -> &Arc<dyn AuthorizedClientStore> {
        &self.store
    }

    /// Authorize (or re-authorize) the request's client
    ///
    /// Returns the stored client unchanged when nothing needs renewing, a newly
    /// persisted client when a provider issued one, and `None` when no client can be
    /// produced. An expired existing client that no provider renews is only returned
    /// when the request [allows stale](AuthorizeRequestBuilder::allow_stale) results.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Configuration`] if the store needs a transport context and the
    ///   request has none
    /// - [`AuthError::NotFound`] if the registration id is unknown
    /// - any error from the store or the providers
    #[instrument(
        skip_all,
        fields(
            registration_id = request.client_registration_id(),
            principal = request.principal().name(),
        )
    )]
    pub async fn authorize(
        &self,
        request: AuthorizeRequest,
    ) -> AuthResult<Option<AuthorizedClient>> {
        let transport = request.transport();
        if transport.is_none() && self.store.requires_transport() {
            return Err(AuthError::configuration(
                "the authorized client store requires a transport context",
            ));
        }

        let principal = request.principal().clone();
        let context = match request.authorized_client() {
            Some(client) => AuthorizationContext::for_authorized_client(client.clone(), principal),
            None => {
                let registration_id = request.client_registration_id();
                let registration = self
                    .registry
                    .find_by_registration_id(registration_id)
                    .ok_or_else(|| AuthError::not_found(registration_id))?;
                match self.store.load(registration_id, &principal, transport).await? {
                    Some(client) => {
                        debug!("found stored authorized client");
                        AuthorizationContext::for_authorized_client(client, principal)
                    }
                    None => AuthorizationContext::for_registration(registration, principal),
                }
            }
        };

        let mut attributes = self.attributes_mapper.map(&request);
        attributes.extend(request.attributes().clone());
        let context = context.with_attributes(attributes);

        if let Some(client) = self.provider.authorize(&context).await? {
            self.store
                .save(&client, context.principal(), transport)
                .await?;
            debug!("persisted authorized client");
            return Ok(Some(client));
        }

        match context.authorized_client() {
            Some(existing)
                if request.allows_stale()
                    || !existing.is_access_token_expired(self.clock.now(), self.clock_skew) =>
            {
                debug!("authorized client unchanged");
                Ok(Some(existing.clone()))
            }
            Some(_) => {
                debug!("authorized client expired and could not be renewed");
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use http::Request;
    use serde_json::json;

    use super::*;
    use crate::transport::InboundRequest;

    fn transport(uri: &str) -> TransportContext {
        let request = Request::builder().uri(uri).body(()).unwrap();
        TransportContext::default().with_request(InboundRequest::from_request(&request))
    }

    #[test]
    fn test_request_requires_principal() {
        let err = AuthorizeRequest::with_client_registration_id("svc")
            .build()
            .unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));

        let err = AuthorizeRequest::with_client_registration_id(" ")
            .principal_name("alice")
            .build()
            .unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[test]
    fn test_scope_mapper() {
        let request = AuthorizeRequest::with_client_registration_id("svc")
            .principal_name("alice")
            .transport(transport("https://app.example.com/?scope=read+write"))
            .build()
            .unwrap();
        let attributes = ScopeAttributesMapper.map(&request);
        assert_eq!(
            attributes.get(REQUEST_SCOPE_ATTRIBUTE_NAME),
            Some(&json!(["read", "write"]))
        );

        let request = AuthorizeRequest::with_client_registration_id("svc")
            .principal_name("alice")
            .build()
            .unwrap();
        assert!(ScopeAttributesMapper.map(&request).is_empty());
    }

    #[test]
    fn test_password_mapper() {
        let request = AuthorizeRequest::with_client_registration_id("svc")
            .principal_name("alice")
            .transport(transport(
                "https://app.example.com/login?username=alice&password=p%40ss",
            ))
            .build()
            .unwrap();
        let attributes = password_attributes_mapper().map(&request);
        assert_eq!(attributes.get(USERNAME_ATTRIBUTE_NAME), Some(&json!("alice")));
        assert_eq!(attributes.get(PASSWORD_ATTRIBUTE_NAME), Some(&json!("p@ss")));
    }
}
