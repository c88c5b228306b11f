//! Grant-type strategies and the chain that runs them
//!
//! Each [`AuthorizedClientProvider`] either produces a new [`AuthorizedClient`] for the
//! context, or returns `None` when it has nothing to do. [`ProviderChain`] tries its
//! providers in order and stops at the first client.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use tracing::{debug, trace};

use crate::clock::{Clock, SystemClock};
use crate::context::AuthorizationContext;
use crate::error::{AuthError, AuthResult};
use crate::oauth2::TokenResponseClient;
use crate::registration::AuthorizationGrantType;
use crate::types::AuthorizedClient;

pub mod authorization_code;
pub mod client_credentials;
pub mod password;
pub mod refresh_token;

pub use authorization_code::AuthorizationCodeProvider;
pub use client_credentials::ClientCredentialsProvider;
pub use password::PasswordProvider;
pub use refresh_token::RefreshTokenProvider;

/// Default tolerance subtracted from token expiry
pub const DEFAULT_CLOCK_SKEW_SECS: u32 = 60;

/// Every grant type, for providers that are not tied to one
pub const ALL_GRANT_TYPES: &[AuthorizationGrantType] = &[
    AuthorizationGrantType::AuthorizationCode,
    AuthorizationGrantType::RefreshToken,
    AuthorizationGrantType::ClientCredentials,
    AuthorizationGrantType::Password,
];

/// A grant-type strategy
#[async_trait]
pub trait AuthorizedClientProvider: Send + Sync + Debug {
    /// Provider name, used in logs
    fn name(&self) -> &'static str;

    /// Registration grant types this provider acts on
    fn supported_grant_types(&self) -> &'static [AuthorizationGrantType];

    /// Whether the provider acts on registrations of `grant_type`
    fn supports(&self, grant_type: AuthorizationGrantType) -> bool {
        self.supported_grant_types().contains(&grant_type)
    }

    /// Authorize or re-authorize the context's client
    ///
    /// Returns `Ok(None)` when the provider does not apply or nothing needs to change.
    async fn authorize(
        &self,
        context: &AuthorizationContext,
    ) -> AuthResult<Option<AuthorizedClient>>;
}

/// Ordered set of providers; the first `Some` wins
///
/// The chain also owns the clock and skew its strategies judge expiry with, so a
/// manager built through
/// [`AuthorizedClientManager::with_provider_chain`](crate::AuthorizedClientManager::with_provider_chain)
/// applies the same expiry decision as the strategies.
#[derive(Debug, Clone)]
pub struct ProviderChain {
    providers: Vec<Arc<dyn AuthorizedClientProvider>>,
    clock: Arc<dyn Clock>,
    clock_skew: Duration,
}

impl ProviderChain {
    /// Chain the given providers in order
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if `providers` is empty.
    pub fn new(providers: Vec<Arc<dyn AuthorizedClientProvider>>) -> AuthResult<Self> {
        if providers.is_empty() {
            return Err(AuthError::configuration(
                "provider chain needs at least one provider",
            ));
        }
        Ok(Self {
            providers,
            clock: Arc::new(SystemClock),
            clock_skew: Duration::seconds(i64::from(DEFAULT_CLOCK_SKEW_SECS)),
        })
    }

    /// Start assembling the standard chain
    pub fn builder() -> ProviderChainBuilder {
        ProviderChainBuilder::default()
    }

    /// Provider names in evaluation order
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Clock the chain's strategies read
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Skew the chain's strategies apply
    pub fn clock_skew(&self) -> Duration {
        self.clock_skew
    }
}

#[async_trait]
impl AuthorizedClientProvider for ProviderChain {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn supported_grant_types(&self) -> &'static [AuthorizationGrantType] {
        ALL_GRANT_TYPES
    }

    async fn authorize(
        &self,
        context: &AuthorizationContext,
    ) -> AuthResult<Option<AuthorizedClient>> {
        let grant_type = context.registration().authorization_grant_type();
        for provider in &self.providers {
            if !provider.supports(grant_type) {
                trace!(provider = provider.name(), %grant_type, "provider skipped");
                continue;
            }
            if let Some(client) = provider.authorize(context).await? {
                debug!(provider = provider.name(), "provider authorized client");
                return Ok(Some(client));
            }
        }
        Ok(None)
    }
}

/// Builder for the standard [`ProviderChain`]
///
/// Strategies are always chained in the order authorization_code, refresh_token,
/// client_credentials, password regardless of the order they are enabled in.
#[derive(Debug)]
pub struct ProviderChainBuilder {
    clock: Arc<dyn Clock>,
    clock_skew: Duration,
    token_client: Option<Arc<dyn TokenResponseClient>>,
    authorization_code: bool,
    refresh_token: bool,
    client_credentials: bool,
    password: bool,
    custom: Vec<Arc<dyn AuthorizedClientProvider>>,
}

impl Default for ProviderChainBuilder {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            clock_skew: Duration::seconds(i64::from(DEFAULT_CLOCK_SKEW_SECS)),
            token_client: None,
            authorization_code: false,
            refresh_token: false,
            client_credentials: false,
            password: false,
            custom: Vec::new(),
        }
    }
}

impl ProviderChainBuilder {
    /// Clock used for expiry checks
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Tolerated lead of the issuing clock, see [`AccessToken::is_expired`](crate::AccessToken::is_expired)
    #[must_use]
    pub fn clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew;
        self
    }

    /// Token client shared by all exchanging strategies
    #[must_use]
    pub fn token_client(mut self, token_client: Arc<dyn TokenResponseClient>) -> Self {
        self.token_client = Some(token_client);
        self
    }

    /// Enable the authorization_code strategy
    #[must_use]
    pub fn authorization_code(mut self) -> Self {
        self.authorization_code = true;
        self
    }

    /// Enable the refresh_token strategy
    #[must_use]
    pub fn refresh_token(mut self) -> Self {
        self.refresh_token = true;
        self
    }

    /// Enable the client_credentials strategy
    #[must_use]
    pub fn client_credentials(mut self) -> Self {
        self.client_credentials = true;
        self
    }

    /// Enable the password strategy
    #[must_use]
    pub fn password(mut self) -> Self {
        self.password = true;
        self
    }

    /// Enable all four standard strategies
    #[must_use]
    pub fn all_grants(self) -> Self {
        self.authorization_code()
            .refresh_token()
            .client_credentials()
            .password()
    }

    /// Append a custom provider after the standard ones
    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn AuthorizedClientProvider>) -> Self {
        self.custom.push(provider);
        self
    }

    /// Assemble the chain
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if an exchanging strategy is enabled without a
    /// token client, or if no provider is enabled at all.
    pub fn build(self) -> AuthResult<ProviderChain> {
        let exchanging = self.refresh_token || self.client_credentials || self.password;
        let token_client = match (&self.token_client, exchanging) {
            (Some(client), _) => Some(Arc::clone(client)),
            (None, true) => {
                return Err(AuthError::configuration(
                    "a token client is required for refresh_token, client_credentials and password",
                ));
            }
            (None, false) => None,
        };

        let mut providers: Vec<Arc<dyn AuthorizedClientProvider>> = Vec::new();
        if self.authorization_code {
            providers.push(Arc::new(AuthorizationCodeProvider::new()));
        }
        if let Some(token_client) = token_client {
            if self.refresh_token {
                providers.push(Arc::new(RefreshTokenProvider::new(
                    Arc::clone(&token_client),
                    Arc::clone(&self.clock),
                    self.clock_skew,
                )));
            }
            if self.client_credentials {
                providers.push(Arc::new(ClientCredentialsProvider::new(
                    Arc::clone(&token_client),
                    Arc::clone(&self.clock),
                    self.clock_skew,
                )));
            }
            if self.password {
                providers.push(Arc::new(PasswordProvider::new(
                    token_client,
                    Arc::clone(&self.clock),
                    self.clock_skew,
                )));
            }
        }
        providers.extend(self.custom);

        let mut chain = ProviderChain::new(providers)?;
        chain.clock = self.clock;
        chain.clock_skew = self.clock_skew;
        Ok(chain)
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::registration::ClientRegistration;
    use crate::types::{AccessToken, Principal};

    #[derive(Debug)]
    struct Fixed {
        name: &'static str,
        grants: &'static [AuthorizationGrantType],
        token: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(
            name: &'static str,
            grants: &'static [AuthorizationGrantType],
            token: Option<&'static str>,
        ) -> Self {
            Self {
                name,
                grants,
                token,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AuthorizedClientProvider for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        fn supported_grant_types(&self) -> &'static [AuthorizationGrantType] {
            self.grants
        }

        async fn authorize(
            &self,
            context: &AuthorizationContext,
        ) -> AuthResult<Option<AuthorizedClient>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.token.map(|t| {
                AuthorizedClient::new(
                    Arc::clone(context.registration()),
                    context.principal().name(),
                    AccessToken::bearer(t, None, None, vec![]),
                    None,
                )
            }))
        }
    }

    fn context() -> AuthorizationContext {
        let registration = ClientRegistration::with_registration_id("svc")
            .client_id("client")
            .authorization_grant_type(AuthorizationGrantType::ClientCredentials)
            .token_uri("https://auth.example.com/token")
            .build()
            .unwrap();
        AuthorizationContext::for_registration(Arc::new(registration), Principal::new("alice"))
    }

    #[tokio::test]
    async fn test_first_some_wins_and_unsupported_skipped() {
        let skipped = Arc::new(Fixed::new(
            "password-only",
            &[AuthorizationGrantType::Password],
            Some("never"),
        ));
        let empty = Arc::new(Fixed::new("empty", ALL_GRANT_TYPES, None));
        let winner = Arc::new(Fixed::new("winner", ALL_GRANT_TYPES, Some("t1")));
        let after = Arc::new(Fixed::new("after", ALL_GRANT_TYPES, Some("t2")));

        let chain = ProviderChain::new(vec![
            skipped.clone(),
            empty.clone(),
            winner.clone(),
            after.clone(),
        ])
        .unwrap();

        let client = chain.authorize(&context()).await.unwrap().unwrap();
        assert_eq!(client.access_token().token_value, "t1");
        assert_eq!(skipped.calls.load(Ordering::SeqCst), 0);
        assert_eq!(empty.calls.load(Ordering::SeqCst), 1);
        assert_eq!(after.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_chain_returns_none_when_nothing_applies() {
        let chain =
            ProviderChain::new(vec![Arc::new(Fixed::new("empty", ALL_GRANT_TYPES, None))])
                .unwrap();
        assert!(chain.authorize(&context()).await.unwrap().is_none());
    }

    #[test]
    fn test_builder_requires_token_client() {
        let err = ProviderChain::builder().refresh_token().build().unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));

        let err = ProviderChain::builder().build().unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));

        let chain = ProviderChain::builder().authorization_code().build().unwrap();
        assert_eq!(chain.provider_names(), vec!["authorization_code"]);
    }

    #[test]
    fn test_builder_hands_clock_and_skew_to_chain() {
        let now = chrono::Utc::now();
        let chain = ProviderChain::builder()
            .clock(Arc::new(crate::clock::FixedClock::new(now)))
            .clock_skew(Duration::seconds(15))
            .authorization_code()
            .build()
            .unwrap();

        assert_eq!(chain.clock().now(), now);
        assert_eq!(chain.clock_skew(), Duration::seconds(15));
    }
}
