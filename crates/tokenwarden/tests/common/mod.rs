//! Common test utilities for integration tests
//!
//! A wiremock token endpoint plus recording doubles for the store and the token client.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tokenwarden::{
    AccessToken, AuthError, AuthResult, AuthorizationGrantType, AuthorizedClient,
    AuthorizedClientStore, ClientRegistration, Clock, FixedClock, GrantRequest,
    InMemoryAuthorizedClientStore, InMemoryClientRegistry, Principal, RefreshToken,
    TokenResponse, TokenResponseClient, TransportContext,
};

/// OAuth2 mock token endpoint
pub struct MockOAuth2Server {
    pub server: MockServer,
    pub token_endpoint: String,
}

impl MockOAuth2Server {
    /// Start a mock authorization server
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let token_endpoint = format!("{}/token", server.uri());
        Self {
            server,
            token_endpoint,
        }
    }

    /// Successful token response for any grant
    pub async fn mock_token_success(&self, access_token: &str, refresh_token: Option<&str>) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body(
                access_token,
                refresh_token,
            )))
            .mount(&self.server)
            .await;
    }

    /// Successful token response for one grant type, expected exactly `times` times
    pub async fn mock_grant(
        &self,
        grant_type: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        times: u64,
    ) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains(format!("grant_type={grant_type}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body(
                access_token,
                refresh_token,
            )))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Token endpoint error response
    pub async fn mock_token_error(&self, error: &str, description: &str) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": error,
                "error_description": description,
            })))
            .mount(&self.server)
            .await;
    }

    /// Number of requests the server has seen
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map_or(0, |requests| requests.len())
    }

    /// Bodies of all requests received, as strings
    pub async fn request_bodies(&self) -> Vec<String> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|r| String::from_utf8_lossy(&r.body).into_owned())
            .collect()
    }
}

fn token_body(access_token: &str, refresh_token: Option<&str>) -> serde_json::Value {
    let mut body = json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": 3600,
        "scope": "read write",
    });
    if let Some(refresh) = refresh_token {
        body["refresh_token"] = json!(refresh);
    }
    body
}

/// Registration pointing at `token_uri`
pub fn registration(
    id: &str,
    grant_type: AuthorizationGrantType,
    token_uri: &str,
) -> ClientRegistration {
    ClientRegistration::with_registration_id(id)
        .client_id("client")
        .client_secret("secret")
        .authorization_grant_type(grant_type)
        .token_uri(token_uri)
        .authorization_uri("https://auth.example.com/authorize")
        .redirect_uri("https://app.example.com/callback")
        .scopes(["read"])
        .build()
        .unwrap()
}

/// Registry holding the usual test registrations
///
/// - `github`: authorization_code
/// - `reports`: client_credentials
/// - `legacy`: password
pub fn registry(token_uri: &str) -> Arc<InMemoryClientRegistry> {
    Arc::new(
        InMemoryClientRegistry::new([
            registration("github", AuthorizationGrantType::AuthorizationCode, token_uri),
            registration("reports", AuthorizationGrantType::ClientCredentials, token_uri),
            registration("legacy", AuthorizationGrantType::Password, token_uri),
        ])
        .unwrap(),
    )
}

/// Authorized client with the given expiry
pub fn authorized_client(
    registry: &InMemoryClientRegistry,
    registration_id: &str,
    principal: &str,
    token: &str,
    expires_at: Option<DateTime<Utc>>,
    refresh_token: Option<&str>,
) -> AuthorizedClient {
    use tokenwarden::ClientRegistry;

    AuthorizedClient::new(
        registry.find_by_registration_id(registration_id).unwrap(),
        principal,
        AccessToken::bearer(token, None, expires_at, vec!["read".to_string()]),
        refresh_token.map(|r| RefreshToken::new(r, None)),
    )
}

/// Store that counts loads and saves
#[derive(Debug, Default)]
pub struct RecordingStore {
    inner: InMemoryAuthorizedClientStore,
    loads: AtomicUsize,
    saves: AtomicUsize,
    requires_transport: bool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that refuses calls without a transport context
    pub fn requiring_transport() -> Self {
        Self {
            requires_transport: true,
            ..Self::default()
        }
    }

    /// Put a client in the store without counting the write
    pub async fn seed(&self, client: &AuthorizedClient) {
        let principal = Principal::new(client.principal_name());
        self.inner.save(client, &principal, None).await.unwrap();
    }

    /// Read a client without counting the load
    pub async fn peek(&self, registration_id: &str, principal: &str) -> Option<AuthorizedClient> {
        self.inner
            .load(registration_id, &Principal::new(principal), None)
            .await
            .unwrap()
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthorizedClientStore for RecordingStore {
    async fn load(
        &self,
        registration_id: &str,
        principal: &Principal,
        transport: Option<&TransportContext>,
    ) -> AuthResult<Option<AuthorizedClient>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(registration_id, principal, transport).await
    }

    async fn save(
        &self,
        client: &AuthorizedClient,
        principal: &Principal,
        transport: Option<&TransportContext>,
    ) -> AuthResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(client, principal, transport).await
    }

    async fn remove(
        &self,
        registration_id: &str,
        principal: &Principal,
        transport: Option<&TransportContext>,
    ) -> AuthResult<()> {
        self.inner.remove(registration_id, principal, transport).await
    }

    fn requires_transport(&self) -> bool {
        self.requires_transport
    }
}

/// Token client issuing `token-1`, `token-2`, ... valid for `lifetime` from the clock
#[derive(Debug)]
pub struct ScriptedTokenClient {
    clock: FixedClock,
    lifetime: Duration,
    rotate_refresh_token: bool,
    fail_with: Option<String>,
    issued: AtomicUsize,
    requests: Mutex<Vec<GrantRequest>>,
}

impl ScriptedTokenClient {
    pub fn new(clock: FixedClock) -> Self {
        Self {
            clock,
            lifetime: Duration::hours(1),
            rotate_refresh_token: false,
            fail_with: None,
            issued: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Issue a new refresh token with every response
    pub fn rotating(mut self) -> Self {
        self.rotate_refresh_token = true;
        self
    }

    /// Fail every exchange with `message`
    pub fn failing(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn grant_types(&self) -> Vec<AuthorizationGrantType> {
        self.requests.lock().iter().map(GrantRequest::grant_type).collect()
    }
}

#[async_trait]
impl TokenResponseClient for ScriptedTokenClient {
    async fn get_token_response(&self, request: GrantRequest) -> AuthResult<TokenResponse> {
        let registration_id = request.registration().registration_id().to_string();
        let scopes = request.scopes().to_vec();
        self.requests.lock().push(request);
        tokio::task::yield_now().await;

        if let Some(message) = &self.fail_with {
            return Err(AuthError::token_exchange(registration_id, message.clone()));
        }

        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.clock.now();
        let mut response = TokenResponse::new(AccessToken::bearer(
            format!("token-{n}"),
            Some(now),
            Some(now + self.lifetime),
            scopes,
        ));
        if self.rotate_refresh_token {
            response = response.with_refresh_token(RefreshToken::new(format!("refresh-{n}"), Some(now)));
        }
        Ok(response)
    }
}
