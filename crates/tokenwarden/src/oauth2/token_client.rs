//! Token endpoint exchanges

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use oauth2::TokenResponse as _;
use oauth2::basic::{BasicClient, BasicErrorResponse, BasicTokenResponse};
use oauth2::{
    AuthType, ClientId, ClientSecret, RequestTokenError, ResourceOwnerPassword,
    ResourceOwnerUsername, Scope, TokenUrl,
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::http_client::{HttpAdapterError, OAuth2HttpClient};
use crate::clock::{Clock, SystemClock};
use crate::error::{AuthError, AuthResult};
use crate::registration::{AuthorizationGrantType, ClientAuthenticationMethod, ClientRegistration};
use crate::types::{AccessToken, RefreshToken};

/// One grant exchange against a registration's token endpoint
#[derive(Debug, Clone)]
pub enum GrantRequest {
    /// Exchange a refresh token for a new access token
    RefreshToken {
        /// Registration to exchange for
        registration: Arc<ClientRegistration>,
        /// The access token being replaced
        access_token: AccessToken,
        /// The refresh token to present
        refresh_token: RefreshToken,
        /// Scopes to request
        scopes: Vec<String>,
    },
    /// Client credentials grant
    ClientCredentials {
        /// Registration to exchange for
        registration: Arc<ClientRegistration>,
        /// Scopes to request
        scopes: Vec<String>,
    },
    /// Resource owner password credentials grant
    Password {
        /// Registration to exchange for
        registration: Arc<ClientRegistration>,
        /// Resource owner username
        username: String,
        /// Resource owner password
        password: SecretString,
        /// Scopes to request
        scopes: Vec<String>,
    },
}

impl GrantRequest {
    /// Registration the exchange targets
    pub fn registration(&self) -> &Arc<ClientRegistration> {
        match self {
            Self::RefreshToken { registration, .. }
            | Self::ClientCredentials { registration, .. }
            | Self::Password { registration, .. } => registration,
        }
    }

    /// Grant type sent to the token endpoint
    pub fn grant_type(&self) -> AuthorizationGrantType {
        match self {
            Self::RefreshToken { .. } => AuthorizationGrantType::RefreshToken,
            Self::ClientCredentials { .. } => AuthorizationGrantType::ClientCredentials,
            Self::Password { .. } => AuthorizationGrantType::Password,
        }
    }

    /// Requested scopes
    pub fn scopes(&self) -> &[String] {
        match self {
            Self::RefreshToken { scopes, .. }
            | Self::ClientCredentials { scopes, .. }
            | Self::Password { scopes, .. } => scopes,
        }
    }
}

/// Result of a successful exchange
#[derive(Debug, Clone, PartialEq)]
pub struct TokenResponse {
    /// Issued access token
    pub access_token: AccessToken,
    /// Issued (possibly rotated) refresh token
    pub refresh_token: Option<RefreshToken>,
    /// Response members not mapped to a token field
    pub additional_parameters: HashMap<String, Value>,
}

impl TokenResponse {
    /// Response with just an access token
    pub fn new(access_token: AccessToken) -> Self {
        Self {
            access_token,
            refresh_token: None,
            additional_parameters: HashMap::new(),
        }
    }

    /// Attach a refresh token
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: RefreshToken) -> Self {
        self.refresh_token = Some(refresh_token);
        self
    }
}

/// Performs grant exchanges
#[async_trait]
pub trait TokenResponseClient: Send + Sync + Debug {
    /// Exchange `request` at the registration's token endpoint
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenExchange`] when the endpoint rejects the grant or cannot
    /// be reached.
    async fn get_token_response(&self, request: GrantRequest) -> AuthResult<TokenResponse>;
}

const STANDARD_RESPONSE_FIELDS: [&str; 5] = [
    "access_token",
    "token_type",
    "expires_in",
    "refresh_token",
    "scope",
];

/// [`TokenResponseClient`] backed by the oauth2 crate
#[derive(Debug, Clone)]
pub struct OAuth2TokenResponseClient {
    http_client: OAuth2HttpClient,
    clock: Arc<dyn Clock>,
}

impl OAuth2TokenResponseClient {
    /// Create a client with a redirect-free HTTP adapter and the system clock
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the HTTP client cannot be built.
    pub fn new() -> AuthResult<Self> {
        let http_client = OAuth2HttpClient::new()
            .map_err(|e| AuthError::configuration(format!("HTTP client: {e}")))?;
        Ok(Self::with_http_client(http_client))
    }

    /// Create a client around an existing adapter
    pub fn with_http_client(http_client: OAuth2HttpClient) -> Self {
        Self {
            http_client,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `clock` to turn `expires_in` into an absolute expiry
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn convert(&self, request: &GrantRequest, response: &BasicTokenResponse) -> TokenResponse {
        let issued_at = self.clock.now();
        let expires_at = response
            .expires_in()
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .map(|d| issued_at + d);

        let scopes = response.scopes().map_or_else(
            || request.scopes().to_vec(),
            |granted| granted.iter().map(|s| s.as_str().to_string()).collect(),
        );

        let additional_parameters = match serde_json::to_value(response) {
            Ok(Value::Object(map)) => map
                .into_iter()
                .filter(|(k, _)| !STANDARD_RESPONSE_FIELDS.contains(&k.as_str()))
                .collect(),
            _ => HashMap::new(),
        };

        TokenResponse {
            access_token: AccessToken::bearer(
                response.access_token().secret().clone(),
                Some(issued_at),
                expires_at,
                scopes,
            ),
            refresh_token: response
                .refresh_token()
                .map(|rt| RefreshToken::new(rt.secret().clone(), Some(issued_at))),
            additional_parameters,
        }
    }
}

fn describe(error: &RequestTokenError<HttpAdapterError, BasicErrorResponse>) -> String {
    match error {
        RequestTokenError::ServerResponse(response) => response.to_string(),
        RequestTokenError::Request(e) => e.to_string(),
        RequestTokenError::Parse(e, _) => format!("malformed token response: {e}"),
        RequestTokenError::Other(message) => message.clone(),
    }
}

#[async_trait]
impl TokenResponseClient for OAuth2TokenResponseClient {
    #[instrument(
        skip(self, request),
        fields(
            registration_id = request.registration().registration_id(),
            grant_type = %request.grant_type(),
        )
    )]
    async fn get_token_response(&self, request: GrantRequest) -> AuthResult<TokenResponse> {
        let registration = Arc::clone(request.registration());
        let registration_id = registration.registration_id();

        let token_url = TokenUrl::new(registration.token_uri().to_string())
            .map_err(|e| AuthError::configuration(format!("'{registration_id}': {e}")))?;

        let mut client = BasicClient::new(ClientId::new(registration.client_id().to_string()))
            .set_token_uri(token_url);
        match registration.client_authentication_method() {
            ClientAuthenticationMethod::ClientSecretBasic => {
                client = client.set_auth_type(AuthType::BasicAuth);
            }
            ClientAuthenticationMethod::ClientSecretPost | ClientAuthenticationMethod::None => {
                client = client.set_auth_type(AuthType::RequestBody);
            }
        }
        if registration.client_authentication_method() != ClientAuthenticationMethod::None
            && registration.has_client_secret()
        {
            client = client.set_client_secret(ClientSecret::new(
                registration.client_secret().expose_secret().clone(),
            ));
        }

        let scopes = request
            .scopes()
            .iter()
            .map(|s| Scope::new(s.clone()))
            .collect::<Vec<_>>();

        let result = match &request {
            GrantRequest::RefreshToken { refresh_token, .. } => {
                let refresh = oauth2::RefreshToken::new(refresh_token.token_value.clone());
                client
                    .exchange_refresh_token(&refresh)
                    .add_scopes(scopes)
                    .request_async(&self.http_client)
                    .await
            }
            GrantRequest::ClientCredentials { .. } => {
                client
                    .exchange_client_credentials()
                    .add_scopes(scopes)
                    .request_async(&self.http_client)
                    .await
            }
            GrantRequest::Password {
                username, password, ..
            } => {
                let username = ResourceOwnerUsername::new(username.clone());
                let password = ResourceOwnerPassword::new(password.expose_secret().clone());
                client
                    .exchange_password(&username, &password)
                    .add_scopes(scopes)
                    .request_async(&self.http_client)
                    .await
            }
        };

        match result {
            Ok(response) => {
                debug!("token endpoint issued a new access token");
                Ok(self.convert(&request, &response))
            }
            Err(e) => {
                let message = describe(&e);
                warn!(error = %message, "token exchange failed");
                Err(AuthError::token_exchange(registration_id, message))
            }
        }
    }
}
