//! Client registrations and the read-only registry that serves them

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

/// OAuth 2.0 grant types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationGrantType {
    /// Authorization Code grant (interactive redirect)
    AuthorizationCode,
    /// Refresh Token grant
    RefreshToken,
    /// Client Credentials grant (server-to-server)
    ClientCredentials,
    /// Resource Owner Password Credentials grant
    Password,
}

impl AuthorizationGrantType {
    /// Wire value of the grant type
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
            Self::ClientCredentials => "client_credentials",
            Self::Password => "password",
        }
    }
}

impl fmt::Display for AuthorizationGrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the client authenticates to the token endpoint
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthenticationMethod {
    /// HTTP Basic authentication header
    #[default]
    ClientSecretBasic,
    /// `client_id` / `client_secret` form parameters
    ClientSecretPost,
    /// Public client, `client_id` only
    None,
}

/// Immutable description of one OAuth 2.0 client
#[derive(Debug, Clone)]
pub struct ClientRegistration {
    registration_id: String,
    client_id: String,
    client_secret: SecretString,
    client_authentication_method: ClientAuthenticationMethod,
    authorization_grant_type: AuthorizationGrantType,
    scopes: Vec<String>,
    token_uri: String,
    authorization_uri: Option<String>,
    redirect_uri: Option<String>,
    client_name: String,
}

impl ClientRegistration {
    /// Start building a registration with the given id
    pub fn with_registration_id(registration_id: impl Into<String>) -> ClientRegistrationBuilder {
        ClientRegistrationBuilder::new(registration_id)
    }

    /// Registration identifier (the registry key)
    pub fn registration_id(&self) -> &str {
        &self.registration_id
    }

    /// OAuth client identifier
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Client secret; empty for public clients
    pub fn client_secret(&self) -> &SecretString {
        &self.client_secret
    }

    /// Whether a non-empty client secret is configured
    pub fn has_client_secret(&self) -> bool {
        !self.client_secret.expose_secret().is_empty()
    }

    /// Token endpoint authentication method
    pub fn client_authentication_method(&self) -> ClientAuthenticationMethod {
        self.client_authentication_method
    }

    /// Declared grant type
    pub fn authorization_grant_type(&self) -> AuthorizationGrantType {
        self.authorization_grant_type
    }

    /// Default scopes requested for this client
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Token endpoint
    pub fn token_uri(&self) -> &str {
        &self.token_uri
    }

    /// Authorization endpoint (authorization_code only)
    pub fn authorization_uri(&self) -> Option<&str> {
        self.authorization_uri.as_deref()
    }

    /// Redirect URI (authorization_code only)
    pub fn redirect_uri(&self) -> Option<&str> {
        self.redirect_uri.as_deref()
    }

    /// Display name, defaults to the registration id
    pub fn client_name(&self) -> &str {
        &self.client_name
    }
}

/// Builder for [`ClientRegistration`]
#[derive(Debug)]
pub struct ClientRegistrationBuilder {
    registration_id: String,
    client_id: Option<String>,
    client_secret: Option<SecretString>,
    client_authentication_method: ClientAuthenticationMethod,
    authorization_grant_type: Option<AuthorizationGrantType>,
    scopes: Vec<String>,
    token_uri: Option<String>,
    authorization_uri: Option<String>,
    redirect_uri: Option<String>,
    client_name: Option<String>,
}

impl ClientRegistrationBuilder {
    fn new(registration_id: impl Into<String>) -> Self {
        Self {
            registration_id: registration_id.into(),
            client_id: None,
            client_secret: None,
            client_authentication_method: ClientAuthenticationMethod::default(),
            authorization_grant_type: None,
            scopes: Vec::new(),
            token_uri: None,
            authorization_uri: None,
            redirect_uri: None,
            client_name: None,
        }
    }

    /// Set the client id
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set the client secret
    #[must_use]
    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(SecretString::new(client_secret.into()));
        self
    }

    /// Set the client secret from an existing secret
    #[must_use]
    pub fn client_secret_secret(mut self, client_secret: SecretString) -> Self {
        self.client_secret = Some(client_secret);
        self
    }

    /// Set the token endpoint authentication method
    #[must_use]
    pub fn client_authentication_method(mut self, method: ClientAuthenticationMethod) -> Self {
        self.client_authentication_method = method;
        self
    }

    /// Set the grant type
    #[must_use]
    pub fn authorization_grant_type(mut self, grant_type: AuthorizationGrantType) -> Self {
        self.authorization_grant_type = Some(grant_type);
        self
    }

    /// Set the default scopes
    #[must_use]
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the token endpoint
    #[must_use]
    pub fn token_uri(mut self, token_uri: impl Into<String>) -> Self {
        self.token_uri = Some(token_uri.into());
        self
    }

    /// Set the authorization endpoint
    #[must_use]
    pub fn authorization_uri(mut self, authorization_uri: impl Into<String>) -> Self {
        self.authorization_uri = Some(authorization_uri.into());
        self
    }

    /// Set the redirect URI
    #[must_use]
    pub fn redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    /// Set the display name
    #[must_use]
    pub fn client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = Some(client_name.into());
        self
    }

    /// Validate and build the registration
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] when the registration id, client id, grant
    /// type or token URI is missing or the token URI is not a valid URL, and, for
    /// authorization_code registrations, when the redirect or authorization URI is missing.
    pub fn build(self) -> AuthResult<ClientRegistration> {
        if self.registration_id.trim().is_empty() {
            return Err(AuthError::configuration("registration_id cannot be empty"));
        }
        let id = &self.registration_id;

        let client_id = self
            .client_id
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::configuration(format!("'{id}': client_id is required")))?;

        let grant_type = self.authorization_grant_type.ok_or_else(|| {
            AuthError::configuration(format!("'{id}': authorization_grant_type is required"))
        })?;

        let token_uri = self
            .token_uri
            .filter(|u| !u.is_empty())
            .ok_or_else(|| AuthError::configuration(format!("'{id}': token_uri is required")))?;
        url::Url::parse(&token_uri).map_err(|e| {
            AuthError::configuration(format!("'{id}': invalid token_uri '{token_uri}': {e}"))
        })?;

        if grant_type == AuthorizationGrantType::AuthorizationCode {
            if self.redirect_uri.as_deref().is_none_or(str::is_empty) {
                return Err(AuthError::configuration(format!(
                    "'{id}': redirect_uri is required for authorization_code"
                )));
            }
            if self.authorization_uri.as_deref().is_none_or(str::is_empty) {
                return Err(AuthError::configuration(format!(
                    "'{id}': authorization_uri is required for authorization_code"
                )));
            }
        }

        let client_name = self
            .client_name
            .unwrap_or_else(|| self.registration_id.clone());

        Ok(ClientRegistration {
            registration_id: self.registration_id,
            client_id,
            client_secret: self
                .client_secret
                .unwrap_or_else(|| SecretString::new(String::new())),
            client_authentication_method: self.client_authentication_method,
            authorization_grant_type: grant_type,
            scopes: self.scopes,
            token_uri,
            authorization_uri: self.authorization_uri,
            redirect_uri: self.redirect_uri,
            client_name,
        })
    }
}

/// Read-only lookup of registrations by id
pub trait ClientRegistry: Send + Sync + fmt::Debug {
    /// Find a registration, `None` when the id is unknown
    fn find_by_registration_id(&self, registration_id: &str) -> Option<Arc<ClientRegistration>>;
}

/// Registry backed by an immutable map
#[derive(Debug, Clone)]
pub struct InMemoryClientRegistry {
    registrations: Arc<HashMap<String, Arc<ClientRegistration>>>,
}

impl InMemoryClientRegistry {
    /// Build a registry from a set of registrations
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if no registrations are given or two share
    /// the same registration id.
    pub fn new(registrations: impl IntoIterator<Item = ClientRegistration>) -> AuthResult<Self> {
        let mut map = HashMap::new();
        for registration in registrations {
            let id = registration.registration_id().to_string();
            if map.insert(id.clone(), Arc::new(registration)).is_some() {
                return Err(AuthError::configuration(format!(
                    "duplicate client registration id '{id}'"
                )));
            }
        }
        if map.is_empty() {
            return Err(AuthError::configuration(
                "at least one client registration is required",
            ));
        }
        Ok(Self {
            registrations: Arc::new(map),
        })
    }

    /// Registered ids
    pub fn registration_ids(&self) -> impl Iterator<Item = &str> {
        self.registrations.keys().map(String::as_str)
    }

    /// Number of registrations
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Always false; an empty registry cannot be constructed
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

impl ClientRegistry for InMemoryClientRegistry {
    fn find_by_registration_id(&self, registration_id: &str) -> Option<Arc<ClientRegistration>> {
        self.registrations.get(registration_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_credentials(id: &str) -> ClientRegistration {
        ClientRegistration::with_registration_id(id)
            .client_id("client")
            .client_secret("secret")
            .authorization_grant_type(AuthorizationGrantType::ClientCredentials)
            .token_uri("https://auth.example.com/token")
            .scopes(["read", "write"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_defaults() {
        let reg = client_credentials("svc");
        assert_eq!(reg.registration_id(), "svc");
        assert_eq!(reg.client_name(), "svc");
        assert_eq!(
            reg.client_authentication_method(),
            ClientAuthenticationMethod::ClientSecretBasic
        );
        assert!(reg.has_client_secret());
        assert_eq!(reg.scopes(), &["read".to_string(), "write".to_string()]);
    }

    #[test]
    fn test_secret_not_in_debug_output() {
        let reg = client_credentials("svc");
        assert!(!format!("{reg:?}").contains("secret\""));
    }

    #[test]
    fn test_build_requires_token_uri() {
        let err = ClientRegistration::with_registration_id("svc")
            .client_id("client")
            .authorization_grant_type(AuthorizationGrantType::ClientCredentials)
            .build()
            .unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[test]
    fn test_build_rejects_invalid_token_uri() {
        let err = ClientRegistration::with_registration_id("svc")
            .client_id("client")
            .authorization_grant_type(AuthorizationGrantType::ClientCredentials)
            .token_uri("not a url")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("invalid token_uri"));
    }

    #[test]
    fn test_authorization_code_requires_redirect() {
        let err = ClientRegistration::with_registration_id("github")
            .client_id("client")
            .authorization_grant_type(AuthorizationGrantType::AuthorizationCode)
            .token_uri("https://github.com/login/oauth/access_token")
            .authorization_uri("https://github.com/login/oauth/authorize")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("redirect_uri"));
    }

    #[test]
    fn test_registry_lookup() {
        let registry =
            InMemoryClientRegistry::new([client_credentials("a"), client_credentials("b")])
                .unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.find_by_registration_id("a").is_some());
        assert!(registry.find_by_registration_id("missing").is_none());
    }

    #[test]
    fn test_registry_rejects_duplicates_and_empty() {
        let err = InMemoryClientRegistry::new([client_credentials("a"), client_credentials("a")])
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));

        let err = InMemoryClientRegistry::new(Vec::new()).unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[test]
    fn test_grant_type_serde() {
        let json = serde_json::to_string(&AuthorizationGrantType::ClientCredentials).unwrap();
        assert_eq!(json, "\"client_credentials\"");
        let parsed: AuthorizationGrantType = serde_json::from_str("\"refresh_token\"").unwrap();
        assert_eq!(parsed, AuthorizationGrantType::RefreshToken);
    }
}
