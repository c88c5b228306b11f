//! Core token and client types

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::registration::ClientRegistration;

/// Name given to the principal used when no authentication is bound to a call
pub const ANONYMOUS_PRINCIPAL_NAME: &str = "anonymousUser";

/// OAuth 2.0 access token with its lifetime metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// The token value sent as the bearer credential
    pub token_value: String,
    /// Token type, `Bearer` for every token issued through this crate
    pub token_type: String,
    /// When the token was issued
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
    /// When the token stops being valid; `None` means no recorded expiry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Granted scopes
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl AccessToken {
    /// Create a bearer access token
    pub fn bearer(
        token_value: impl Into<String>,
        issued_at: Option<DateTime<Utc>>,
        expires_at: Option<DateTime<Utc>>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            token_value: token_value.into(),
            token_type: "Bearer".to_string(),
            issued_at,
            expires_at,
            scopes,
        }
    }

    /// Whether the token must be treated as expired at `now`
    ///
    /// A token is expired from its recorded expiry onward. `clock_skew` is how far the
    /// issuing clock may run ahead of `now`: a token stamped as issued later than
    /// `now + clock_skew` came from a clock that cannot be trusted and is treated as
    /// expired as well.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, clock_skew: Duration) -> bool {
        let past_expiry = self.expires_at.is_some_and(|expires_at| now >= expires_at);
        let issued_ahead = self
            .issued_at
            .is_some_and(|issued_at| issued_at > now + clock_skew);
        past_expiry || issued_ahead
    }
}

/// OAuth 2.0 refresh token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    /// The token value
    pub token_value: String,
    /// When the token was issued
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
}

impl RefreshToken {
    /// Create a refresh token
    pub fn new(token_value: impl Into<String>, issued_at: Option<DateTime<Utc>>) -> Self {
        Self {
            token_value: token_value.into(),
            issued_at,
        }
    }
}

/// A principal's granted tokens for one client registration
///
/// Replaced, never mutated, when re-authorized. Identity is
/// `(registration_id, principal_name)`.
#[derive(Debug, Clone)]
pub struct AuthorizedClient {
    registration: Arc<ClientRegistration>,
    principal_name: String,
    access_token: AccessToken,
    refresh_token: Option<RefreshToken>,
}

impl AuthorizedClient {
    /// Create an authorized client
    pub fn new(
        registration: Arc<ClientRegistration>,
        principal_name: impl Into<String>,
        access_token: AccessToken,
        refresh_token: Option<RefreshToken>,
    ) -> Self {
        Self {
            registration,
            principal_name: principal_name.into(),
            access_token,
            refresh_token,
        }
    }

    /// The registration the tokens were granted for
    pub fn registration(&self) -> &Arc<ClientRegistration> {
        &self.registration
    }

    /// Shortcut for `registration().registration_id()`
    pub fn registration_id(&self) -> &str {
        self.registration.registration_id()
    }

    /// Name of the principal that owns the tokens
    pub fn principal_name(&self) -> &str {
        &self.principal_name
    }

    /// Current access token
    pub fn access_token(&self) -> &AccessToken {
        &self.access_token
    }

    /// Refresh token, if one was issued
    pub fn refresh_token(&self) -> Option<&RefreshToken> {
        self.refresh_token.as_ref()
    }

    /// Whether the access token is expired at `now` under `clock_skew`
    #[must_use]
    pub fn is_access_token_expired(&self, now: DateTime<Utc>, clock_skew: Duration) -> bool {
        self.access_token.is_expired(now, clock_skew)
    }
}

impl PartialEq for AuthorizedClient {
    fn eq(&self, other: &Self) -> bool {
        self.registration_id() == other.registration_id()
            && self.principal_name == other.principal_name
            && self.access_token == other.access_token
            && self.refresh_token == other.refresh_token
    }
}

impl Eq for AuthorizedClient {}

/// The authenticated (or anonymous) identity a call is made for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    name: String,
    authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    authorized_client_registration_id: Option<String>,
}

impl Principal {
    /// An authenticated principal
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            authenticated: true,
            authorized_client_registration_id: None,
        }
    }

    /// A principal that logged in through an OAuth 2.0 client registration
    pub fn oauth2(name: impl Into<String>, registration_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            authenticated: true,
            authorized_client_registration_id: Some(registration_id.into()),
        }
    }

    /// The anonymous principal
    pub fn anonymous() -> Self {
        Self {
            name: ANONYMOUS_PRINCIPAL_NAME.to_string(),
            authenticated: false,
            authorized_client_registration_id: None,
        }
    }

    /// Principal name, the store key component
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this principal is authenticated
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Whether this is the anonymous principal
    pub fn is_anonymous(&self) -> bool {
        !self.authenticated
    }

    /// Registration the principal logged in with, if any
    pub fn authorized_client_registration_id(&self) -> Option<&str> {
        self.authorized_client_registration_id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::AuthorizationGrantType;

    fn registration() -> Arc<ClientRegistration> {
        Arc::new(
            ClientRegistration::with_registration_id("svc")
                .client_id("client")
                .authorization_grant_type(AuthorizationGrantType::ClientCredentials)
                .token_uri("https://auth.example.com/token")
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_expiry_is_the_recorded_instant() {
        let now = Utc::now();
        let skew = Duration::seconds(60);
        let token = AccessToken::bearer("t", Some(now), Some(now + Duration::seconds(120)), vec![]);

        assert!(!token.is_expired(now, skew));
        assert!(!token.is_expired(now + Duration::seconds(90), skew));
        assert!(token.is_expired(now + Duration::seconds(120), skew));
        assert!(token.is_expired(now + Duration::seconds(121), Duration::zero()));
    }

    #[test]
    fn test_issue_time_beyond_skew_counts_as_expired() {
        let now = Utc::now();
        let expires_at = Some(now + Duration::hours(1));
        let skew = Duration::seconds(60);

        let slightly_ahead = AccessToken::bearer("t", Some(now + Duration::seconds(30)), expires_at, vec![]);
        assert!(!slightly_ahead.is_expired(now, skew));

        let far_ahead = AccessToken::bearer("t", Some(now + Duration::seconds(61)), expires_at, vec![]);
        assert!(far_ahead.is_expired(now, skew));
        assert!(!far_ahead.is_expired(now, Duration::seconds(120)));
    }

    #[test]
    fn test_token_without_expiry_never_expires() {
        let token = AccessToken::bearer("t", None, None, vec![]);
        assert!(!token.is_expired(Utc::now() + Duration::days(3650), Duration::seconds(60)));
    }

    #[test]
    fn test_authorized_client_equality_by_content() {
        let token = AccessToken::bearer("t", None, None, vec![]);
        let a = AuthorizedClient::new(registration(), "alice", token.clone(), None);
        let b = AuthorizedClient::new(registration(), "alice", token.clone(), None);
        let c = AuthorizedClient::new(registration(), "bob", token, None);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_principal_kinds() {
        assert!(Principal::anonymous().is_anonymous());
        assert_eq!(Principal::anonymous().name(), ANONYMOUS_PRINCIPAL_NAME);
        let p = Principal::oauth2("alice", "github");
        assert!(p.is_authenticated());
        assert_eq!(p.authorized_client_registration_id(), Some("github"));
    }
}
