//! password strategy

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use secrecy::SecretString;
use tracing::{debug, instrument};

use super::AuthorizedClientProvider;
use crate::clock::Clock;
use crate::context::{AuthorizationContext, PASSWORD_ATTRIBUTE_NAME, USERNAME_ATTRIBUTE_NAME};
use crate::error::{AuthError, AuthResult};
use crate::oauth2::{GrantRequest, TokenResponseClient};
use crate::registration::AuthorizationGrantType;
use crate::types::AuthorizedClient;

/// Exchanges resource owner credentials carried in the context attributes
#[derive(Debug, Clone)]
pub struct PasswordProvider {
    token_client: Arc<dyn TokenResponseClient>,
    clock: Arc<dyn Clock>,
    clock_skew: Duration,
}

impl PasswordProvider {
    /// Create the provider
    pub fn new(
        token_client: Arc<dyn TokenResponseClient>,
        clock: Arc<dyn Clock>,
        clock_skew: Duration,
    ) -> Self {
        Self {
            token_client,
            clock,
            clock_skew,
        }
    }
}

fn required<'a>(value: Option<&'a str>, name: &str, registration_id: &str) -> AuthResult<&'a str> {
    value.filter(|v| !v.is_empty()).ok_or_else(|| {
        AuthError::credentials_missing(format!(
            "'{name}' attribute is required for password grant of '{registration_id}'"
        ))
    })
}

#[async_trait]
impl AuthorizedClientProvider for PasswordProvider {
    fn name(&self) -> &'static str {
        "password"
    }

    fn supported_grant_types(&self) -> &'static [AuthorizationGrantType] {
        &[AuthorizationGrantType::Password]
    }

    #[instrument(
        skip_all,
        fields(
            registration_id = context.registration().registration_id(),
            principal = context.principal().name(),
        )
    )]
    async fn authorize(
        &self,
        context: &AuthorizationContext,
    ) -> AuthResult<Option<AuthorizedClient>> {
        let registration = context.registration();
        if !self.supports(registration.authorization_grant_type()) {
            return Ok(None);
        }
        if let Some(client) = context.authorized_client() {
            if !client.is_access_token_expired(self.clock.now(), self.clock_skew) {
                return Ok(None);
            }
            if client.refresh_token().is_some() {
                // renewed by the refresh_token strategy
                return Ok(None);
            }
        }

        let registration_id = registration.registration_id();
        let username = required(context.username(), USERNAME_ATTRIBUTE_NAME, registration_id)?;
        let password = required(context.password(), PASSWORD_ATTRIBUTE_NAME, registration_id)?;

        debug!("requesting password grant token");
        let scopes = context
            .request_scope()
            .unwrap_or_else(|| registration.scopes().to_vec());
        let response = self
            .token_client
            .get_token_response(GrantRequest::Password {
                registration: Arc::clone(registration),
                username: username.to_string(),
                password: SecretString::new(password.to_string()),
                scopes,
            })
            .await?;

        Ok(Some(AuthorizedClient::new(
            Arc::clone(registration),
            context.principal().name(),
            response.access_token,
            response.refresh_token,
        )))
    }
}
