//! client_credentials strategy

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use tracing::{debug, instrument};

use super::AuthorizedClientProvider;
use crate::clock::Clock;
use crate::context::AuthorizationContext;
use crate::error::AuthResult;
use crate::oauth2::{GrantRequest, TokenResponseClient};
use crate::registration::AuthorizationGrantType;
use crate::types::AuthorizedClient;

/// Obtains a token with the client's own credentials
///
/// Refresh tokens are not expected for this grant; an expired token is simply replaced
/// by a fresh exchange.
#[derive(Debug, Clone)]
pub struct ClientCredentialsProvider {
    token_client: Arc<dyn TokenResponseClient>,
    clock: Arc<dyn Clock>,
    clock_skew: Duration,
}

impl ClientCredentialsProvider {
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

#[async_trait]
impl AuthorizedClientProvider for ClientCredentialsProvider {
    fn name(&self) -> &'static str {
        "client_credentials"
    }

    fn supported_grant_types(&self) -> &'static [AuthorizationGrantType] {
        &[AuthorizationGrantType::ClientCredentials]
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
        if let Some(client) = context.authorized_client()
            && !client.is_access_token_expired(self.clock.now(), self.clock_skew)
        {
            return Ok(None);
        }

        debug!("requesting client credentials token");
        let scopes = context
            .request_scope()
            .unwrap_or_else(|| registration.scopes().to_vec());
        let response = self
            .token_client
            .get_token_response(GrantRequest::ClientCredentials {
                registration: Arc::clone(registration),
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
