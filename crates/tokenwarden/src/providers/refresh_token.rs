//! refresh_token strategy

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use tracing::{debug, instrument};

use super::{ALL_GRANT_TYPES, AuthorizedClientProvider};
use crate::clock::Clock;
use crate::context::AuthorizationContext;
use crate::error::AuthResult;
use crate::oauth2::{GrantRequest, TokenResponseClient};
use crate::registration::AuthorizationGrantType;
use crate::types::AuthorizedClient;

/// Renews an existing client whose access token expired, for any grant type
#[derive(Debug, Clone)]
pub struct RefreshTokenProvider {
    token_client: Arc<dyn TokenResponseClient>,
    clock: Arc<dyn Clock>,
    clock_skew: Duration,
}

impl RefreshTokenProvider {
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
impl AuthorizedClientProvider for RefreshTokenProvider {
    fn name(&self) -> &'static str {
        "refresh_token"
    }

    fn supported_grant_types(&self) -> &'static [AuthorizationGrantType] {
        ALL_GRANT_TYPES
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
        let Some(client) = context.authorized_client() else {
            return Ok(None);
        };
        let Some(refresh_token) = client.refresh_token() else {
            return Ok(None);
        };
        if !client.is_access_token_expired(self.clock.now(), self.clock_skew) {
            return Ok(None);
        }

        debug!("access token expired, refreshing");
        let scopes = context
            .request_scope()
            .unwrap_or_else(|| client.access_token().scopes.clone());
        let response = self
            .token_client
            .get_token_response(GrantRequest::RefreshToken {
                registration: Arc::clone(client.registration()),
                access_token: client.access_token().clone(),
                refresh_token: refresh_token.clone(),
                scopes,
            })
            .await?;

        let refresh_token = response
            .refresh_token
            .unwrap_or_else(|| refresh_token.clone());
        Ok(Some(AuthorizedClient::new(
            Arc::clone(client.registration()),
            context.principal().name(),
            response.access_token,
            Some(refresh_token),
        )))
    }
}
