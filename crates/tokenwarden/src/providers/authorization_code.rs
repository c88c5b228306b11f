//! authorization_code strategy

use async_trait::async_trait;
use tracing::debug;

use super::AuthorizedClientProvider;
use crate::context::AuthorizationContext;
use crate::error::AuthResult;
use crate::registration::AuthorizationGrantType;
use crate::types::AuthorizedClient;

/// Recognizes authorization_code registrations without ever issuing a token
///
/// The code is obtained through an interactive redirect that happens outside this
/// pipeline, so the provider only reports when that redirect is still needed. Expired
/// clients of such registrations are renewed by the refresh_token strategy.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationCodeProvider;

impl AuthorizationCodeProvider {
    /// Create the provider
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuthorizedClientProvider for AuthorizationCodeProvider {
    fn name(&self) -> &'static str {
        "authorization_code"
    }

    fn supported_grant_types(&self) -> &'static [AuthorizationGrantType] {
        &[AuthorizationGrantType::AuthorizationCode]
    }

    async fn authorize(
        &self,
        context: &AuthorizationContext,
    ) -> AuthResult<Option<AuthorizedClient>> {
        if context.authorized_client().is_none() {
            debug!(
                registration_id = context.registration().registration_id(),
                principal = context.principal().name(),
                "interactive authorization required"
            );
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::registration::ClientRegistration;
    use crate::types::{AccessToken, Principal};

    fn registration() -> Arc<ClientRegistration> {
        Arc::new(
            ClientRegistration::with_registration_id("github")
                .client_id("client")
                .authorization_grant_type(AuthorizationGrantType::AuthorizationCode)
                .token_uri("https://github.com/login/oauth/access_token")
                .authorization_uri("https://github.com/login/oauth/authorize")
                .redirect_uri("https://app.example.com/callback")
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_never_issues_a_token() {
        let provider = AuthorizationCodeProvider::new();

        let ctx = AuthorizationContext::for_registration(registration(), Principal::new("alice"));
        assert!(provider.authorize(&ctx).await.unwrap().is_none());

        let client = AuthorizedClient::new(
            registration(),
            "alice",
            AccessToken::bearer("t", None, None, vec![]),
            None,
        );
        let ctx = AuthorizationContext::for_authorized_client(client, Principal::new("alice"));
        assert!(provider.authorize(&ctx).await.unwrap().is_none());
    }
}
