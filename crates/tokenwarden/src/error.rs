//! Error taxonomy
//!
//! Every fallible operation in the crate returns [`AuthResult`]. An `Ok(None)` from
//! [`crate::AuthorizedClientManager::authorize`] or a provider is a valid "nothing to do"
//! outcome and is never represented as an error.

use thiserror::Error;

/// Errors surfaced by the authorized-client pipeline
///
/// None of these are retried internally; retry policy belongs to the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// A required collaborator, registration field or transport context is missing
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The requested client registration id is not known to the registry
    #[error("client registration '{registration_id}' not found")]
    NotFound {
        /// The registration id that failed to resolve
        registration_id: String,
    },

    /// The grant requires data the caller did not supply
    #[error("credentials missing: {0}")]
    CredentialsMissing(String),

    /// The token endpoint (or the exchange executor) failed
    #[error("token exchange failed for '{registration_id}': {message}")]
    TokenExchange {
        /// Registration the exchange was performed for
        registration_id: String,
        /// Human-readable failure description
        message: String,
    },
}

impl AuthError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a not-found error for a registration id
    pub fn not_found(registration_id: impl Into<String>) -> Self {
        Self::NotFound {
            registration_id: registration_id.into(),
        }
    }

    /// Create a credentials-missing error
    pub fn credentials_missing(message: impl Into<String>) -> Self {
        Self::CredentialsMissing(message.into())
    }

    /// Create a token exchange error
    pub fn token_exchange(registration_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TokenExchange {
            registration_id: registration_id.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable kind, used as a tracing field
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::NotFound { .. } => "not_found",
            Self::CredentialsMissing(_) => "credentials_missing",
            Self::TokenExchange { .. } => "token_exchange",
        }
    }
}

/// Result alias used across the crate
pub type AuthResult<T> = Result<T, AuthError>;
