//! # Tokenwarden - OAuth 2.0 Authorized Clients for Outbound HTTP
//!
//! Obtains, renews and persists OAuth 2.0 access tokens on behalf of principals, and
//! attaches them as bearer credentials to outgoing requests.
//!
//! ## Architecture
//!
//! - [`registration`] - Client registrations and the read-only registry
//! - [`types`] - Access/refresh tokens, authorized clients, principals
//! - [`store`] - Persistence of authorized clients keyed by registration and principal
//! - [`providers`] - Grant-type strategies (authorization_code, refresh_token,
//!   client_credentials, password) and the chain that runs them
//! - [`oauth2`] - Token endpoint client, reqwest adapter, bounded blocking pool
//! - [`manager`] - [`AuthorizedClientManager`]: lookup, chain, persistence, fallback
//! - [`bridge`] - Attribute propagation and bearer attachment for outbound requests
//! - [`transport`] - Explicit transport context and task-scoped propagation
//! - [`config`] / [`telemetry`] - File + environment configuration, log setup
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokenwarden::{
//!     AuthorizeRequest, InMemoryAuthorizedClientStore, Principal, TokenwardenConfig,
//! };
//!
//! let config = TokenwardenConfig::from_file("tokenwarden.toml")?;
//! let manager = config.authorized_client_manager(Arc::new(InMemoryAuthorizedClientStore::new()))?;
//!
//! let request = AuthorizeRequest::with_client_registration_id("billing-api")
//!     .principal(Principal::new("alice"))
//!     .build()?;
//! if let Some(client) = manager.authorize(request).await? {
//!     println!("Bearer {}", client.access_token().token_value);
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `middleware` (default) - Tower [`bridge::OAuth2ClientLayer`] / service

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod bridge;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod manager;
pub mod oauth2;
pub mod providers;
pub mod registration;
pub mod store;
pub mod telemetry;
pub mod transport;
pub mod types;

#[doc(inline)]
pub use bridge::{BridgeConfig, ClientRequestAttributes, RequestAttributeBridge, RequestAttributesExt};

#[cfg(feature = "middleware")]
#[doc(inline)]
pub use bridge::{OAuth2ClientLayer, OAuth2ClientService};

pub use clock::{Clock, FixedClock, SystemClock};

#[doc(inline)]
pub use self::config::{ConfigError, LoggingConfig, TokenwardenConfig, WorkerPoolConfig};

pub use context::{
    AuthorizationContext, PASSWORD_ATTRIBUTE_NAME, REQUEST_SCOPE_ATTRIBUTE_NAME,
    USERNAME_ATTRIBUTE_NAME,
};

pub use error::{AuthError, AuthResult};

#[doc(inline)]
pub use manager::{
    AuthorizeRequest, AuthorizeRequestBuilder, AuthorizedClientManager, ContextAttributesMapper,
    password_attributes_mapper,
};

#[doc(inline)]
pub use self::oauth2::{
    BlockingTokenResponseClient, BoundedTokenResponseClient, GrantRequest,
    OAuth2TokenResponseClient, PooledTokenResponseClient, TokenResponse, TokenResponseClient,
    WorkerPool,
};

#[doc(inline)]
pub use providers::{AuthorizedClientProvider, ProviderChain};

pub use registration::{
    AuthorizationGrantType, ClientAuthenticationMethod, ClientRegistration, ClientRegistry,
    InMemoryClientRegistry,
};

pub use store::{AuthorizedClientStore, InMemoryAuthorizedClientStore};

pub use transport::{
    AmbientContext, InboundRequest, ResponseHeaders, TransportContext, TransportContextAccessor,
    propagate,
};

pub use types::{AccessToken, AuthorizedClient, Principal, RefreshToken};
