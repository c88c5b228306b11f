//! Token endpoint access
//!
//! - [`TokenResponseClient`]: the async exchange contract used by providers
//! - [`OAuth2TokenResponseClient`]: implementation on top of the `oauth2` crate
//! - [`OAuth2HttpClient`]: reqwest adapter with redirects disabled
//! - [`PooledTokenResponseClient`]: runs a blocking exchange on a bounded [`WorkerPool`]

pub mod http_client;
pub mod token_client;
pub mod worker_pool;

pub use http_client::{HttpAdapterError, OAuth2HttpClient};
pub use token_client::{GrantRequest, OAuth2TokenResponseClient, TokenResponse, TokenResponseClient};
pub use worker_pool::{
    BlockingTokenResponseClient, BoundedTokenResponseClient, DEFAULT_MAX_WORKERS,
    DEFAULT_QUEUE_CAPACITY, PooledTokenResponseClient, WorkerPool,
};
