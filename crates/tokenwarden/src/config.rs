//! Configuration
//!
//! [`TokenwardenConfig`] is read from a TOML, YAML or JSON file (format chosen by
//! extension) with environment overrides: `TOKENWARDEN_CLOCK_SKEW_SECS=30`,
//! `TOKENWARDEN_WORKER_POOL__MAX_WORKERS=4`,
//! `TOKENWARDEN_REGISTRATIONS__GITHUB__CLIENT_SECRET=...`.
//!
//! ```toml
//! clock_skew_secs = 60
//! default_client_registration_id = "github"
//!
//! [logging]
//! level = "tokenwarden=debug"
//!
//! [registrations.github]
//! client_id = "abc"
//! client_secret = "xyz"
//! authorization_grant_type = "authorization_code"
//! token_uri = "https://github.com/login/oauth/access_token"
//! authorization_uri = "https://github.com/login/oauth/authorize"
//! redirect_uri = "https://app.example.com/login/oauth2/code/github"
//! scopes = ["read:user"]
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use secrecy::SecretString;
use serde::Deserialize;

use crate::bridge::BridgeConfig;
use crate::clock::{Clock, SystemClock};
use crate::error::{AuthError, AuthResult};
use crate::manager::AuthorizedClientManager;
use crate::oauth2::{
    BoundedTokenResponseClient, DEFAULT_MAX_WORKERS, DEFAULT_QUEUE_CAPACITY,
    OAuth2TokenResponseClient, WorkerPool,
};
use crate::providers::{DEFAULT_CLOCK_SKEW_SECS, ProviderChain};
use crate::registration::{
    AuthorizationGrantType, ClientAuthenticationMethod, ClientRegistration,
    InMemoryClientRegistry,
};
use crate::store::AuthorizedClientStore;

/// Default environment variable prefix
pub const DEFAULT_ENV_PREFIX: &str = "TOKENWARDEN";

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),
}

impl From<ConfigError> for AuthError {
    fn from(e: ConfigError) -> Self {
        Self::configuration(e.to_string())
    }
}

/// Settings of one client registration
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationSettings {
    /// OAuth client id
    pub client_id: String,
    /// Client secret, omitted for public clients
    #[serde(default)]
    pub client_secret: Option<SecretString>,
    /// Token endpoint authentication method
    #[serde(default)]
    pub client_authentication_method: ClientAuthenticationMethod,
    /// Grant type
    pub authorization_grant_type: AuthorizationGrantType,
    /// Default scopes
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Token endpoint
    pub token_uri: String,
    /// Authorization endpoint
    #[serde(default)]
    pub authorization_uri: Option<String>,
    /// Redirect URI
    #[serde(default)]
    pub redirect_uri: Option<String>,
    /// Display name
    #[serde(default)]
    pub client_name: Option<String>,
}

impl RegistrationSettings {
    /// Build the registration stored under `registration_id`
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the settings fail registration validation.
    pub fn to_registration(&self, registration_id: &str) -> AuthResult<ClientRegistration> {
        let mut builder = ClientRegistration::with_registration_id(registration_id)
            .client_id(self.client_id.clone())
            .client_authentication_method(self.client_authentication_method)
            .authorization_grant_type(self.authorization_grant_type)
            .scopes(self.scopes.iter().cloned())
            .token_uri(self.token_uri.clone());
        if let Some(secret) = &self.client_secret {
            builder = builder.client_secret_secret(secret.clone());
        }
        if let Some(uri) = &self.authorization_uri {
            builder = builder.authorization_uri(uri.clone());
        }
        if let Some(uri) = &self.redirect_uri {
            builder = builder.redirect_uri(uri.clone());
        }
        if let Some(name) = &self.client_name {
            builder = builder.client_name(name.clone());
        }
        builder.build()
    }
}

/// Token exchange pool limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Concurrent token exchanges
    pub max_workers: usize,
    /// Submissions allowed to wait for a worker
    pub queue_capacity: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TokenwardenConfig {
    /// Tolerance subtracted from token expiry, in seconds
    pub clock_skew_secs: u32,
    /// Registration used by the bridge when a request names none
    pub default_client_registration_id: Option<String>,
    /// Let the bridge fall back to the principal's login registration
    pub default_oauth2_authorized_client: bool,
    /// Token exchange pool limits
    pub worker_pool: WorkerPoolConfig,
    /// Log output settings
    pub logging: LoggingConfig,
    /// Client registrations keyed by registration id
    pub registrations: HashMap<String, RegistrationSettings>,
}

impl Default for TokenwardenConfig {
    fn default() -> Self {
        Self {
            clock_skew_secs: DEFAULT_CLOCK_SKEW_SECS,
            default_client_registration_id: None,
            default_oauth2_authorized_client: false,
            worker_pool: WorkerPoolConfig::default(),
            logging: LoggingConfig::default(),
            registrations: HashMap::new(),
        }
    }
}

impl TokenwardenConfig {
    /// Load configuration from a file (TOML, YAML, or JSON)
    ///
    /// Environment variables with the `TOKENWARDEN_` prefix override file settings;
    /// nested keys are separated by `__`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file doesn't exist
    /// - The file format is unsupported
    /// - The file contains invalid configuration
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_prefix(path, DEFAULT_ENV_PREFIX)
    }

    /// Load configuration from a file with a custom environment prefix
    ///
    /// # Errors
    ///
    /// Same as [`TokenwardenConfig::from_file`].
    pub fn from_file_with_prefix(
        path: impl AsRef<Path>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        use config::{Config, Environment, File, FileFormat};

        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml" | "yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let config = Config::builder()
            .add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ))
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Clock skew as a duration
    pub fn clock_skew(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(self.clock_skew_secs))
    }

    /// Registry of every configured registration
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if a registration is invalid or none are
    /// configured.
    pub fn client_registry(&self) -> AuthResult<InMemoryClientRegistry> {
        let registrations = self
            .registrations
            .iter()
            .map(|(id, settings)| settings.to_registration(id))
            .collect::<AuthResult<Vec<_>>>()?;
        InMemoryClientRegistry::new(registrations)
    }

    /// Registration defaults for the bridge
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            default_client_registration_id: self.default_client_registration_id.clone(),
            default_oauth2_authorized_client: self.default_oauth2_authorized_client,
        }
    }

    /// Pool bounding concurrent token exchanges
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if `max_workers` is zero.
    pub fn worker_pool(&self) -> AuthResult<WorkerPool> {
        WorkerPool::new(
            self.worker_pool.max_workers,
            self.worker_pool.queue_capacity,
        )
    }

    /// Manager over the configured registrations with all four grant strategies
    ///
    /// Tokens are exchanged with [`OAuth2TokenResponseClient`], admitted through
    /// [`worker_pool`](Self::worker_pool), and persisted to `store`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the registry, the worker pool or the
    /// HTTP client cannot be built.
    pub fn authorized_client_manager(
        &self,
        store: Arc<dyn AuthorizedClientStore>,
    ) -> AuthResult<AuthorizedClientManager> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let token_client = BoundedTokenResponseClient::new(
            OAuth2TokenResponseClient::new()?.with_clock(Arc::clone(&clock)),
            self.worker_pool()?,
        );
        let chain = ProviderChain::builder()
            .clock(Arc::clone(&clock))
            .clock_skew(self.clock_skew())
            .token_client(Arc::new(token_client))
            .all_grants()
            .build()?;

        Ok(AuthorizedClientManager::with_provider_chain(
            Arc::new(self.client_registry()?),
            store,
            chain,
        ))
    }
}
