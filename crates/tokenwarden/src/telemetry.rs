//! tracing-subscriber initialisation

use tracing_subscriber::{
    Registry, filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::config::LoggingConfig;
use crate::error::{AuthError, AuthResult};

/// Install a global subscriber
///
/// `RUST_LOG` wins over `config.level` when set.
///
/// # Errors
///
/// Returns [`AuthError::Configuration`] if the filter directive is invalid or a global
/// subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> AuthResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| AuthError::configuration(format!("Invalid log level: {e}")))?;

    if config.json {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .json();

        Registry::default()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| AuthError::configuration(e.to_string()))
    } else {
        let fmt_layer = fmt::layer().with_target(true).with_thread_ids(false);

        Registry::default()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| AuthError::configuration(e.to_string()))
    }
}
