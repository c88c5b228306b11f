//! Configuration files and environment overrides

use std::io::Write as _;

use chrono::Duration;
use secrecy::ExposeSecret;
use tempfile::NamedTempFile;

use tokenwarden::{
    AuthorizationGrantType, ClientAuthenticationMethod, ClientRegistry, ConfigError,
    TokenwardenConfig,
};

fn config_file(suffix: &str, contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

const TOML: &str = r#"
clock_skew_secs = 45
default_client_registration_id = "reports"
default_oauth2_authorized_client = true

[worker_pool]
max_workers = 2
queue_capacity = 4

[logging]
level = "tokenwarden=debug"
json = true

[registrations.reports]
client_id = "reports-client"
client_secret = "s3cret"
client_authentication_method = "client_secret_post"
authorization_grant_type = "client_credentials"
token_uri = "https://auth.example.com/token"
scopes = ["reports.read", "reports.write"]

[registrations.github]
client_id = "gh-client"
client_secret = "gh-secret"
authorization_grant_type = "authorization_code"
token_uri = "https://github.com/login/oauth/access_token"
authorization_uri = "https://github.com/login/oauth/authorize"
redirect_uri = "https://app.example.com/login/oauth2/code/github"
client_name = "GitHub"
"#;

#[test]
fn test_toml_file() {
    let file = config_file(".toml", TOML);
    let config = TokenwardenConfig::from_file(file.path()).unwrap();

    assert_eq!(config.clock_skew(), Duration::seconds(45));
    assert_eq!(config.worker_pool.max_workers, 2);
    assert_eq!(config.worker_pool.queue_capacity, 4);
    assert_eq!(config.logging.level, "tokenwarden=debug");
    assert!(config.logging.json);

    let bridge = config.bridge_config();
    assert_eq!(
        bridge.default_client_registration_id.as_deref(),
        Some("reports")
    );
    assert!(bridge.default_oauth2_authorized_client);

    let registry = config.client_registry().unwrap();
    assert_eq!(registry.len(), 2);

    let reports = registry.find_by_registration_id("reports").unwrap();
    assert_eq!(reports.client_id(), "reports-client");
    assert_eq!(reports.client_secret().expose_secret(), "s3cret");
    assert_eq!(
        reports.client_authentication_method(),
        ClientAuthenticationMethod::ClientSecretPost
    );
    assert_eq!(
        reports.authorization_grant_type(),
        AuthorizationGrantType::ClientCredentials
    );
    assert_eq!(
        reports.scopes(),
        &["reports.read".to_string(), "reports.write".to_string()]
    );

    let github = registry.find_by_registration_id("github").unwrap();
    assert_eq!(github.client_name(), "GitHub");
    assert_eq!(
        github.authorization_uri(),
        Some("https://github.com/login/oauth/authorize")
    );

    let pool = config.worker_pool().unwrap();
    assert_eq!(pool.max_workers(), 2);
    assert_eq!(pool.queue_capacity(), 4);
}

#[test]
fn test_yaml_file() {
    let file = config_file(
        ".yaml",
        r#"
clock_skew_secs: 10
registrations:
  legacy:
    client_id: legacy-client
    authorization_grant_type: password
    token_uri: https://auth.example.com/token
"#,
    );
    let config = TokenwardenConfig::from_file(file.path()).unwrap();

    assert_eq!(config.clock_skew(), Duration::seconds(10));
    let registry = config.client_registry().unwrap();
    let legacy = registry.find_by_registration_id("legacy").unwrap();
    assert_eq!(legacy.authorization_grant_type(), AuthorizationGrantType::Password);
    assert!(!legacy.has_client_secret());
    // defaults to the registration id
    assert_eq!(legacy.client_name(), "legacy");
}

#[test]
fn test_json_file_uses_defaults() {
    let file = config_file(
        ".json",
        r#"{
            "registrations": {
                "reports": {
                    "client_id": "reports-client",
                    "client_secret": "s3cret",
                    "authorization_grant_type": "client_credentials",
                    "token_uri": "https://auth.example.com/token"
                }
            }
        }"#,
    );
    let config = TokenwardenConfig::from_file(file.path()).unwrap();

    assert_eq!(config.clock_skew(), Duration::seconds(60));
    assert_eq!(config.worker_pool.max_workers, 8);
    assert_eq!(config.logging.level, "info");
    assert!(config.bridge_config().default_client_registration_id.is_none());

    let registry = config.client_registry().unwrap();
    let reports = registry.find_by_registration_id("reports").unwrap();
    assert_eq!(
        reports.client_authentication_method(),
        ClientAuthenticationMethod::ClientSecretBasic
    );
}

#[test]
fn test_unsupported_extension() {
    let file = config_file(".ini", "clock_skew_secs = 1");
    let err = TokenwardenConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::UnsupportedFormat));
}

#[test]
fn test_invalid_grant_type_rejected() {
    let file = config_file(
        ".toml",
        r#"
[registrations.reports]
client_id = "reports-client"
authorization_grant_type = "implicit"
token_uri = "https://auth.example.com/token"
"#,
    );
    let err = TokenwardenConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::ParseError(_)));
}

#[test]
fn test_invalid_registration_rejected_when_building_registry() {
    let file = config_file(
        ".toml",
        r#"
[registrations.reports]
client_id = ""
authorization_grant_type = "client_credentials"
token_uri = "https://auth.example.com/token"
"#,
    );
    let config = TokenwardenConfig::from_file(file.path()).unwrap();
    assert!(config.client_registry().is_err());
}

#[test]
fn test_environment_overrides_file() {
    let file = config_file(".toml", TOML);
    // SAFETY: the variables use a prefix no other test reads
    unsafe {
        std::env::set_var("TWCFGTEST_CLOCK_SKEW_SECS", "5");
        std::env::set_var("TWCFGTEST_WORKER_POOL__MAX_WORKERS", "3");
    }

    let config = TokenwardenConfig::from_file_with_prefix(file.path(), "TWCFGTEST").unwrap();

    assert_eq!(config.clock_skew(), Duration::seconds(5));
    assert_eq!(config.worker_pool.max_workers, 3);
    assert_eq!(config.worker_pool.queue_capacity, 4);
}
