//! Per-call authorization context handed to providers

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::registration::ClientRegistration;
use crate::types::{AuthorizedClient, Principal};

/// Attribute holding the scopes requested for this call (array of strings)
pub const REQUEST_SCOPE_ATTRIBUTE_NAME: &str = "request_scope";

/// Attribute holding the resource owner username (password grant)
pub const USERNAME_ATTRIBUTE_NAME: &str = "username";

/// Attribute holding the resource owner password (password grant)
pub const PASSWORD_ATTRIBUTE_NAME: &str = "password";

/// Transient input to [`crate::AuthorizedClientProvider::authorize`]
///
/// Built from either an existing [`AuthorizedClient`] or a bare registration. Never
/// persisted.
#[derive(Debug, Clone)]
pub struct AuthorizationContext {
    registration: Arc<ClientRegistration>,
    authorized_client: Option<AuthorizedClient>,
    principal: Principal,
    attributes: HashMap<String, Value>,
}

impl AuthorizationContext {
    /// Context for a registration with no existing client
    pub fn for_registration(registration: Arc<ClientRegistration>, principal: Principal) -> Self {
        Self {
            registration,
            authorized_client: None,
            principal,
            attributes: HashMap::new(),
        }
    }

    /// Context for re-authorizing an existing client
    pub fn for_authorized_client(client: AuthorizedClient, principal: Principal) -> Self {
        Self {
            registration: Arc::clone(client.registration()),
            authorized_client: Some(client),
            principal,
            attributes: HashMap::new(),
        }
    }

    /// Replace the attribute map
    #[must_use]
    pub fn with_attributes(mut self, attributes: HashMap<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Set a single attribute
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Registration being authorized
    pub fn registration(&self) -> &Arc<ClientRegistration> {
        &self.registration
    }

    /// Existing client, if the context was built from one
    pub fn authorized_client(&self) -> Option<&AuthorizedClient> {
        self.authorized_client.as_ref()
    }

    /// Principal the call is made for
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// All attributes
    pub fn attributes(&self) -> &HashMap<String, Value> {
        &self.attributes
    }

    /// Raw attribute value
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Attribute as a string
    pub fn string_attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }

    /// Requested scope override, if set
    ///
    /// Accepts an array of strings or a single space-delimited string.
    pub fn request_scope(&self) -> Option<Vec<String>> {
        match self.attributes.get(REQUEST_SCOPE_ATTRIBUTE_NAME)? {
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            ),
            Value::String(s) => Some(s.split_whitespace().map(str::to_string).collect()),
            _ => None,
        }
    }

    /// Username for the password grant
    pub fn username(&self) -> Option<&str> {
        self.string_attribute(USERNAME_ATTRIBUTE_NAME)
    }

    /// Password for the password grant
    pub fn password(&self) -> Option<&str> {
        self.string_attribute(PASSWORD_ATTRIBUTE_NAME)
    }
}
