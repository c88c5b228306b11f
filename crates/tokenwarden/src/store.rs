//! Persistence of authorized clients

use std::fmt::Debug;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use crate::error::AuthResult;
use crate::transport::TransportContext;
use crate::types::{AuthorizedClient, Principal};

/// Load/save/remove of authorized clients keyed by `(registration_id, principal_name)`
///
/// Implementations must be safe to call concurrently for distinct keys, and a completed
/// `save` must be visible to a later `load` of the same key.
#[async_trait]
pub trait AuthorizedClientStore: Send + Sync + Debug {
    /// Load the client stored for `registration_id` and `principal`
    async fn load(
        &self,
        registration_id: &str,
        principal: &Principal,
        transport: Option<&TransportContext>,
    ) -> AuthResult<Option<AuthorizedClient>>;

    /// Store `client`, replacing any previous entry for the same key
    async fn save(
        &self,
        client: &AuthorizedClient,
        principal: &Principal,
        transport: Option<&TransportContext>,
    ) -> AuthResult<()>;

    /// Remove the entry for `registration_id` and `principal`, if any
    async fn remove(
        &self,
        registration_id: &str,
        principal: &Principal,
        transport: Option<&TransportContext>,
    ) -> AuthResult<()>;

    /// Whether calls need a transport context (e.g. a session-backed store)
    fn requires_transport(&self) -> bool {
        false
    }
}

/// Process-local store
#[derive(Debug, Default)]
pub struct InMemoryAuthorizedClientStore {
    clients: DashMap<(String, String), AuthorizedClient>,
}

impl InMemoryAuthorizedClientStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn key(registration_id: &str, principal_name: &str) -> (String, String) {
        (registration_id.to_string(), principal_name.to_string())
    }
}

#[async_trait]
impl AuthorizedClientStore for InMemoryAuthorizedClientStore {
    async fn load(
        &self,
        registration_id: &str,
        principal: &Principal,
        _transport: Option<&TransportContext>,
    ) -> AuthResult<Option<AuthorizedClient>> {
        let key = Self::key(registration_id, principal.name());
        Ok(self.clients.get(&key).map(|entry| entry.value().clone()))
    }

    async fn save(
        &self,
        client: &AuthorizedClient,
        principal: &Principal,
        _transport: Option<&TransportContext>,
    ) -> AuthResult<()> {
        trace!(
            registration_id = client.registration_id(),
            principal = principal.name(),
            "storing authorized client"
        );
        let key = Self::key(client.registration_id(), principal.name());
        self.clients.insert(key, client.clone());
        Ok(())
    }

    async fn remove(
        &self,
        registration_id: &str,
        principal: &Principal,
        _transport: Option<&TransportContext>,
    ) -> AuthResult<()> {
        self.clients
            .remove(&Self::key(registration_id, principal.name()));
        Ok(())
    }
}
