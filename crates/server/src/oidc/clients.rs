//! Client lookup and validation.

use std::sync::Arc;

use subtle::ConstantTimeEq;

use crate::entity::client;
use crate::error::OAuthError;
use crate::oidc::scope::ScopeSet;
use crate::store::Store;

#[derive(Clone)]
pub struct ClientRegistry {
    store: Arc<dyn Store>,
}

impl ClientRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Look up a client. An unknown id is `invalid_client` (401); callers at
    /// the authorization endpoint downgrade it to 400.
    pub async fn resolve(&self, client_id: &str) -> Result<client::Model, OAuthError> {
        self.store
            .find_client_by_id(client_id)
            .await?
            .ok_or_else(|| OAuthError::InvalidClient("invalid client_id".to_string()))
    }

    pub fn validate_redirect(client: &client::Model, uri: &str) -> bool {
        client.is_redirect_uri_allowed(uri)
    }

    pub fn validate_scopes(client: &client::Model, scopes: &ScopeSet) -> bool {
        scopes.is_subset_of(&client.scopes_list())
    }

    /// Authenticate a confidential client. Unknown ids and wrong secrets are
    /// indistinguishable to the caller.
    pub async fn authenticate(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<client::Model, OAuthError> {
        let invalid = || OAuthError::InvalidClient("invalid client credentials".to_string());
        let client = self.store.find_client_by_id(client_id).await?.ok_or_else(invalid)?;
        if bool::from(client.secret.as_bytes().ct_eq(client_secret.as_bytes())) {
            Ok(client)
        } else {
            Err(invalid())
        }
    }

    /// Whether `uri` is registered as a redirect URI for any client.
    pub async fn is_registered_redirect(&self, uri: &str) -> Result<bool, OAuthError> {
        Ok(self
            .store
            .list_clients()
            .await?
            .iter()
            .any(|c| c.is_redirect_uri_allowed(uri)))
    }
}
