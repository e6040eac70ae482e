//! Client entity - registered relying parties.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "clients")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[serde(skip_serializing)]
    pub secret: String,
    /// Human-readable client name
    pub name: String,
    /// JSON array of registered redirect URIs, in registration order
    pub redirect_uris: String,
    /// Space-separated list of allowed scopes
    pub allowed_scopes: String,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parse redirect URIs from JSON string
    pub fn redirect_uris_list(&self) -> Vec<String> {
        serde_json::from_str(&self.redirect_uris).unwrap_or_default()
    }

    /// Parse scopes from space-separated string
    pub fn scopes_list(&self) -> Vec<String> {
        self.allowed_scopes
            .split_whitespace()
            .map(String::from)
            .collect()
    }

    /// Check if a redirect URI is registered for this client (exact match only)
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris_list()
            .iter()
            .any(|allowed| allowed == uri)
    }

    /// Encode redirect URIs for storage
    pub fn encode_redirect_uris(uris: &[String]) -> String {
        serde_json::to_string(uris).unwrap_or_else(|_| "[]".to_string())
    }
}
