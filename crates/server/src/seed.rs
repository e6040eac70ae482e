//! Startup seeding of the demo client.

use time::OffsetDateTime;

use crate::config::AppConfig;
use crate::entity::client;
use crate::error::StoreError;
use crate::store::Store;

pub const DEMO_SCOPES: &str = "default profile email api:read api:write";

/// Insert the demo client unless a client with that id already exists.
/// Returns whether a client was created.
pub async fn seed_demo_client(store: &dyn Store, config: &AppConfig) -> Result<bool, StoreError> {
    if !config.demo.seed {
        return Ok(false);
    }
    if store.find_client_by_id(&config.demo.client_id).await?.is_some() {
        tracing::debug!(client_id = %config.demo.client_id, "demo client already present");
        return Ok(false);
    }

    store
        .upsert_client(client::Model {
            id: config.demo.client_id.clone(),
            secret: config.demo.client_secret.clone(),
            name: "Demo Application".to_string(),
            redirect_uris: client::Model::encode_redirect_uris(&config.demo_redirect_uris()),
            allowed_scopes: DEMO_SCOPES.to_string(),
            created_at: OffsetDateTime::now_utc(),
        })
        .await?;
    tracing::info!(client_id = %config.demo.client_id, "seeded demo client");
    Ok(true)
}
