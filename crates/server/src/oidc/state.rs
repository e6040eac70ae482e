//! Shared state for the provider's HTTP handlers.

use std::sync::Arc;

use axum::extract::FromRef;

use crate::audit::AuditLog;
use crate::config::AppConfig;
use crate::keys::KeyManager;
use crate::oidc::{clients::ClientRegistry, session::SessionAuthenticator};
use crate::store::Store;

/// Token and artifact lifetimes, in seconds.
#[derive(Clone, Copy, Debug)]
pub struct Lifetimes {
    pub authorization_code: i64,
    pub id_token: i64,
    pub access_token: i64,
    pub refresh_token: i64,
}

#[derive(Clone)]
pub struct OidcState {
    pub store: Arc<dyn Store>,
    pub keys: Arc<KeyManager>,
    pub clients: ClientRegistry,
    pub sessions: SessionAuthenticator,
    pub audit: AuditLog,
    /// Issuer identifier, also the base URL of the `/oidc` endpoints
    pub issuer: String,
    pub lifetimes: Lifetimes,
}

impl OidcState {
    pub fn new(store: Arc<dyn Store>, keys: Arc<KeyManager>, config: &AppConfig) -> Self {
        let oidc = &config.oidc;
        Self {
            clients: ClientRegistry::new(store.clone()),
            sessions: SessionAuthenticator::new(
                store.clone(),
                &oidc.session_secret,
                oidc.session_lifetime,
                config.environment.is_production(),
            ),
            audit: AuditLog::new(store.clone()),
            store,
            keys,
            issuer: oidc.issuer.trim_end_matches('/').to_string(),
            lifetimes: Lifetimes {
                authorization_code: oidc.authorization_code_lifetime,
                id_token: oidc.id_token_lifetime,
                access_token: oidc.access_token_lifetime,
                refresh_token: oidc.refresh_token_lifetime,
            },
        }
    }

    /// Generate a secure random token: 32 bytes of OS randomness, base64url.
    pub fn generate_token() -> String {
        use base64::Engine;
        let mut bytes = [0u8; 32];
        getrandom::fill(&mut bytes).expect("Failed to generate random bytes");
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }
}

impl FromRef<OidcState> for SessionAuthenticator {
    fn from_ref(state: &OidcState) -> Self {
        state.sessions.clone()
    }
}
