//! OpenID Connect provider endpoints.
//!
//! ## Endpoints (nested under `/oidc`)
//!
//! - `GET /.well-known/openid-configuration` - Discovery document
//! - `GET /.well-known/jwks.json` - Public signing keys
//! - `GET /authorize` - Authorization endpoint
//! - `POST /token` - Token endpoint
//! - `GET /userinfo` - UserInfo endpoint

pub mod authorize;
pub mod clients;
pub mod discovery;
pub mod scope;
pub mod session;
pub mod state;
pub mod token;
pub mod userinfo;

use utoipa_axum::{router::OpenApiRouter, routes};

pub use clients::ClientRegistry;
pub use session::{CurrentUser, RequireUser, SessionAuthenticator};
pub use state::OidcState;

/// OpenAPI tag for OpenID Connect endpoints
pub const OIDC_TAG: &str = "OpenID Connect";

/// Creates the OpenID Connect router.
pub fn router(state: OidcState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(discovery::openid_configuration))
        .routes(routes!(discovery::jwks))
        .routes(routes!(authorize::authorize))
        .routes(routes!(token::token))
        .routes(routes!(userinfo::userinfo))
        .with_state(state)
}
