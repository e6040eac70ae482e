//! OpenAPI/Utoipa configuration.

use crate::account::ACCOUNT_TAG;
use crate::health::MISC_TAG;
use crate::oidc::OIDC_TAG;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

/// Registers the bearer scheme used by `/oidc/userinfo`.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        let bearer = HttpBuilder::new()
            .scheme(HttpAuthScheme::Bearer)
            .bearer_format("JWT")
            .description(Some(
                "RS256 access token obtained from `/oidc/token`.",
            ))
            .build();
        components.add_security_scheme("bearer_auth", SecurityScheme::Http(bearer));
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "OIDC Provider API",
        version = "1.0.0",
        description = "OpenID Connect identity provider: authorization code and refresh token grants, RS256 tokens and JWKS."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = OIDC_TAG, description = "OpenID Connect protocol endpoints"),
        (name = ACCOUNT_TAG, description = "Sign in, registration and account endpoints")
    )
)]
pub struct ApiDoc;
