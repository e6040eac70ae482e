//! UserInfo endpoint: verifies a bearer access token against the published
//! JWKS and returns the subject's claims.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
};
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ErrorResponse, OAuthError};
use crate::keys::KeyManager;
use crate::oidc::{OIDC_TAG, state::OidcState, token::AccessTokenClaims};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserInfoResponse {
    pub sub: String,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
}

const GENERIC_FAILURE: &str = "The access token is invalid or expired";

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Verify an access token: `kid` must be published, RS256 signature, `exp`
/// and `iss` are checked. The audience belongs to the resource server and is
/// not checked here.
pub fn verify_access_token(
    keys: &KeyManager,
    issuer: &str,
    token: &str,
) -> Result<AccessTokenClaims, OAuthError> {
    let invalid = |reason: &str| {
        tracing::debug!(reason, "rejecting access token");
        OAuthError::InvalidToken(GENERIC_FAILURE.to_string())
    };

    let header = decode_header(token).map_err(|_| invalid("malformed header"))?;
    if header.alg != Algorithm::RS256 {
        return Err(invalid("unexpected algorithm"));
    }
    let kid = header.kid.ok_or_else(|| invalid("missing kid"))?;
    let key = keys.decoding_key(&kid).ok_or_else(|| invalid("unknown kid"))?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_issuer(&[issuer]);
    validation.validate_aud = false;

    decode::<AccessTokenClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| invalid(&e.to_string()))
}

/// OpenID Connect UserInfo endpoint.
#[tracing::instrument(skip(state, headers))]
#[utoipa::path(
    get,
    path = "/userinfo",
    tag = OIDC_TAG,
    operation_id = "OIDC UserInfo",
    summary = "Claims about the access token's subject",
    description = "Verifies the bearer access token against the published JWKS (key resolved by `kid`, \
                   RS256 signature, expiry and issuer) and returns the subject's profile.",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "User claims", body = UserInfoResponse),
        (status = 401, description = "Missing, malformed or invalid access token", body = ErrorResponse),
        (status = 404, description = "Token subject no longer exists", body = ErrorResponse),
    )
)]
pub async fn userinfo(
    State(state): State<OidcState>,
    headers: HeaderMap,
) -> Result<Json<UserInfoResponse>, OAuthError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| OAuthError::InvalidToken("Missing bearer token".to_string()))?;
    let claims = verify_access_token(&state.keys, &state.issuer, token)?;

    let user = state
        .store
        .find_user_by_id(&claims.sub)
        .await?
        .ok_or(OAuthError::UserNotFound)?;

    Ok(Json(UserInfoResponse {
        sub: user.id,
        name: user.username,
        email: user.email,
        email_verified: user.email_verified,
    }))
}
