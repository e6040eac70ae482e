//! Browser sessions.
//!
//! A session is an HS256 JWT `{sub, iat, exp}` signed with the configured
//! session secret and carried in the `idp_session` cookie. It never verifies
//! as an ID or access token, which are RS256.

use std::sync::Arc;

use axum::{
    Json,
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::entity::user;
use crate::error::{ErrorResponse, KeyError, SessionError};
use crate::store::Store;

pub const SESSION_COOKIE: &str = "idp_session";

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    iat: i64,
    exp: i64,
}

#[derive(Clone)]
pub struct SessionAuthenticator {
    store: Arc<dyn Store>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime: i64,
    secure: bool,
}

impl SessionAuthenticator {
    pub fn new(store: Arc<dyn Store>, secret: &str, lifetime: i64, secure: bool) -> Self {
        Self {
            store,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            lifetime,
            secure,
        }
    }

    /// Sign a new session credential for `user`.
    pub fn issue(&self, user: &user::Model) -> Result<String, KeyError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = SessionClaims {
            sub: user.id.clone(),
            iat: now,
            exp: now + self.lifetime,
        };
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )?)
    }

    /// Resolve a credential to its user.
    ///
    /// A bad signature or an expired credential is anonymous (`Ok(None)`);
    /// a valid credential whose user is gone is an error.
    pub async fn verify(&self, credential: &str) -> Result<Option<user::Model>, SessionError> {
        let validation = Validation::new(Algorithm::HS256);
        let claims = match jsonwebtoken::decode::<SessionClaims>(
            credential,
            &self.decoding_key,
            &validation,
        ) {
            Ok(data) => data.claims,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring invalid session credential");
                return Ok(None);
            }
        };

        match self.store.find_user_by_id(&claims.sub).await? {
            Some(user) => Ok(Some(user)),
            None => {
                tracing::warn!(sub = %claims.sub, "session refers to a missing user");
                Err(SessionError::UnknownSubject)
            }
        }
    }

    /// `Set-Cookie` value carrying `token`.
    pub fn session_cookie(&self, token: &str) -> String {
        let mut cookie = format!(
            "{SESSION_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
            self.lifetime
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// `Set-Cookie` value that removes the session.
    pub fn clear_session_cookie(&self) -> String {
        let mut cookie = format!("{SESSION_COOKIE}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0");
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Extract the session credential from the `Cookie` header(s).
pub fn session_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|cookie| {
            cookie
                .trim()
                .strip_prefix(SESSION_COOKIE)
                .and_then(|rest| rest.strip_prefix('='))
                .filter(|token| !token.is_empty())
                .map(str::to_owned)
        })
}

/// The signed-in user, if any.
pub struct CurrentUser(pub Option<user::Model>);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    SessionAuthenticator: FromRef<S>,
{
    type Rejection = SessionError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(credential) = session_from_headers(&parts.headers) else {
            return Ok(CurrentUser(None));
        };
        let sessions = SessionAuthenticator::from_ref(state);
        Ok(CurrentUser(sessions.verify(&credential).await?))
    }
}

/// The signed-in user; anonymous requests are rejected with 401.
pub struct RequireUser(pub user::Model);

impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
    SessionAuthenticator: FromRef<S>,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(CurrentUser(Some(user))) => Ok(RequireUser(user)),
            Ok(CurrentUser(None)) => Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "unauthorized".to_string(),
                    error_description: Some("Authentication required".to_string()),
                }),
            )
                .into_response()),
            Err(e) => Err(e.into_response()),
        }
    }
}
