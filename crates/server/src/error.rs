//! Error types shared across the provider.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Failures of the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("{0} already exists")]
    Conflict(&'static str),
}

/// Failures loading or using the signing key.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("failed to read key file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed {kind} key: {reason}")]
    Malformed { kind: &'static str, reason: String },
    #[error("RSA key is {bits} bits, at least 2048 required")]
    TooShort { bits: usize },
    #[error("public key does not match the private key")]
    Mismatch,
    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Failures resolving a session credential.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session subject no longer exists")]
    UnknownSubject,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Body of every OAuth2 error response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// Protocol-level errors, rendered as `{error, error_description}`.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// Unknown client or failed client authentication (401).
    #[error("invalid_client: {0}")]
    InvalidClient(String),
    /// Unknown client at the authorization endpoint (400).
    #[error("invalid_client: {0}")]
    InvalidClientRequest(String),
    #[error("invalid_grant: {0}")]
    InvalidGrant(String),
    #[error("invalid_scope: {0}")]
    InvalidScope(String),
    #[error("invalid_redirect: {0}")]
    InvalidRedirect(String),
    #[error("unsupported_grant_type")]
    UnsupportedGrantType,
    #[error("invalid_request: {0}")]
    InvalidRequest(String),
    #[error("invalid_token: {0}")]
    InvalidToken(String),
    #[error("user_not_found")]
    UserNotFound,
    #[error("server_error")]
    ServerError,
}

impl OAuthError {
    pub fn code(&self) -> &'static str {
        match self {
            OAuthError::InvalidClient(_) | OAuthError::InvalidClientRequest(_) => "invalid_client",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::InvalidScope(_) => "invalid_scope",
            OAuthError::InvalidRedirect(_) => "invalid_redirect",
            OAuthError::UnsupportedGrantType => "unsupported_grant_type",
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidToken(_) => "invalid_token",
            OAuthError::UserNotFound => "user_not_found",
            OAuthError::ServerError => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            OAuthError::InvalidClient(_) | OAuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            OAuthError::UserNotFound => StatusCode::NOT_FOUND,
            OAuthError::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn description(&self) -> Option<String> {
        match self {
            OAuthError::InvalidClient(d)
            | OAuthError::InvalidClientRequest(d)
            | OAuthError::InvalidGrant(d)
            | OAuthError::InvalidScope(d)
            | OAuthError::InvalidRedirect(d)
            | OAuthError::InvalidRequest(d)
            | OAuthError::InvalidToken(d) => Some(d.clone()),
            OAuthError::UserNotFound => Some("User not found".to_string()),
            OAuthError::UnsupportedGrantType | OAuthError::ServerError => None,
        }
    }
}

impl From<StoreError> for OAuthError {
    fn from(e: StoreError) -> Self {
        tracing::error!(error = %e, "storage failure");
        OAuthError::ServerError
    }
}

impl From<KeyError> for OAuthError {
    fn from(e: KeyError) -> Self {
        tracing::error!(error = %e, "signing failure");
        OAuthError::ServerError
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorResponse {
            error: self.code().to_string(),
            error_description: self.description(),
        });
        let mut response = (status, body).into_response();
        if matches!(self, OAuthError::InvalidToken(_)) {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer error=\"invalid_token\""),
            );
        }
        response
    }
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        match self {
            SessionError::UnknownSubject => (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "unauthorized".to_string(),
                    error_description: Some("Session user not found".to_string()),
                }),
            )
                .into_response(),
            SessionError::Store(e) => OAuthError::from(e).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(
            OAuthError::InvalidClient("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            OAuthError::InvalidClientRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(OAuthError::UserNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            OAuthError::ServerError.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(OAuthError::UnsupportedGrantType.code(), "unsupported_grant_type");
    }

    #[test]
    fn invalid_token_carries_www_authenticate() {
        let response = OAuthError::InvalidToken("bad".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

        let response = OAuthError::InvalidGrant("bad".into()).into_response();
        assert!(!response.headers().contains_key(header::WWW_AUTHENTICATE));
    }
}
