//! Token endpoint: redeems authorization codes and refresh tokens for an
//! ID token, an access token and a rotated refresh token.

use axum::{
    Form, Json,
    extract::State,
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::{Duration, OffsetDateTime};
use utoipa::ToSchema;

use crate::audit::{AuditAction, AuditLog, client_details};
use crate::entity::{client, refresh_token, user};
use crate::error::{ErrorResponse, OAuthError};
use crate::oidc::{OIDC_TAG, scope::ScopeSet, state::OidcState};
use crate::store::Issuance;

const MIN_API_AUD_LEN: usize = 3;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TokenRequest {
    /// `authorization_code` or `refresh_token`; inferred from the other fields when absent
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub refresh_token: Option<String>,
    /// When present, must equal the redirect URI the code was issued for
    pub redirect_uri: Option<String>,
    /// May be given with HTTP Basic authentication instead
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Audience of the issued access token (the resource server)
    pub api_aud: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub sub: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    pub aud: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// Access token claims. `scope` is required, so an ID token never decodes as
/// an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: String,
    pub scope: Vec<String>,
    pub aud: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    AuthorizationCode {
        code: String,
        redirect_uri: Option<String>,
    },
    RefreshToken {
        refresh_token: String,
    },
}

impl Grant {
    /// An explicit `grant_type` wins; otherwise `code` is tried before
    /// `refresh_token`.
    pub fn from_request(req: &TokenRequest) -> Result<Self, OAuthError> {
        let code = || Grant::AuthorizationCode {
            code: req.code.clone().unwrap_or_default(),
            redirect_uri: req.redirect_uri.clone(),
        };
        let refresh = || Grant::RefreshToken {
            refresh_token: req.refresh_token.clone().unwrap_or_default(),
        };
        match req.grant_type.as_deref() {
            Some("authorization_code") if req.code.is_some() => Ok(code()),
            Some("authorization_code") => Err(OAuthError::InvalidRequest("code is required".into())),
            Some("refresh_token") if req.refresh_token.is_some() => Ok(refresh()),
            Some("refresh_token") => Err(OAuthError::InvalidRequest(
                "refresh_token is required".into(),
            )),
            Some(_) => Err(OAuthError::UnsupportedGrantType),
            None if req.code.is_some() => Ok(code()),
            None if req.refresh_token.is_some() => Ok(refresh()),
            None => Err(OAuthError::UnsupportedGrantType),
        }
    }
}

/// Client credentials from HTTP Basic auth, falling back to the form body.
fn extract_client_credentials(
    headers: &HeaderMap,
    params: &TokenRequest,
) -> (Option<String>, Option<String>) {
    if let Some(auth) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        && let Ok(decoded) =
            base64::Engine::decode(&base64::engine::general_purpose::STANDARD, auth.trim())
        && let Ok(creds) = String::from_utf8(decoded)
        && let Some((id, secret)) = creds.split_once(':')
    {
        return (
            Some(urlencoding::decode(id).map_or_else(|_| id.to_string(), |s| s.into_owned())),
            Some(
                urlencoding::decode(secret).map_or_else(|_| secret.to_string(), |s| s.into_owned()),
            ),
        );
    }

    (params.client_id.clone(), params.client_secret.clone())
}

/// Tokens and the records that make them durable.
struct Minted {
    response: TokenResponse,
    issuance: Issuance,
}

/// Performs the grant-specific checks and signs the resulting tokens.
pub struct TokenExchanger<'a> {
    state: &'a OidcState,
}

impl<'a> TokenExchanger<'a> {
    pub fn new(state: &'a OidcState) -> Self {
        Self { state }
    }

    pub async fn exchange(
        &self,
        client: &client::Model,
        grant: Grant,
        api_aud: &str,
    ) -> Result<TokenResponse, OAuthError> {
        let store = &self.state.store;
        match grant {
            Grant::AuthorizationCode { code, redirect_uri } => {
                let record = store
                    .find_authorization_code(&code)
                    .await?
                    .ok_or_else(|| OAuthError::InvalidGrant("Invalid code".into()))?;
                if record.client_id != client.id {
                    return Err(OAuthError::InvalidGrant(
                        "Code does not belong to client".into(),
                    ));
                }
                if record.is_expired() {
                    store.delete_authorization_code(&code).await?;
                    return Err(OAuthError::InvalidGrant("Code expired".into()));
                }
                if let Some(uri) = redirect_uri
                    && uri != record.redirect_uri
                {
                    return Err(OAuthError::InvalidGrant("redirect_uri mismatch".into()));
                }

                let user = self.subject(&record.user_id).await?;
                let scopes = ScopeSet::parse(Some(&record.scope));
                let minted = self.mint(client, &user, &scopes, record.nonce, api_aud, 1)?;
                if !store.consume_authorization_code(&code, minted.issuance).await? {
                    tracing::warn!(client_id = %client.id, "authorization code redeemed concurrently");
                    return Err(OAuthError::InvalidGrant("Invalid code".into()));
                }
                Ok(minted.response)
            }
            Grant::RefreshToken { refresh_token } => {
                let record = store
                    .find_refresh_token(&refresh_token)
                    .await?
                    .ok_or_else(|| OAuthError::InvalidGrant("Invalid refresh token".into()))?;
                if record.client_id != client.id {
                    return Err(OAuthError::InvalidGrant(
                        "Token does not belong to client".into(),
                    ));
                }
                if record.is_expired() {
                    store.delete_refresh_token(&refresh_token).await?;
                    return Err(OAuthError::InvalidGrant("Refresh token expired".into()));
                }

                let user = self.subject(&record.user_id).await?;
                let scopes = ScopeSet::parse(Some(&record.scope));
                let minted =
                    self.mint(client, &user, &scopes, None, api_aud, record.version + 1)?;
                if !store
                    .consume_refresh_token(&refresh_token, minted.issuance)
                    .await?
                {
                    tracing::warn!(client_id = %client.id, "refresh token redeemed concurrently");
                    return Err(OAuthError::InvalidGrant("Invalid refresh token".into()));
                }
                Ok(minted.response)
            }
        }
    }

    async fn subject(&self, user_id: &str) -> Result<user::Model, OAuthError> {
        self.state
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| OAuthError::InvalidGrant("Grant subject no longer exists".into()))
    }

    fn mint(
        &self,
        client: &client::Model,
        user: &user::Model,
        scopes: &ScopeSet,
        nonce: Option<String>,
        api_aud: &str,
        version: i32,
    ) -> Result<Minted, OAuthError> {
        let lifetimes = self.state.lifetimes;
        let now = OffsetDateTime::now_utc();
        let iat = now.unix_timestamp();
        let keys = &self.state.keys;

        let id_token = keys.sign(&IdTokenClaims {
            sub: user.id.clone(),
            name: user.username.clone(),
            email: user.email.clone(),
            nonce,
            aud: client.id.clone(),
            iss: self.state.issuer.clone(),
            iat,
            exp: iat + lifetimes.id_token,
        })?;
        let access_token = keys.sign(&AccessTokenClaims {
            sub: user.id.clone(),
            scope: scopes.to_vec(),
            aud: api_aud.to_string(),
            iss: self.state.issuer.clone(),
            iat,
            exp: iat + lifetimes.access_token,
        })?;

        let refresh = refresh_token::Model {
            id: OidcState::generate_token(),
            client_id: client.id.clone(),
            user_id: user.id.clone(),
            scope: scopes.to_string(),
            version,
            expires_at: now + Duration::seconds(lifetimes.refresh_token),
            created_at: now,
        };
        let audit = AuditLog::event(
            AuditAction::TokenIssued,
            Some(&user.id),
            json!({ "client_id": client.id, "version": version }),
        );

        Ok(Minted {
            response: TokenResponse {
                access_token,
                id_token,
                refresh_token: refresh.id.clone(),
                token_type: "Bearer".to_string(),
                expires_in: lifetimes.access_token,
            },
            issuance: Issuance {
                refresh_token: refresh,
                audit,
            },
        })
    }
}

/// OpenID Connect token endpoint.
#[tracing::instrument(skip(state, headers, params))]
#[utoipa::path(
    post,
    path = "/token",
    tag = OIDC_TAG,
    operation_id = "OIDC Token",
    summary = "Exchange an authorization code or refresh token for tokens",
    description = "Authenticates the client (form body or HTTP Basic), then redeems the presented \
                   authorization code or refresh token. Codes and refresh tokens are single use: \
                   every successful call returns a new refresh token and invalidates the old one.\n\n\
                   The access token audience is taken from `api_aud`; the ID token audience is the client.",
    request_body(
        content = TokenRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token request parameters"
    ),
    responses(
        (status = 200, description = "Tokens issued", body = TokenResponse),
        (status = 400, description = "Invalid grant, unsupported grant type or malformed request", body = ErrorResponse),
        (status = 401, description = "Client authentication failed", body = ErrorResponse),
    )
)]
pub async fn token(
    State(state): State<OidcState>,
    headers: HeaderMap,
    Form(params): Form<TokenRequest>,
) -> Result<Response, OAuthError> {
    let (client_id, client_secret) = extract_client_credentials(&headers, &params);
    let client_id = client_id.unwrap_or_default();
    let client = match state
        .clients
        .authenticate(&client_id, client_secret.as_deref().unwrap_or_default())
        .await
    {
        Ok(client) => client,
        Err(e) => {
            if matches!(e, OAuthError::InvalidClient(_)) {
                state
                    .audit
                    .record_best_effort(
                        AuditAction::TokenExchangeFailed,
                        None,
                        client_details(&client_id, None, Some("invalid_client_credentials")),
                    )
                    .await;
            }
            return Err(e);
        }
    };

    let api_aud = params.api_aud.as_deref().unwrap_or_default();
    if api_aud.chars().count() < MIN_API_AUD_LEN {
        return Err(OAuthError::InvalidRequest(format!(
            "api_aud must be at least {MIN_API_AUD_LEN} characters"
        )));
    }

    let grant = Grant::from_request(&params)?;
    let response = match TokenExchanger::new(&state).exchange(&client, grant, api_aud).await {
        Ok(response) => response,
        Err(OAuthError::InvalidGrant(reason)) => {
            state
                .audit
                .record_best_effort(
                    AuditAction::TokenExchangeFailed,
                    None,
                    client_details(&client.id, None, Some(&reason)),
                )
                .await;
            return Err(OAuthError::InvalidGrant(reason));
        }
        Err(e) => return Err(e),
    };

    tracing::info!(client_id = %client.id, "tokens issued");
    let mut response = Json(response).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    Ok(response)
}
