//! Authorization endpoint: turns a signed-in user's request into a
//! single-use authorization code.

use axum::{
    extract::{OriginalUri, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use time::{Duration, OffsetDateTime};
use url::Url;
use utoipa::IntoParams;

use crate::audit::{AuditAction, AuditLog, client_details};
use crate::entity::authorization_code;
use crate::error::{ErrorResponse, OAuthError};
use crate::oidc::{
    OIDC_TAG, clients::ClientRegistry, scope::ScopeSet, session::session_from_headers,
    state::OidcState,
};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthorizeRequest {
    /// Client identifier issued during registration
    pub client_id: Option<String>,
    /// Must exactly match one of the client's registered redirect URIs
    pub redirect_uri: Option<String>,
    /// Space-separated scopes; `default` when absent
    pub scope: Option<String>,
    /// Opaque value echoed back unchanged
    pub state: Option<String>,
    /// Copied into the ID token
    pub nonce: Option<String>,
    /// Only `code` is supported
    pub response_type: Option<String>,
}

/// 302 Found with a `Location` header.
pub(crate) fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// OpenID Connect authorization endpoint.
#[tracing::instrument(skip(state, headers, params), fields(client_id = ?params.client_id))]
#[utoipa::path(
    get,
    path = "/authorize",
    tag = OIDC_TAG,
    operation_id = "OIDC Authorize",
    summary = "Start the authorization code flow",
    description = "Validates the client, redirect URI and scopes. Anonymous users are sent to \
                   `/login` with a `return_to` pointing back here; signed-in users are redirected \
                   to the client's redirect URI with a single-use `code` and the original `state`.\n\n\
                   Redirect URI validation happens first: an unregistered redirect URI never \
                   receives a redirect.",
    params(AuthorizeRequest),
    responses(
        (status = 302, description = "Redirect to the login page or back to the client with a code"),
        (status = 400, description = "Unknown client, unregistered redirect URI or disallowed scope", body = ErrorResponse),
        (status = 401, description = "Session refers to a user that no longer exists", body = ErrorResponse),
    )
)]
pub async fn authorize(
    State(state): State<OidcState>,
    OriginalUri(original_uri): OriginalUri,
    headers: HeaderMap,
    Query(params): Query<AuthorizeRequest>,
) -> Result<Response, OAuthError> {
    let client_id = params.client_id.as_deref().unwrap_or_default();
    let client = match state.clients.resolve(client_id).await {
        Ok(client) => client,
        Err(OAuthError::InvalidClient(msg)) => return Err(OAuthError::InvalidClientRequest(msg)),
        Err(e) => return Err(e),
    };

    let redirect_uri = params.redirect_uri.as_deref().unwrap_or_default();
    if !ClientRegistry::validate_redirect(&client, redirect_uri) {
        tracing::warn!(redirect_uri, "unregistered redirect_uri");
        return Err(OAuthError::InvalidRedirect("invalid redirect_uri".to_string()));
    }
    let mut location = Url::parse(redirect_uri).map_err(|e| {
        tracing::warn!(redirect_uri, error = %e, "registered redirect_uri is not a URL");
        OAuthError::InvalidRedirect("invalid redirect_uri".to_string())
    })?;

    if params.response_type.as_deref().is_some_and(|rt| rt != "code") {
        return Err(OAuthError::InvalidRequest(
            "only response_type=code is supported".to_string(),
        ));
    }

    let scopes = ScopeSet::parse(params.scope.as_deref());
    if !ClientRegistry::validate_scopes(&client, &scopes) {
        let scope = scopes.to_string();
        state
            .audit
            .record_best_effort(
                AuditAction::AuthorizationFailed,
                None,
                client_details(&client.id, Some(&scope), Some("invalid_scope")),
            )
            .await;
        return Err(OAuthError::InvalidScope(format!(
            "scope not allowed for this client: {scope}"
        )));
    }

    let user = match session_from_headers(&headers) {
        Some(credential) => match state.sessions.verify(&credential).await {
            Ok(user) => user,
            Err(e) => return Ok(e.into_response()),
        },
        None => None,
    };
    let Some(user) = user else {
        let request_path = original_uri
            .path_and_query()
            .map_or(original_uri.path(), |pq| pq.as_str());
        let return_to = urlencoding::encode(request_path).into_owned();
        return Ok(found(&format!("/login?return_to={return_to}")));
    };

    let now = OffsetDateTime::now_utc();
    let code = OidcState::generate_token();
    let scope = scopes.to_string();
    let grant = authorization_code::Model {
        code: code.clone(),
        client_id: client.id.clone(),
        user_id: user.id.clone(),
        redirect_uri: redirect_uri.to_string(),
        scope: scope.clone(),
        nonce: params.nonce.clone(),
        expires_at: now + Duration::seconds(state.lifetimes.authorization_code),
        created_at: now,
    };
    let event = AuditLog::event(
        AuditAction::AuthorizationGranted,
        Some(&user.id),
        client_details(&client.id, Some(&scope), None),
    );
    state.store.grant_authorization_code(grant, event.clone()).await?;
    AuditLog::trace(&event);

    {
        let mut query = location.query_pairs_mut();
        query.append_pair("code", &code);
        if let Some(client_state) = &params.state {
            query.append_pair("state", client_state);
        }
    }

    tracing::info!(client_id = %client.id, user_id = %user.id, "authorization code issued");
    Ok(found(location.as_str()))
}
