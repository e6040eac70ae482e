//! Browser-facing account routes: sign in, registration, sign out and the
//! signed-in user's profile.

use axum::{
    Form, Json,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::audit::AuditAction;
use crate::entity::user;
use crate::error::{ErrorResponse, OAuthError, StoreError};
use crate::oidc::{ClientRegistry, CurrentUser, OidcState, RequireUser};
use crate::password::{authenticate_user, hash_password};

/// OpenAPI tag for account endpoints
pub const ACCOUNT_TAG: &str = "Account";

pub fn router(state: OidcState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(login_prompt, login))
        .routes(routes!(register))
        .routes(routes!(logout))
        .routes(routes!(account))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReturnTo {
    /// Where to go after signing in: a same-origin path or a registered client redirect URI
    pub return_to: Option<String>,
    /// Error message from a previous attempt
    pub error: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for LoginForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginForm")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize, ToSchema)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginPrompt {
    pub return_to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AccountResponse {
    pub id: String,
    pub username: String,
    pub email: String,
}

/// Resolve a post-login target. Relative same-origin paths and registered
/// client redirect URIs are kept; anything else becomes `/`.
pub async fn validate_return_to(
    clients: &ClientRegistry,
    return_to: Option<&str>,
) -> Result<String, OAuthError> {
    let Some(target) = return_to.filter(|t| !t.is_empty()) else {
        return Ok("/".to_string());
    };
    if target.starts_with('/') && !target.starts_with("//") && !target.starts_with("/\\") {
        return Ok(target.to_string());
    }
    if clients.is_registered_redirect(target).await? {
        return Ok(target.to_string());
    }
    tracing::debug!(target, "discarding unrecognised return_to");
    Ok("/".to_string())
}

fn error_redirect(page: &str, message: &str, return_to: Option<&str>) -> Response {
    Redirect::to(&format!(
        "{page}?error={}&return_to={}",
        urlencoding::encode(message),
        urlencoding::encode(return_to.unwrap_or_default())
    ))
    .into_response()
}

fn signed_in_redirect(state: &OidcState, user: &user::Model, target: &str) -> Result<Response, OAuthError> {
    let token = state.sessions.issue(user)?;
    Ok((
        [(header::SET_COOKIE, state.sessions.session_cookie(&token))],
        Redirect::to(target),
    )
        .into_response())
}

/// Sign-in landing.
#[tracing::instrument(skip(state, current))]
#[utoipa::path(
    get,
    path = "/login",
    tag = ACCOUNT_TAG,
    operation_id = "Login Prompt",
    summary = "Sign-in landing",
    description = "Signed-in users are sent straight to their validated `return_to`. \
                   Anonymous users get the parameters a sign-in form needs.",
    params(ReturnTo),
    responses(
        (status = 200, description = "Anonymous user, sign in required", body = LoginPrompt),
        (status = 303, description = "Already signed in"),
    )
)]
pub async fn login_prompt(
    State(state): State<OidcState>,
    current: CurrentUser,
    Query(query): Query<ReturnTo>,
) -> Result<Response, OAuthError> {
    if current.0.is_some() {
        let target = validate_return_to(&state.clients, query.return_to.as_deref()).await?;
        return Ok(Redirect::to(&target).into_response());
    }
    Ok(Json(LoginPrompt {
        return_to: query.return_to.unwrap_or_default(),
        error: query.error,
    })
    .into_response())
}

/// Sign in with username and password.
#[tracing::instrument(skip(state, form), fields(username = %form.username))]
#[utoipa::path(
    post,
    path = "/login",
    tag = ACCOUNT_TAG,
    operation_id = "Login",
    summary = "Sign in",
    description = "Verifies the credentials, sets the `idp_session` cookie and redirects to the \
                   validated `return_to`. Failures redirect back to `/login` with an `error`.",
    params(ReturnTo),
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Signed in, or back to the login page with an error"),
    )
)]
pub async fn login(
    State(state): State<OidcState>,
    Query(query): Query<ReturnTo>,
    Form(form): Form<LoginForm>,
) -> Result<Response, OAuthError> {
    let account = state.store.find_user_by_username(&form.username).await?;
    let known_id = account.as_ref().map(|u| u.id.clone());
    let user = match authenticate_user(account, &form.password) {
        Some(user) => user,
        None => {
            state
                .audit
                .record_best_effort(
                    AuditAction::LoginFailed,
                    known_id.as_deref(),
                    json!({ "username": form.username }),
                )
                .await;
            return Ok(error_redirect(
                "/login",
                "Incorrect username or password",
                query.return_to.as_deref(),
            ));
        }
    };

    let target = validate_return_to(&state.clients, query.return_to.as_deref()).await?;
    tracing::info!(user_id = %user.id, "user signed in");
    signed_in_redirect(&state, &user, &target)
}

/// Create an account and sign in.
#[tracing::instrument(skip(state, form), fields(username = %form.username))]
#[utoipa::path(
    post,
    path = "/register",
    tag = ACCOUNT_TAG,
    operation_id = "Register",
    summary = "Create an account",
    description = "Creates a user with an Argon2id password hash, sets the session cookie and \
                   redirects to the validated `return_to`. A taken username or email redirects \
                   back to `/register` with an error.",
    params(ReturnTo),
    request_body(content = RegisterForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Registered and signed in, or back to the form with an error"),
    )
)]
pub async fn register(
    State(state): State<OidcState>,
    Query(query): Query<ReturnTo>,
    Form(form): Form<RegisterForm>,
) -> Result<Response, OAuthError> {
    let return_to = query.return_to.as_deref();
    let username = form.username.trim();
    let email = form.email.trim();
    if username.is_empty() || form.password.is_empty() || !email.contains('@') {
        return Ok(error_redirect("/register", "Invalid registration details", return_to));
    }

    if state
        .store
        .find_user_by_username_or_email(username, email)
        .await?
        .is_some()
    {
        return Ok(error_redirect("/register", "User already exists", return_to));
    }

    let password_hash = match hash_password(&form.password) {
        Ok(hash) => hash,
        Err(e) => {
            tracing::error!(error = %e, "failed to hash password");
            return Ok(error_redirect("/register", "Failed to create user", return_to));
        }
    };

    let user = match state
        .store
        .create_user(user::Model {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            email: email.to_string(),
            email_verified: false,
            password_hash,
            created_at: OffsetDateTime::now_utc(),
        })
        .await
    {
        Ok(user) => user,
        Err(StoreError::Conflict(_)) => {
            return Ok(error_redirect("/register", "User already exists", return_to));
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to create user");
            return Ok(error_redirect("/register", "Failed to create user", return_to));
        }
    };

    state
        .audit
        .record_best_effort(
            AuditAction::UserRegistered,
            Some(&user.id),
            json!({ "username": user.username }),
        )
        .await;

    let target = validate_return_to(&state.clients, return_to).await?;
    signed_in_redirect(&state, &user, &target)
}

/// Sign out.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/logout",
    tag = ACCOUNT_TAG,
    operation_id = "Logout",
    summary = "Sign out",
    responses(
        (status = 303, description = "Session cookie cleared, redirected to `/login`"),
    )
)]
pub async fn logout(State(state): State<OidcState>) -> Response {
    (
        [(header::SET_COOKIE, state.sessions.clear_session_cookie())],
        Redirect::to("/login"),
    )
        .into_response()
}

/// The signed-in user's account.
#[tracing::instrument(skip(user))]
#[utoipa::path(
    get,
    path = "/account",
    tag = ACCOUNT_TAG,
    operation_id = "Account",
    summary = "Current account",
    responses(
        (status = 200, description = "The signed-in user", body = AccountResponse),
        (status = 401, description = "No valid session", body = ErrorResponse),
    )
)]
pub async fn account(RequireUser(user): RequireUser) -> Json<AccountResponse> {
    Json(AccountResponse {
        id: user.id,
        username: user.username,
        email: user.email,
    })
}
