//! UserInfo endpoint tests.

mod common;

use axum::http::{HeaderValue, header};
use common::*;
use oidc_provider::{keys::KeyManager, oidc::token::{AccessTokenClaims, TokenResponse}};
use sea_orm::{ConnectionTrait, DbBackend, Statement};
use serde_json::Value;
use time::OffsetDateTime;

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {token}")).unwrap()
}

fn access_claims(sub: &str, exp_offset: i64) -> AccessTokenClaims {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    AccessTokenClaims {
        sub: sub.to_string(),
        scope: vec!["openid".to_string()],
        aud: API_AUD.to_string(),
        iss: ISSUER.to_string(),
        iat: now,
        exp: now + exp_offset,
    }
}

async fn assert_invalid_token(app: &TestApp, token: &str) {
    let response = app
        .server
        .get("/oidc/userinfo")
        .add_header(header::AUTHORIZATION, bearer(token))
        .await;
    response.assert_status_unauthorized();
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    let body: Value = response.json();
    assert_eq!(body["error"], "invalid_token");
}

#[tokio::test]
async fn userinfo_returns_profile_for_issued_token() {
    let app = setup().await;
    let code = app.authorize("openid profile email", None).await;
    let token: TokenResponse = app.redeem_code(&code).await.json();

    let response = app
        .server
        .get("/oidc/userinfo")
        .add_header(header::AUTHORIZATION, bearer(&token.access_token))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["sub"], app.user.id);
    assert_eq!(body["name"], USERNAME);
    assert_eq!(body["email"], EMAIL);
    assert_eq!(body["email_verified"], false);
}

#[tokio::test]
async fn missing_bearer_is_unauthorized() {
    let app = setup().await;
    let response = app.server.get("/oidc/userinfo").await;
    response.assert_status_unauthorized();
    let body: Value = response.json();
    assert_eq!(body["error"], "invalid_token");

    let response = app
        .server
        .get("/oidc/userinfo")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"))
        .await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn malformed_token_is_invalid() {
    let app = setup().await;
    assert_invalid_token(&app, "not.a.jwt").await;
}

#[tokio::test]
async fn unknown_kid_is_invalid() {
    let app = setup().await;
    let rogue = KeyManager::from_pem("rogue-kid", PRIVATE_PEM, None).unwrap();
    let token = rogue.sign(&access_claims(&app.user.id, 3600)).unwrap();
    assert_invalid_token(&app, &token).await;
}

#[tokio::test]
async fn foreign_signature_is_invalid() {
    let app = setup().await;
    let impostor = KeyManager::from_pem(KID, OTHER_PRIVATE_PEM, None).unwrap();
    let token = impostor.sign(&access_claims(&app.user.id, 3600)).unwrap();
    assert_invalid_token(&app, &token).await;
}

#[tokio::test]
async fn expired_token_is_invalid() {
    let app = setup().await;
    let token = app.state.keys.sign(&access_claims(&app.user.id, -3600)).unwrap();
    assert_invalid_token(&app, &token).await;
}

#[tokio::test]
async fn wrong_issuer_is_invalid() {
    let app = setup().await;
    let mut claims = access_claims(&app.user.id, 3600);
    claims.iss = "https://elsewhere.example".to_string();
    let token = app.state.keys.sign(&claims).unwrap();
    assert_invalid_token(&app, &token).await;
}

#[tokio::test]
async fn id_token_is_not_an_access_token() {
    let app = setup().await;
    let code = app.authorize("openid", None).await;
    let token: TokenResponse = app.redeem_code(&code).await.json();
    assert_invalid_token(&app, &token.id_token).await;
}

#[tokio::test]
async fn session_credential_is_not_an_access_token() {
    let app = setup().await;
    let session = app.state.sessions.issue(&app.user).unwrap();
    assert_invalid_token(&app, &session).await;
}

#[tokio::test]
async fn deleted_subject_is_not_found() {
    let app = setup().await;
    let token = app.state.keys.sign(&access_claims("gone-user", 3600)).unwrap();
    let response = app
        .server
        .get("/oidc/userinfo")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await;
    response.assert_status_not_found();
    let body: Value = response.json();
    assert_eq!(body["error"], "user_not_found");
}

#[tokio::test]
async fn verified_email_is_reported() {
    let app = setup().await;
    app.store
        .connection()
        .execute(Statement::from_sql_and_values(
            DbBackend::Sqlite,
            "UPDATE users SET email_verified = 1 WHERE id = ?",
            [app.user.id.clone().into()],
        ))
        .await
        .unwrap();

    let token = app.state.keys.sign(&access_claims(&app.user.id, 3600)).unwrap();
    let response = app
        .server
        .get("/oidc/userinfo")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["email_verified"], true);
}
