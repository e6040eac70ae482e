//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::http::{HeaderValue, header};
use axum_test::{TestResponse, TestServer};
use migration::MigratorTrait;
use oidc_provider::{
    config::AppConfig,
    entity::{client, user},
    keys::KeyManager,
    oidc::OidcState,
    password::hash_password,
    server::build_router,
    store::{DbStore, Store},
};
use sea_orm::Database;
use time::OffsetDateTime;

pub const PRIVATE_PEM: &str = include_str!("../fixtures/private.pem");
pub const OTHER_PRIVATE_PEM: &str = include_str!("../fixtures/other_private.pem");

pub const KID: &str = "test-kid";
pub const ISSUER: &str = "http://localhost:5000/oidc";

pub const CLIENT_ID: &str = "c1";
pub const CLIENT_SECRET: &str = "s1";
pub const REDIRECT_URI: &str = "https://app.example/cb";
pub const OTHER_CLIENT_ID: &str = "c2";
pub const OTHER_CLIENT_SECRET: &str = "s2";
pub const OTHER_REDIRECT_URI: &str = "https://other.example/cb";
pub const API_AUD: &str = "https://api.example";

pub const USERNAME: &str = "alice";
pub const EMAIL: &str = "alice@example.com";
pub const PASSWORD: &str = "wonderland";

const CONFIG: &str = r#"
database_url: "sqlite::memory:"
oidc:
  issuer: "http://localhost:5000/oidc"
  kid: "test-kid"
  private_key_path: "tests/fixtures/private.pem"
  session_secret: "integration-test-session-secret-0123456789"
"#;

pub fn test_config() -> AppConfig {
    config::Config::builder()
        .add_source(config::File::from_str(CONFIG, config::FileFormat::Yaml))
        .build()
        .expect("build config")
        .try_deserialize()
        .expect("deserialize config")
}

pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<DbStore>,
    pub state: OidcState,
    pub user: user::Model,
}

pub async fn setup() -> TestApp {
    let db = Database::connect("sqlite::memory:").await.expect("connect");
    migration::Migrator::up(&db, None).await.expect("migrate");
    let store = Arc::new(DbStore::new(Arc::new(db)));

    for (id, secret, redirect, scopes) in [
        (CLIENT_ID, CLIENT_SECRET, REDIRECT_URI, "openid profile email"),
        (OTHER_CLIENT_ID, OTHER_CLIENT_SECRET, OTHER_REDIRECT_URI, "openid"),
    ] {
        store
            .upsert_client(client::Model {
                id: id.to_string(),
                secret: secret.to_string(),
                name: format!("Client {id}"),
                redirect_uris: client::Model::encode_redirect_uris(&[redirect.to_string()]),
                allowed_scopes: scopes.to_string(),
                created_at: OffsetDateTime::now_utc(),
            })
            .await
            .expect("insert client");
    }

    let user = store
        .create_user(user::Model {
            id: uuid::Uuid::new_v4().to_string(),
            username: USERNAME.to_string(),
            email: EMAIL.to_string(),
            email_verified: false,
            password_hash: hash_password(PASSWORD).expect("hash"),
            created_at: OffsetDateTime::now_utc(),
        })
        .await
        .expect("insert user");

    let keys = Arc::new(KeyManager::from_pem(KID, PRIVATE_PEM, None).expect("load key"));
    let dyn_store: Arc<dyn Store> = store.clone();
    let state = OidcState::new(dyn_store, keys, &test_config());
    let server = TestServer::new(build_router(state.clone())).expect("create test server");

    TestApp {
        server,
        store,
        state,
        user,
    }
}

impl TestApp {
    /// `Cookie` header value for a session of `user`.
    pub fn session_cookie_for(&self, user: &user::Model) -> HeaderValue {
        let token = self.state.sessions.issue(user).expect("issue session");
        HeaderValue::from_str(&format!("idp_session={token}")).expect("cookie header")
    }

    pub fn session_cookie(&self) -> HeaderValue {
        self.session_cookie_for(&self.user)
    }

    /// Run `/oidc/authorize` for `c1` as the signed-in user and return the code.
    pub async fn authorize(&self, scope: &str, nonce: Option<&str>) -> String {
        let mut request = self
            .server
            .get("/oidc/authorize")
            .add_query_param("client_id", CLIENT_ID)
            .add_query_param("redirect_uri", REDIRECT_URI)
            .add_query_param("scope", scope)
            .add_query_param("state", "xyz")
            .add_header(header::COOKIE, self.session_cookie());
        if let Some(nonce) = nonce {
            request = request.add_query_param("nonce", nonce);
        }
        let response = request.await;
        response.assert_status(axum::http::StatusCode::FOUND);
        let location = location(&response);
        let url = url::Url::parse(&location).expect("redirect is a URL");
        url.query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.into_owned())
            .expect("code in redirect")
    }

    pub async fn redeem_code(&self, code: &str) -> TestResponse {
        self.server
            .post("/oidc/token")
            .form(&[
                ("client_id", CLIENT_ID),
                ("client_secret", CLIENT_SECRET),
                ("code", code),
                ("api_aud", API_AUD),
            ])
            .await
    }

    pub async fn redeem_refresh(&self, refresh_token: &str) -> TestResponse {
        self.server
            .post("/oidc/token")
            .form(&[
                ("client_id", CLIENT_ID),
                ("client_secret", CLIENT_SECRET),
                ("refresh_token", refresh_token),
                ("api_aud", API_AUD),
            ])
            .await
    }
}

pub fn location(response: &TestResponse) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("location header")
        .to_string()
}
