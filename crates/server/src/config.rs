use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Deployment environment. Controls the `Secure` flag on the session cookie.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

/// Signing key material locations and token lifetimes.
#[derive(Clone, Debug, Deserialize)]
pub struct OidcConfig {
    /// Issuer identifier placed in `iss` and used as the discovery base URL.
    pub issuer: String,
    /// Public base URL of the provider (used for demo redirect URIs).
    #[serde(default = "default_public_url")]
    pub public_url: String,
    /// Key identifier published in the JWKS and stamped into every token header.
    pub kid: String,
    /// PEM encoded RSA private key (PKCS#8 or PKCS#1).
    pub private_key_path: PathBuf,
    /// Optional PEM encoded public key; must match the private key when set.
    #[serde(default)]
    pub public_key_path: Option<PathBuf>,
    /// HMAC secret for session cookies. At least 32 characters.
    pub session_secret: String,
    #[serde(default = "default_authorization_code_lifetime")]
    pub authorization_code_lifetime: i64,
    #[serde(default = "default_id_token_lifetime")]
    pub id_token_lifetime: i64,
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime: i64,
    #[serde(default = "default_refresh_token_lifetime")]
    pub refresh_token_lifetime: i64,
    #[serde(default = "default_session_lifetime")]
    pub session_lifetime: i64,
}

/// Demo client seeded on startup for local development.
#[derive(Clone, Debug, Deserialize)]
pub struct DemoConfig {
    #[serde(default)]
    pub seed: bool,
    #[serde(default = "default_demo_client_id")]
    pub client_id: String,
    #[serde(default = "default_demo_client_secret")]
    pub client_secret: String,
    /// Redirect URIs for the demo client. Defaults to `<public_url>/callback`
    /// and the Postman callback when empty.
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            seed: false,
            client_id: default_demo_client_id(),
            client_secret: default_demo_client_secret(),
            redirect_uris: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default)]
    pub environment: Environment,
    /// Interval between purges of expired codes and refresh tokens.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    pub oidc: OidcConfig,
    #[serde(default)]
    pub demo: DemoConfig,
}

fn default_public_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_authorization_code_lifetime() -> i64 {
    600 // 10 minutes
}

fn default_id_token_lifetime() -> i64 {
    3600 // 1 hour
}

fn default_access_token_lifetime() -> i64 {
    7200 // 2 hours
}

fn default_refresh_token_lifetime() -> i64 {
    86400 * 30 // 30 days
}

fn default_session_lifetime() -> i64 {
    86400 // 1 day
}

fn default_demo_client_id() -> String {
    "demo-client".to_string()
}

fn default_demo_client_secret() -> String {
    "demo-secret".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_cleanup_interval_secs() -> u64 {
    300
}

impl AppConfig {
    /// Check invariants the deserializer cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.oidc.session_secret.len() < 32 {
            return Err(ConfigError::Validation(
                "oidc.session_secret must be at least 32 characters".into(),
            ));
        }
        if self.oidc.kid.trim().is_empty() {
            return Err(ConfigError::Validation("oidc.kid must not be empty".into()));
        }
        if url::Url::parse(&self.oidc.issuer).is_err() {
            return Err(ConfigError::Validation(format!(
                "oidc.issuer is not a valid URL: {}",
                self.oidc.issuer
            )));
        }
        let lifetimes = [
            ("authorization_code_lifetime", self.oidc.authorization_code_lifetime),
            ("id_token_lifetime", self.oidc.id_token_lifetime),
            ("access_token_lifetime", self.oidc.access_token_lifetime),
            ("refresh_token_lifetime", self.oidc.refresh_token_lifetime),
            ("session_lifetime", self.oidc.session_lifetime),
        ];
        for (name, value) in lifetimes {
            if value <= 0 {
                return Err(ConfigError::Validation(format!(
                    "oidc.{name} must be > 0"
                )));
            }
        }
        Ok(())
    }

    /// Redirect URIs registered for the seeded demo client.
    pub fn demo_redirect_uris(&self) -> Vec<String> {
        if self.demo.redirect_uris.is_empty() {
            vec![
                format!("{}/callback", self.oidc.public_url.trim_end_matches('/')),
                "https://oauth.pstmn.io/v1/callback".to_string(),
            ]
        } else {
            self.demo.redirect_uris.clone()
        }
    }
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// The file path can be overridden with `OIDC_CONFIG`. Any environment variable
/// matching the key path separated by double underscores (e.g. `OIDC__KID`)
/// overrides the file value.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment as EnvSource, File};

    let path = std::env::var("OIDC_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let cfg = Config::builder()
        .add_source(File::with_name(&path).required(false))
        .add_source(EnvSource::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}
