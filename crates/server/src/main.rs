use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::WrapErr;
use oidc_provider::config::load_config;
use oidc_provider::keys::{KeyConfig, KeyManager};
use oidc_provider::oidc::OidcState;
use oidc_provider::seed::seed_demo_client;
use oidc_provider::server::{spawn_purge_task, start_webserver};
use oidc_provider::store::{DbStore, Store};
use sea_orm::Database;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "oidc_provider=info,audit=info,tower_http=info,sea_orm=warn";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_level(true))
        .init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    initialize_tracing();

    let config = load_config().wrap_err("Failed to load configuration")?;

    // The listener only binds once a usable signing key is loaded.
    let keys = Arc::new(
        KeyManager::load(&KeyConfig::from(&config.oidc)).wrap_err("Failed to load signing key")?,
    );

    let db = Arc::new(
        Database::connect(&config.database_url)
            .await
            .wrap_err("Failed to connect to database")?,
    );
    let store: Arc<dyn Store> = Arc::new(DbStore::new(db));

    seed_demo_client(store.as_ref(), &config)
        .await
        .wrap_err("Failed to seed demo client")?;

    let state = OidcState::new(store, keys, &config);
    spawn_purge_task(
        state.clone(),
        Duration::from_secs(config.cleanup_interval_secs.max(1)),
    );

    tracing::info!(issuer = %state.issuer, environment = ?config.environment, "starting identity provider");
    start_webserver(state, &config.bind_address).await
}
