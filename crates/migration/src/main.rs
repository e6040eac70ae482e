use config::Config;
use sea_orm_migration::prelude::*;
use std::env;

#[tokio::main]
async fn main() {
    // DATABASE_URL wins; otherwise fall back to the provider's config file
    if env::var("DATABASE_URL").is_err() {
        let path = env::var("OIDC_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
        let settings = Config::builder()
            .add_source(config::File::with_name(&path))
            .build()
            .unwrap();
        if let Ok(url) = settings.get_string("database_url") {
            env::set_var("DATABASE_URL", url);
        }
    }
    cli::run_cli(migration::Migrator).await;
}
