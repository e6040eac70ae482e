//! HTTP server assembly.

use std::time::Duration;

use axum::Router;
use time::OffsetDateTime;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

use crate::oidc::OidcState;
use crate::{account, health, oidc, openapi};

/// Build the application router: `/oidc/*`, the account routes, `/healthz`
/// and Redoc at `/api-docs`.
pub fn build_router(state: OidcState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .nest("/oidc", oidc::router(state.clone()))
        .merge(account::router(state))
        .routes(routes!(health::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router.merge(Redoc::with_url("/api-docs", api))
}

/// Periodically delete expired authorization codes and refresh tokens.
pub fn spawn_purge_task(state: OidcState, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match state.store.purge_expired(OffsetDateTime::now_utc()).await {
                Ok(report) => tracing::debug!(
                    authorization_codes = report.authorization_codes,
                    refresh_tokens = report.refresh_tokens,
                    "purged expired grants"
                ),
                Err(e) => tracing::warn!(error = %e, "failed to purge expired grants"),
            }
        }
    })
}

/// Starts the web server with all configured routes.
#[tracing::instrument(skip(state))]
pub async fn start_webserver(state: OidcState, bind_address: &str) -> color_eyre::Result<()> {
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    tracing::info!(addr = %bind_address, "Server running");
    axum::serve(listener, router)
        .await
        .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
