//! Process entry point: load config, connect, migrate, wire state, serve
//! HTTP, run the cron scheduler (`spec.md` §6, §9 — "initialize them once
//! at startup from configuration; never mutate at runtime"). The Router
//! shape here follows `rootsignal-api`; the startup sequence follows the
//! simpler `rootsignal-scout-supervisor` main.

use std::sync::Arc;

use anyhow::Result;
use axum::http::{header, HeaderValue, Method};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod routes;
mod scheduler;
mod state;

use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("echoman=info".parse()?))
        .init();

    let config = echoman_common::Config::from_env();
    config.log_redacted();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    echoman_store::run_migrations(&pool).await?;

    let state = AppState::build(pool, config);

    let scheduler = scheduler::start(state.clone()).await?;

    let cors = std::env::var("CORS_ORIGINS")
        .ok()
        .map(|raw| {
            let origins: Vec<HeaderValue> =
                raw.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE])
        })
        .unwrap_or_else(|| {
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE])
        });

    let app = routes::router()
        .route("/", axum::routing::get(|| async { "ok" }))
        .with_state(state)
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        );

    let host = std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("API_PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("{host}:{port}");
    info!(%addr, "echoman server starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    drop(scheduler);
    Ok(())
}
