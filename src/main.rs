mod auth;
mod config;
mod db;
mod error;
mod mailer;
mod middleware;
mod models;
mod routes;
mod services;
mod store;
mod tokens;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::{config::Config, mailer::LogMailer, models::AppState, store::postgres::PgStore};

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use axum::http::header;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;
    let pool = db::connect_pg(&cfg.database_url).await?;

    let state = AppState {
        store: Arc::new(PgStore::new(pool)),
        mailer: Arc::new(LogMailer::new(cfg.mail_from.clone())),
        access_ttl_minutes: cfg.access_ttl_minutes,
        refresh_ttl_days: cfg.refresh_ttl_days,
        frontend_url: cfg.frontend_url.clone(),
    };

    // the web client runs on its own origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on http://{}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
