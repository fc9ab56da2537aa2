mod auth;
mod config;
mod db;
mod entities;
mod error;
mod kinopoisk;
mod models;
mod permissions;
mod query;
mod routes;
mod store;
mod sync;

use std::{sync::Arc, time::Duration};

use sea_orm::DatabaseConnection;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{config::Config, kinopoisk::KinopoiskClient, store::CatalogStore, sync::Synchronizer};

pub struct AppState {
    pub db: DatabaseConnection,
    pub synchronizer: Arc<Synchronizer>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,kinoteka=debug,sqlx=warn".to_string()),
        )
        .init();

    let config = Config::from_env()?;
    tracing::debug!(?config, "configuration loaded");

    let http = reqwest::Client::builder()
        .user_agent("kinoteka/0.1")
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()?;

    let db = db::connect_and_migrate(&config.database_url).await?;

    if let Some(token) = &config.bootstrap_admin_token {
        auth::ensure_bootstrap_admin(&db, token).await?;
    }

    let kinopoisk = KinopoiskClient::new(
        http,
        config.kinopoisk_api_key.clone(),
        config.kinopoisk_base_url_v1.clone(),
        config.kinopoisk_base_url_v2.clone(),
        config.kinopoisk_rps,
    );
    let synchronizer =
        Synchronizer::new(Arc::new(kinopoisk), CatalogStore::new(db.clone()), config.sync_max_concurrent);

    let state = Arc::new(AppState { db, synchronizer: Arc::new(synchronizer) });

    let app = routes::router(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any).allow_methods(Any))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
