//! Matchcast API server: the fixture replacement engine behind the HTTP
//! boundary.

use anyhow::{Context, Result};
use matchcast_backend::{
    api::{self, AppState},
    models::Config,
    storage::FixtureStore,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("🚀 Matchcast fixtures API starting");

    let config = Config::from_env()?;

    let store = Arc::new(FixtureStore::new(&config.database_path)?);

    let state = AppState {
        store,
        post_token: config.post_token.clone(),
    };
    let app = api::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("🎯 fixtures API listening on {addr}");

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "matchcast_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
