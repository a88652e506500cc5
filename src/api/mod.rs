//! Boundary API: shared state and router assembly.

pub mod fixtures;

use crate::storage::FixtureStore;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<FixtureStore>,
    pub post_token: String,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(fixtures::root))
        .route("/health", get(fixtures::health))
        .route(
            "/fixtures",
            get(fixtures::list_fixtures).post(fixtures::create_fixture),
        )
        .route("/fixtures/:fixture_id", get(fixtures::get_fixture))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
