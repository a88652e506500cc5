//! Fixture routes: filtered listing, by-id lookup and the token-gated
//! replacement endpoint fed by the broker relay.

use crate::api::AppState;
use crate::error::ApiError;
use crate::models::FixtureDetails;
use crate::storage::ListFilters;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Redirect,
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub count: Option<u32>,
    pub home: Option<String>,
    pub away: Option<String>,
    pub date: Option<String>,
}

pub async fn root() -> Redirect {
    Redirect::temporary("/fixtures")
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

pub async fn list_fixtures(
    Query(params): Query<ListQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<FixtureDetails>>, ApiError> {
    let date = params
        .date
        .as_deref()
        .map(|raw| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                ApiError::Validation(format!("invalid date filter {raw:?}, expected YYYY-MM-DD"))
            })
        })
        .transpose()?;

    let filters = ListFilters {
        home: params.home,
        away: params.away,
        date,
    };
    let page = params.page.unwrap_or(0);
    let count = params.count.unwrap_or(25);

    Ok(Json(state.store.list(&filters, page, count)?))
}

pub async fn get_fixture(
    Path(fixture_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<FixtureDetails>, ApiError> {
    Ok(Json(state.store.get(fixture_id)?))
}

pub async fn create_fixture(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<FixtureDetails>, JsonRejection>,
) -> Result<(StatusCode, Json<FixtureDetails>), ApiError> {
    verify_post_token(&headers, &state.post_token)?;

    let Json(graph) = body.map_err(|rejection| ApiError::Validation(rejection.body_text()))?;

    let committed = state.store.replace(&graph)?;
    info!("replaced fixture {}", committed.fixture.id);

    Ok((StatusCode::CREATED, Json(committed)))
}

/// Exact match against the static shared secret; anything else is a 403
/// before the store is touched.
fn verify_post_token(headers: &HeaderMap, token: &str) -> Result<(), ApiError> {
    let expected = format!("Bearer {token}");
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if provided != Some(expected.as_str()) {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}
