//! Boundary-level tests for the fixtures API.
//!
//! Each test drives the real router against a scratch SQLite database, the
//! same path a broker-relayed POST or a client GET takes in production.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use matchcast_backend::{
    api::{create_router, AppState},
    storage::FixtureStore,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const TOKEN: &str = "test-secret";

fn test_app() -> (Router, Arc<FixtureStore>, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("fixtures.db");
    let store = Arc::new(FixtureStore::new(path.to_str().unwrap()).expect("store"));
    let app = create_router(AppState {
        store: store.clone(),
        post_token: TOKEN.to_string(),
    });
    (app, store, dir)
}

fn sample_fixture(fixture_id: i64, home: &str, away: &str, date: &str, odds: Value) -> Value {
    json!({
        "fixture": {
            "id": fixture_id,
            "referee": "M. Oliver",
            "timezone": "UTC",
            "date": date,
            "timestamp": 1704121200,
            "status": {"long": "Not Started", "short": "NS", "elapsed": null}
        },
        "league": {
            "id": 39,
            "name": "Premier League",
            "country": "England",
            "logo": "https://media.example/leagues/39.png",
            "flag": "https://media.example/flags/gb.svg",
            "season": 2023,
            "round": "Regular Season - 20"
        },
        "teams": {
            "home": {"id": 42, "name": home, "logo": "https://media.example/teams/42.png", "winner": null},
            "away": {"id": 50, "name": away, "logo": "https://media.example/teams/50.png", "winner": null}
        },
        "goals": {"home": null, "away": null},
        "odds": odds
    })
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    }
}

async fn post_fixture(app: &Router, body: &Value, token: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/fixtures")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = builder.body(Body::from(body.to_string())).expect("request");

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    (status, read_json(response).await)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    (status, read_json(response).await)
}

#[tokio::test]
async fn post_without_token_is_forbidden_and_writes_nothing() {
    let (app, _store, _dir) = test_app();

    let body = sample_fixture(100, "Arsenal", "Chelsea", "2024-01-01T15:00:00+00:00", json!([]));
    let (status, error) = post_fixture(&app, &body, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error["error"], "FORBIDDEN");

    let (status, listed) = get(&app, "/fixtures").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed, json!([]));
}

#[tokio::test]
async fn post_with_wrong_token_is_forbidden() {
    let (app, _store, _dir) = test_app();

    let body = sample_fixture(100, "Arsenal", "Chelsea", "2024-01-01T15:00:00+00:00", json!([]));
    let (status, _) = post_fixture(&app, &body, Some("not-the-secret")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, listed) = get(&app, "/fixtures").await;
    assert_eq!(listed, json!([]));
}

#[tokio::test]
async fn replace_is_total_and_visible_through_get() {
    let (app, _store, _dir) = test_app();

    let first = sample_fixture(
        100,
        "Arsenal",
        "Chelsea",
        "2024-01-01T15:00:00+00:00",
        json!([{"id": 1, "name": "Match Winner", "values": [{"value": "Home", "odd": 1.45}]}]),
    );
    let (status, created) = post_fixture(&app, &first, Some(TOKEN)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(created["last_updated"].is_string());

    let (status, fetched) = get(&app, "/fixtures/100").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["odds"][0]["id"], 1);
    assert_eq!(fetched["odds"][0]["values"][0]["value"], "Home");

    let second = sample_fixture(
        100,
        "Arsenal",
        "Chelsea",
        "2024-01-01T15:00:00+00:00",
        json!([
            {"id": 5, "name": "Over/Under", "values": [
                {"value": "Over 2.5", "odd": 1.9},
                {"value": "Under 2.5", "odd": 1.9}
            ]}
        ]),
    );
    let (status, _) = post_fixture(&app, &second, Some(TOKEN)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, replaced) = get(&app, "/fixtures/100").await;
    let odds = replaced["odds"].as_array().expect("odds array");
    assert_eq!(odds.len(), 1);
    assert_eq!(odds[0]["id"], 5);
    assert_eq!(odds[0]["values"].as_array().unwrap().len(), 2);

    let (_, listed) = get(&app, "/fixtures").await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn get_unknown_fixture_is_404() {
    let (app, _store, _dir) = test_app();
    let (status, error) = get(&app, "/fixtures/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["error"], "NOT_FOUND");
}

#[tokio::test]
async fn malformed_body_is_rejected_as_validation_error() {
    let (app, _store, _dir) = test_app();

    let mut body = sample_fixture(100, "Arsenal", "Chelsea", "2024-01-01T15:00:00+00:00", json!([]));
    body["fixture"]["date"] = json!("not-a-date");

    let (status, error) = post_fixture(&app, &body, Some(TOKEN)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"], "VALIDATION_ERROR");

    let (_, listed) = get(&app, "/fixtures").await;
    assert_eq!(listed, json!([]));
}

#[tokio::test]
async fn duplicate_odds_are_rejected_as_constraint_violation() {
    let (app, _store, _dir) = test_app();

    let body = sample_fixture(
        100,
        "Arsenal",
        "Chelsea",
        "2024-01-01T15:00:00+00:00",
        json!([
            {"id": 1, "name": "Match Winner", "values": [{"value": "Home", "odd": 1.45}]},
            {"id": 1, "name": "Match Winner", "values": [{"value": "Away", "odd": 6.5}]}
        ]),
    );
    let (status, error) = post_fixture(&app, &body, Some(TOKEN)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"], "CONSTRAINT_VIOLATION");

    let (_, listed) = get(&app, "/fixtures").await;
    assert_eq!(listed, json!([]));
}

#[tokio::test]
async fn list_paginates_newest_first() {
    let (app, _store, _dir) = test_app();

    for i in 1..=12 {
        let body = sample_fixture(
            i,
            "Arsenal",
            "Chelsea",
            "2024-01-01T15:00:00+00:00",
            json!([]),
        );
        let (status, _) = post_fixture(&app, &body, Some(TOKEN)).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, page0) = get(&app, "/fixtures?page=0&count=10").await;
    let page0 = page0.as_array().expect("page 0");
    assert_eq!(page0.len(), 10);
    assert_eq!(page0[0]["fixture"]["id"], 12);

    let (_, page1) = get(&app, "/fixtures?page=1&count=10").await;
    let ids: Vec<i64> = page1
        .as_array()
        .expect("page 1")
        .iter()
        .map(|d| d["fixture"]["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![2, 1]);

    let (_, page2) = get(&app, "/fixtures?page=2&count=10").await;
    assert_eq!(page2, json!([]));
}

#[tokio::test]
async fn list_filters_are_anded() {
    let (app, _store, _dir) = test_app();

    let fixtures = [
        (1, "Arsenal", "Chelsea", "2024-01-01T12:30:00+00:00"),
        (2, "Arsenal", "Liverpool", "2024-01-01T19:45:00+00:00"),
        (3, "Arsenal", "Chelsea", "2024-01-02T15:00:00+00:00"),
        (4, "Fulham", "Chelsea", "2024-01-01T15:00:00+00:00"),
    ];
    for (id, home, away, date) in fixtures {
        let (status, _) =
            post_fixture(&app, &sample_fixture(id, home, away, date, json!([])), Some(TOKEN))
                .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, by_home) = get(&app, "/fixtures?home=Arsenal").await;
    assert_eq!(by_home.as_array().unwrap().len(), 3);

    // Calendar-day match ignores time-of-day.
    let (_, by_home_and_date) = get(&app, "/fixtures?home=Arsenal&date=2024-01-01").await;
    let ids: Vec<i64> = by_home_and_date
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["fixture"]["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&1) && ids.contains(&2));

    let (_, narrowed) = get(&app, "/fixtures?home=Arsenal&away=Chelsea&date=2024-01-01").await;
    let narrowed = narrowed.as_array().unwrap();
    assert_eq!(narrowed.len(), 1);
    assert_eq!(narrowed[0]["fixture"]["id"], 1);
}

#[tokio::test]
async fn invalid_date_filter_is_a_validation_error() {
    let (app, _store, _dir) = test_app();
    let (status, error) = get(&app, "/fixtures?date=January-1st").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn root_redirects_to_fixtures() {
    let (app, _store, _dir) = test_app();

    let request = Request::builder()
        .uri("/")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "/fixtures"
    );
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let (app, _store, _dir) = test_app();
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
