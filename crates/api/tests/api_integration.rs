//! API integration tests.
//!
//! These tests drive the full router, auth middleware included, against a
//! mock database.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::redundant_clone)]

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    middleware::from_fn_with_state,
};
use chrono::Duration;
use pollhub_api::{
    middleware::{AppState, auth_middleware},
    router as api_router,
};
use pollhub_common::config::PollsConfig;
use pollhub_db::entities::user;
use pollhub_db::test_utils::fixtures;
use sea_orm::{DatabaseBackend, DbErr, MockDatabase, MockExecResult, RuntimeErr, Value};
use serde_json::{Value as Json, json};
use tower::ServiceExt;

/// Build the app the way the server does.
fn create_test_app(db: MockDatabase) -> Router {
    let state = AppState::new(Arc::new(db.into_connection()), &PollsConfig::default());
    Router::new()
        .nest("/api", api_router())
        .layer(from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

fn exec(rows_affected: u64) -> MockExecResult {
    MockExecResult {
        last_insert_id: 0,
        rows_affected,
    }
}

fn option_rows(rows: &[(i32, i64)]) -> Vec<BTreeMap<&'static str, Value>> {
    rows.iter()
        .map(|(option, n)| {
            maplit::btreemap! {
                "option_selected" => Value::Int(Some(*option)),
                "vote_count" => Value::BigInt(Some(*n)),
            }
        })
        .collect()
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Json>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Json {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = create_test_app(MockDatabase::new(DatabaseBackend::Postgres));

    let response = app
        .oneshot(request("GET", "/api/polls/active", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_unknown_token_is_unauthorized() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<user::Model>::new()]);
    let app = create_test_app(db);

    let response = app
        .oneshot(request("GET", "/api/polls/mine", Some("nope"), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = create_test_app(MockDatabase::new(DatabaseBackend::Postgres));

    let response = app
        .oneshot(request("GET", "/api/notes/timeline", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_global_vote_returns_tally() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[fixtures::user("u1", "alice")]])
        .append_query_results([[fixtures::global_poll("g1", "admin", Duration::minutes(30))]])
        .append_exec_results([exec(1)])
        .append_query_results([option_rows(&[(2, 1)])]);
    let app = create_test_app(db);

    let response = app
        .oneshot(request(
            "POST",
            "/api/polls/g1/vote",
            Some("token-u1"),
            Some(json!({"option_selected": 2})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["message"], "Vote recorded");
    assert_eq!(body["data"]["option_selected"], 2);
    assert_eq!(body["data"]["option2_count"], 1);
    assert_eq!(body["data"]["total_votes"], 1);
}

#[tokio::test]
async fn test_room_vote_returns_ok_with_tally() {
    let poll = pollhub_db::entities::poll::Model {
        option3: None,
        option4: None,
        ..fixtures::room_poll("p1", "room1", "admin")
    };
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[fixtures::user("u1", "alice")]])
        .append_query_results([[poll]])
        .append_query_results([[fixtures::lifecycle_active("p1", "room1", 10)]])
        .append_query_results([[maplit::btreemap! { "num_items" => Value::BigInt(Some(1)) }]])
        .append_exec_results([exec(1)])
        .append_query_results([option_rows(&[(1, 1)])]);
    let app = create_test_app(db);

    let response = app
        .oneshot(request(
            "POST",
            "/api/rooms/room1/polls/p1/vote",
            Some("token-u1"),
            Some(json!({"option_selected": 1})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["poll_id"], "p1");
    assert_eq!(body["data"]["option1_count"], 1);
    assert_eq!(body["data"]["total_votes"], 1);
}

#[tokio::test]
async fn test_vote_without_option_is_invalid_option() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[fixtures::user("u1", "alice")]]);
    let app = create_test_app(db);

    let response = app
        .oneshot(request(
            "POST",
            "/api/polls/g1/vote",
            Some("token-u1"),
            Some(json!({})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "INVALID_OPTION");
}

#[tokio::test]
async fn test_duplicate_vote_is_conflict() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[fixtures::user("u1", "alice")]])
        .append_query_results([[fixtures::global_poll("g1", "admin", Duration::minutes(30))]])
        .append_exec_errors([DbErr::Exec(RuntimeErr::Internal(
            "duplicate key value violates unique constraint \"idx_vote_poll_user\"".to_string(),
        ))]);
    let app = create_test_app(db);

    let response = app
        .oneshot(request(
            "POST",
            "/api/polls/g1/vote",
            Some("token-u1"),
            Some(json!({"option_selected": 1})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "ALREADY_VOTED");
}

#[tokio::test]
async fn test_vote_on_ended_global_poll_is_forbidden() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[fixtures::user("u1", "alice")]])
        .append_query_results([[fixtures::global_poll("g1", "admin", Duration::minutes(-1))]]);
    let app = create_test_app(db);

    let response = app
        .oneshot(request(
            "POST",
            "/api/polls/g1/vote",
            Some("token-u1"),
            Some(json!({"option_selected": 1})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "POLL_CLOSED");
}

#[tokio::test]
async fn test_results_before_end_are_forbidden() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[fixtures::user("u1", "alice")]])
        .append_query_results([[fixtures::global_poll("g1", "admin", Duration::minutes(30))]]);
    let app = create_test_app(db);

    let response = app
        .oneshot(request("GET", "/api/polls/g1/results", Some("token-u1"), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_create_global_poll_requires_admin() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[fixtures::user("u1", "alice")]]);
    let app = create_test_app(db);

    let response = app
        .oneshot(request(
            "POST",
            "/api/polls",
            Some("token-u1"),
            Some(json!({
                "question": "Lunch?",
                "option1": "Pizza",
                "option2": "Sushi",
                "end_time": "2099-01-01T00:00:00Z"
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_deletes_poll() {
    let admin = user::Model {
        is_admin: true,
        ..fixtures::user("root", "root")
    };
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[admin]])
        .append_exec_results([exec(1)]);
    let app = create_test_app(db);

    let response = app
        .oneshot(request("DELETE", "/api/polls/g1", Some("token-root"), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_start_room_poll_by_non_admin_is_forbidden() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[fixtures::user("u1", "alice")]])
        .append_query_results([[fixtures::room("room1", "owner")]]);
    let app = create_test_app(db);

    let response = app
        .oneshot(request(
            "POST",
            "/api/rooms/room1/polls/p1/start",
            Some("token-u1"),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}
