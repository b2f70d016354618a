//! HTTP end-to-end tests.
//!
//! Drives the router in-process with `tower::ServiceExt::oneshot` over a
//! file-backed database:
//! - Id generation and user create/read/delete round trips
//! - Problem responses for missing, malformed and conflicting requests
//! - Question routes per kind

#![allow(clippy::expect_used, clippy::unwrap_used)]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use nova::cache::DataCache;
use nova::http::{AppState, router};
use nova::models::{PROBLEM_JSON, ProblemDetails};
use nova::storage::schema;
use nova::storage::sqlite::{Context, Database, DatabaseConfig};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    _dir: TempDir,
    app: Router,
}

async fn app() -> TestApp {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("http.db");
    let db = Database::open(path.to_str().unwrap(), DatabaseConfig::default()).unwrap();
    schema::migrate(&db, &Context::background()).await.unwrap();
    let state = AppState::new(Arc::new(db), DataCache::default());
    TestApp {
        _dir: dir,
        app: router(state),
    }
}

struct Reply {
    status: StatusCode,
    content_type: Option<String>,
    body: Vec<u8>,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    fn problem(&self) -> ProblemDetails {
        assert_eq!(self.content_type.as_deref(), Some(PROBLEM_JSON));
        serde_json::from_slice(&self.body).unwrap()
    }
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Reply {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    Reply {
        status,
        content_type,
        body,
    }
}

fn is_uuid(value: &str) -> bool {
    value.len() == 36
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c) || c == '-')
}

fn alice(id: &str) -> Value {
    json!({
        "userId": id,
        "username": "Alice",
        "password": "p4ssw0rd",
        "phone_number": "12345678901",
        "email": "alice@gmail.com",
        "address": "No.5, Wall Street, New York, USA",
        "company": "Apple Inc."
    })
}

async fn new_user_id(app: &Router) -> String {
    let reply = send(app, Method::POST, "/nova/v1/user/userId", None).await;
    reply.json().as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_hello() {
    let t = app().await;
    let reply = send(&t.app, Method::GET, "/nova/v1/test", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, b"hello Nova");
}

#[tokio::test]
async fn test_create_user_id() {
    let t = app().await;
    let reply = send(&t.app, Method::POST, "/nova/v1/user/userId", None).await;

    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.content_type.as_deref(), Some("application/json"));
    let id = reply.json();
    assert!(is_uuid(id.as_str().unwrap()), "id = {id}");
}

#[tokio::test]
async fn test_create_and_read_back_user() {
    let t = app().await;
    let id = new_user_id(&t.app).await;
    let uri = format!("/nova/v1/user/{id}");

    let created = send(&t.app, Method::POST, &uri, Some(alice(&id))).await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.json(), alice(&id));

    let read = send(&t.app, Method::GET, &uri, None).await;
    assert_eq!(read.status, StatusCode::OK);
    assert_eq!(read.json(), alice(&id));

    let lookup = send(
        &t.app,
        Method::GET,
        "/nova/v1/user/userId",
        Some(json!({"username": "Alice"})),
    )
    .await;
    assert_eq!(lookup.status, StatusCode::OK);
    assert_eq!(lookup.json(), json!(id));
}

#[tokio::test]
async fn test_delete_then_not_found() {
    let t = app().await;
    let id = new_user_id(&t.app).await;
    let uri = format!("/nova/v1/user/{id}");
    send(&t.app, Method::POST, &uri, Some(alice(&id))).await;

    let deleted = send(&t.app, Method::DELETE, &uri, None).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    assert!(deleted.body.is_empty());

    let missing = send(&t.app, Method::GET, &uri, None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    let problem = missing.problem();
    assert_eq!(problem.status, 404);
    assert_eq!(problem.title, "Not Found");
    assert_eq!(problem.kind, "Client Error");
}

#[tokio::test]
async fn test_duplicate_create_conflicts() {
    let t = app().await;
    let id = new_user_id(&t.app).await;
    let uri = format!("/nova/v1/user/{id}");
    send(&t.app, Method::POST, &uri, Some(alice(&id))).await;

    let again = send(&t.app, Method::POST, &uri, Some(alice(&id))).await;
    assert_eq!(again.status, StatusCode::CONFLICT);
    assert_eq!(again.problem().status, 409);
}

#[tokio::test]
async fn test_bad_requests_are_problems() {
    let t = app().await;
    let id = new_user_id(&t.app).await;
    let uri = format!("/nova/v1/user/{id}");

    let missing_field = send(&t.app, Method::POST, &uri, Some(json!({"userId": id}))).await;
    assert_eq!(missing_field.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing_field.problem().title, "Bad Request");

    let other = new_user_id(&t.app).await;
    let mismatched = send(&t.app, Method::POST, &uri, Some(alice(&other))).await;
    assert_eq!(mismatched.status, StatusCode::BAD_REQUEST);

    let bad_id = send(&t.app, Method::GET, "/nova/v1/user/not-a-uuid", None).await;
    assert_eq!(bad_id.status, StatusCode::BAD_REQUEST);

    let no_route = send(&t.app, Method::GET, "/nova/v2/anything", None).await;
    assert_eq!(no_route.status, StatusCode::NOT_FOUND);
    assert_eq!(no_route.problem().status, 404);
}

#[tokio::test]
async fn test_put_and_patch_user() {
    let t = app().await;
    let id = new_user_id(&t.app).await;
    let uri = format!("/nova/v1/user/{id}");

    let missing = send(&t.app, Method::PUT, &uri, Some(alice(&id))).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    send(&t.app, Method::POST, &uri, Some(alice(&id))).await;
    let mut replacement = alice(&id);
    replacement["company"] = json!("Banana Corp.");
    let replaced = send(&t.app, Method::PUT, &uri, Some(replacement.clone())).await;
    assert_eq!(replaced.status, StatusCode::OK);
    assert_eq!(replaced.json(), replacement);

    let patched = send(
        &t.app,
        Method::PATCH,
        &uri,
        Some(json!({"email": "alice@example.com", "address": ""})),
    )
    .await;
    assert_eq!(patched.status, StatusCode::OK);
    let body = patched.json();
    assert_eq!(body["email"], "alice@example.com");
    assert_eq!(body["address"], "No.5, Wall Street, New York, USA");
    assert_eq!(body["company"], "Banana Corp.");
}

#[tokio::test]
async fn test_question_routes() {
    let t = app().await;
    let reply = send(&t.app, Method::POST, "/nova/v1/question/questionId", None).await;
    assert_eq!(reply.status, StatusCode::CREATED);
    let id = reply.json().as_str().unwrap().to_string();
    let uri = format!("/nova/v1/question/multiple-choice/{id}");

    let question = json!({
        "id": id,
        "title": "Which are primes?",
        "answers": [
            {"answerMark": "A", "answerText": "2"},
            {"answerMark": "B", "answerText": "4"},
            {"answerMark": "C", "answerText": "5"}
        ],
        "standard_answers": [
            {"answerMark": "A", "answerText": "2"},
            {"answerMark": "C", "answerText": "5"}
        ]
    });
    let created = send(&t.app, Method::POST, &uri, Some(question.clone())).await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.json(), question);

    let read = send(&t.app, Method::GET, &uri, None).await;
    assert_eq!(read.json(), question);

    let wrong_kind = send(
        &t.app,
        Method::GET,
        &format!("/nova/v1/question/essay/{id}"),
        None,
    )
    .await;
    assert_eq!(wrong_kind.status, StatusCode::NOT_FOUND);

    let unknown_kind = send(
        &t.app,
        Method::GET,
        &format!("/nova/v1/question/riddle/{id}"),
        None,
    )
    .await;
    assert_eq!(unknown_kind.status, StatusCode::NOT_FOUND);

    let patched = send(
        &t.app,
        Method::PATCH,
        &uri,
        Some(json!({"title": "Pick the primes"})),
    )
    .await;
    assert_eq!(patched.status, StatusCode::OK);
    assert_eq!(patched.json()["title"], "Pick the primes");

    let deleted = send(&t.app, Method::DELETE, &uri, None).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    let gone = send(&t.app, Method::GET, &uri, None).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unoffered_standard_answer_is_expectation_failed() {
    let t = app().await;
    let id = nova::services::new_id();
    let reply = send(
        &t.app,
        Method::POST,
        &format!("/nova/v1/question/single-choice/{id}"),
        Some(json!({
            "id": id,
            "title": "2 + 2?",
            "answers": [{"answerMark": "A", "answerText": "4"}],
            "standard_answer": {"answerMark": "B", "answerText": "5"}
        })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::EXPECTATION_FAILED);
    assert_eq!(reply.problem().title, "Expectation Failed");
}
