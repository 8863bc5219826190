mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use cato_functions::http::router;
use cato_functions::{MemoryStore, ProjectRecord};
use common::{assert_eq, deploy, memory_dispatcher};
use http_body_util::BodyExt;
use rstest::rstest;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const MAX_BODY: usize = 1024;

fn app(source: &str) -> (Router, ProjectRecord, Arc<MemoryStore>) {
    let (store, dispatcher) = memory_dispatcher();
    let project = deploy(&*store, source);
    (router(dispatcher, MAX_BODY), project, store)
}

async fn post(app: Router, uri: &str, body: impl Into<Body>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[rstest]
#[case("/functions")]
#[case("/api/run-function")]
#[tokio::test]
async fn test_invoke_routes(#[case] prefix: &str) {
    let (app, project, _store) = app("print('hi')\nresponse = {'got': request.get('x')}");
    let uri = format!("{}/{}", prefix, project.public_id());

    let (status, body) = post(app, &uri, r#"{"x": 5}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"result": {"got": 5}, "logs": "hi\n"}));
}

#[tokio::test]
async fn test_empty_body_is_empty_payload() {
    let (app, project, _store) = app("response = len(request)");
    let uri = format!("/functions/{}", project.public_id());

    let (status, body) = post(app, &uri, Body::empty()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"result": 0, "logs": ""}));
}

#[tokio::test]
async fn test_absent_response_is_null() {
    let (app, project, _store) = app("x = 1");
    let uri = format!("/functions/{}", project.public_id());

    let (_, body) = post(app, &uri, "{}").await;
    assert_eq!(body, json!({"result": null, "logs": ""}));
}

#[tokio::test]
async fn test_unknown_project_is_404() {
    let (app, _project, _store) = app("response = 1");

    let (status, body) = post(app, "/api/run-function/nope", "{}").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body,
        json!({"error": "Project not found. Make sure to deploy your project first."})
    );
}

#[rstest]
#[case("response = 1 +", StatusCode::BAD_REQUEST)]
#[case("response = undefined_name", StatusCode::BAD_REQUEST)]
#[case("import os", StatusCode::BAD_REQUEST)]
#[case("def f(n):\n    return f(n + 1)\nf(0)", StatusCode::TOO_MANY_REQUESTS)]
#[tokio::test]
async fn test_script_failures(#[case] source: &str, #[case] expected: StatusCode) {
    let (app, project, _store) = app(source);
    let uri = format!("/functions/{}", project.public_id());

    let (status, body) = post(app, &uri, "{}").await;

    assert_eq!(status, expected);
    assert!(body["error"].is_string(), "body: {}", body);
}

#[tokio::test]
async fn test_runtime_error_body() {
    let (app, project, _store) = app("x = 1\ny = x / 0");
    let uri = format!("/functions/{}", project.public_id());

    let (status, body) = post(app, &uri, "{}").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({"error": "ZeroDivisionError: division by zero (line 2)"})
    );
}

#[rstest]
#[case("{not json")]
#[case("[1, 2, 3]")]
#[tokio::test]
async fn test_bad_payload(#[case] body: &'static str) {
    let (app, project, _store) = app("response = 1");
    let uri = format!("/functions/{}", project.public_id());

    let (status, _) = post(app, &uri, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let (app, project, _store) = app("response = 1");
    let uri = format!("/functions/{}", project.public_id());
    let big = format!(r#"{{"blob": "{}"}}"#, "x".repeat(MAX_BODY * 2));

    let (status, _) = post(app, &uri, big).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_visits_over_http() {
    let (app, project, _store) = app(
        "visits = int(db.get('visits') or 0) + 1\ndb.set('visits', str(visits))\nresponse = {'total_visits': visits}",
    );
    let uri = format!("/api/run-function/{}", project.public_id());

    let (_, first) = post(app.clone(), &uri, "{}").await;
    let (_, second) = post(app, &uri, "{}").await;

    assert_eq!(first["result"]["total_visits"], json!(1));
    assert_eq!(second["result"]["total_visits"], json!(2));
}

#[tokio::test]
async fn test_health() {
    let (app, _project, _store) = app("response = 1");
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], json!("ok"));
}

#[tokio::test]
async fn test_get_on_function_route_is_not_allowed() {
    let (app, project, _store) = app("response = 1");
    let request = Request::builder()
        .uri(format!("/functions/{}", project.public_id()))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
