//! Integration tests for the HTTP routes

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use coursegen::server::{app_router, AppState};
use coursegen::sessions::{ChannelSink, SessionEvent, SessionRegistry, SessionStatus};
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tower::ServiceExt;

fn test_app() -> (Router, SessionRegistry) {
    let registry = SessionRegistry::default();
    (app_router(AppState::new(registry.clone())), registry)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn register(registry: &SessionRegistry, session_id: &str) -> UnboundedReceiver<SessionEvent> {
    let (sink, rx) = ChannelSink::new();
    registry.register(session_id, Arc::new(sink), None).unwrap();
    rx
}

#[tokio::test]
async fn test_health_reports_active_sessions() {
    let (app, registry) = test_app();
    let _rx = register(&registry, "abc");

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["active_sessions"], 1);
}

#[tokio::test]
async fn test_callback_delivers_plan_to_waiting_session() {
    let (app, registry) = test_app();
    let mut rx = register(&registry, "abc");

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/plan/update",
            json!({"session_id": "abc", "plan": {"plan": [{"step": 1, "title": "Intro"}]}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["success"], true);

    assert_eq!(rx.try_recv().unwrap().event_type(), "connected");
    match rx.try_recv().unwrap() {
        SessionEvent::PlanUpdate { plan, .. } => assert_eq!(plan["plan"][0]["title"], "Intro"),
        other => panic!("expected plan_update, got {:?}", other),
    }

    let response = app.oneshot(get("/api/plan/session/abc")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "completed");
}

#[tokio::test]
async fn test_callback_for_unknown_session_is_404() {
    let (app, _registry) = test_app();
    let response = app
        .oneshot(post_json(
            "/api/plan/update",
            json!({"sessionId": "xyz", "plan": {"plan": []}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_callback_without_session_or_plan_is_400() {
    let (app, registry) = test_app();
    let _rx = register(&registry, "abc");

    let response = app
        .clone()
        .oneshot(post_json("/api/plan/update", json!({"plan": {"plan": []}})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(post_json("/api/plan/update", json!({"id": "abc"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_callback_error_fails_session() {
    let (app, registry) = test_app();
    let mut rx = register(&registry, "abc");

    let response = app
        .oneshot(post_json(
            "/api/plan/update",
            json!({"sessionId": "abc", "error": "model overloaded"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(rx.try_recv().unwrap().event_type(), "connected");
    assert_eq!(rx.try_recv().unwrap().event_type(), "error");
    assert_eq!(registry.status("abc").unwrap().status, SessionStatus::Error);
}

#[tokio::test]
async fn test_generating_marks_session() {
    let (app, registry) = test_app();
    let _rx = register(&registry, "abc");

    let response = app
        .clone()
        .oneshot(post_json("/api/plan/generating", json!({"sessionId": "abc"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        registry.status("abc").unwrap().status,
        SessionStatus::Generating
    );

    let response = app
        .oneshot(post_json("/api/plan/generating", json!({"sessionId": "nope"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_session_status_is_404() {
    let (app, _registry) = test_app();
    let response = app.oneshot(get("/api/plan/session/ghost")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stream_requires_session_id() {
    let (app, _registry) = test_app();
    let response = app.oneshot(get("/api/plan/stream")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stream_acknowledges_and_disconnects_on_drop() {
    let (app, registry) = test_app();
    let response = app
        .oneshot(get("/api/plan/stream?sessionId=live-1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .starts_with("text/event-stream"));
    assert_eq!(registry.active_count(), 1);

    let mut body = response.into_body().into_data_stream();
    let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = String::from_utf8_lossy(&chunk);
    assert!(text.starts_with("data: "));
    assert!(text.contains(r#""type":"connected""#));
    assert!(text.contains(r#""sessionId":"live-1""#));

    assert!(registry.dispatch("live-1", json!({"plan": []})));
    let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(String::from_utf8_lossy(&chunk).contains(r#""type":"plan_update""#));

    drop(body);
    assert_eq!(registry.active_count(), 0);
}
