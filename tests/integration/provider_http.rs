//! Integration tests for the HTTP task generator against a local stub service

use crate::integration::test_utils::{fast_config, step};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use coursegen::error::ApiError;
use coursegen::generation::{
    JobStatus, Orchestrator, RequestContext, TaskGenerateRequest, TaskGenerator,
};
use coursegen::provider::{GeneratorConfig, HttpTaskGenerator};
use coursegen::types::{StepNumber, TaskKind};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Serve `app` on an ephemeral port and return its base URL.
async fn spawn_stub(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn generator_for(endpoint: String) -> HttpTaskGenerator {
    HttpTaskGenerator::new(&GeneratorConfig {
        endpoint,
        request_timeout_secs: 1,
        ..GeneratorConfig::default()
    })
    .unwrap()
}

fn request() -> TaskGenerateRequest {
    TaskGenerateRequest {
        step: StepNumber::new(1).unwrap(),
        title: "Pattern matching".to_string(),
        description: "match and if let".to_string(),
        difficulty: "beginner".to_string(),
        kind: TaskKind::Coding,
        search_keyword: "rust match".to_string(),
        videos: Vec::new(),
        previous_steps_context: Vec::new(),
        force_regenerate: false,
        id: Some("user-7".to_string()),
        lang: "en".to_string(),
    }
}

#[tokio::test]
async fn test_successful_generation_round_trip() {
    let app = Router::new().route(
        "/api/task/generate",
        post(|Json(body): Json<Value>| async move {
            Json(json!({
                "success": true,
                "task": { "type": body["type"], "title": body["title"], "user": body["id"] },
            }))
        }),
    );
    let generator = generator_for(spawn_stub(app).await);

    let response = generator.generate(request()).await.unwrap();
    assert!(response.success);
    let task = response.task.unwrap();
    assert_eq!(task["type"], "coding");
    assert_eq!(task["title"], "Pattern matching");
    assert_eq!(task["user"], "user-7");
}

#[tokio::test]
async fn test_server_errors_are_transient() {
    let app = Router::new().route(
        "/api/task/generate",
        post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
    );
    let generator = generator_for(spawn_stub(app).await);

    let err = generator.generate(request()).await.unwrap_err();
    assert!(matches!(err, ApiError::ProviderRequestFailed(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_client_errors_are_permanent() {
    let app = Router::new().route(
        "/api/task/generate",
        post(|| async { (StatusCode::UNPROCESSABLE_ENTITY, "bad step") }),
    );
    let generator = generator_for(spawn_stub(app).await);

    let err = generator.generate(request()).await.unwrap_err();
    assert!(matches!(err, ApiError::ProviderRejected(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_slow_service_times_out() {
    let app = Router::new().route(
        "/api/task/generate",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({ "success": true, "task": {} }))
        }),
    );
    let generator = generator_for(spawn_stub(app).await);

    let err = generator.generate(request()).await.unwrap_err();
    assert!(matches!(err, ApiError::Timeout(_)));
}

#[tokio::test]
async fn test_unreachable_service_is_transient() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let err = generator_for(endpoint).generate(request()).await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_orchestrator_retries_unsuccessful_responses() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let app = Router::new().route(
        "/api/task/generate",
        post(move |Json(body): Json<Value>| {
            let counter = counter.clone();
            async move {
                let call = counter.fetch_add(1, Ordering::SeqCst);
                if call == 0 {
                    Json(json!({ "success": false, "error": "model busy" }))
                } else {
                    Json(json!({ "success": true, "task": { "title": body["title"] } }))
                }
            }
        }),
    );
    let generator = Arc::new(generator_for(spawn_stub(app).await));
    let mut config = fast_config(2, 1);
    config.base_delay_ms = 10;
    let orchestrator =
        Orchestrator::new(config, generator, RequestContext::default()).unwrap();

    orchestrator.on_step_arrived(step(1, "Generics")).unwrap();
    orchestrator
        .wait_until_idle(Some(Duration::from_secs(10)))
        .await
        .unwrap();

    let number = StepNumber::new(1).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(orchestrator.queue().status_of(number), Some(JobStatus::Completed));
    assert_eq!(
        orchestrator.current_result_for(number).unwrap()["title"],
        "Generics"
    );
}
