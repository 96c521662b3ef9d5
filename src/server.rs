//! HTTP surface: the SSE delivery channel for waiting clients, the callback
//! endpoint the plan generator posts to, and diagnostics.

use crate::error::ApiError;
use crate::sessions::{
    spawn_sweeper, ChannelSink, ConnectionId, SessionRegistry, SessionSnapshot,
};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

const KEEP_ALIVE_SECS: u64 = 15;

#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
}

impl AppState {
    pub fn new(registry: SessionRegistry) -> Self {
        Self { registry }
    }
}

/// JSON error response `{ "error": message }`
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<ApiError> for HttpError {
    fn from(err: ApiError) -> Self {
        let status = match &err {
            ApiError::SessionNotFound(_) | ApiError::StepNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::SessionClosed(_) => StatusCode::GONE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/plan/stream", get(plan_stream))
        .route("/api/plan/update", post(plan_update))
        .route("/api/plan/generating", post(plan_generating))
        .route("/api/plan/session/{id}", get(session_status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until ctrl-c, sweeping sessions in the background.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let sweeper = spawn_sweeper(state.registry.clone());
    let registry = state.registry.clone();
    let app = app_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Listening");
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_err() {
                futures::future::pending::<()>().await;
            }
        })
        .await;
    sweeper.abort();
    let closed = registry.close_all();
    info!(closed, "Server stopped");
    result?;
    Ok(())
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "active_sessions": state.registry.active_count(),
    }))
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    #[serde(rename = "sessionId", alias = "session_id")]
    session_id: Option<String>,
    #[serde(default, rename = "userId", alias = "user_id")]
    user_id: Option<String>,
}

/// Removes the session when the client's stream is dropped.
struct DisconnectGuard {
    registry: SessionRegistry,
    session_id: String,
    connection_id: ConnectionId,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.registry.disconnect(&self.session_id, self.connection_id);
    }
}

async fn plan_stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, HttpError> {
    let session_id = query
        .session_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| HttpError::bad_request("sessionId is required"))?;

    let (sink, rx) = ChannelSink::new();
    let connection_id = state
        .registry
        .register(&session_id, Arc::new(sink), query.user_id)?;
    let guard = DisconnectGuard {
        registry: state.registry.clone(),
        session_id,
        connection_id,
    };

    let stream = UnboundedReceiverStream::new(rx).map(move |event| {
        let _held = &guard;
        let payload = serde_json::to_string(&event).unwrap_or_default();
        Ok(Event::default().data(payload))
    });
    Ok(Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(KEEP_ALIVE_SECS))))
}

/// Session id under any of the field names producers use.
fn callback_session_id(body: &Value) -> Option<String> {
    ["sessionId", "session_id", "id"]
        .iter()
        .filter_map(|key| body.get(*key))
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn callback_error(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::Null => None,
        Value::String(message) => Some(message.clone()),
        other => Some(other.to_string()),
    }
}

async fn plan_update(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, HttpError> {
    let session_id = callback_session_id(&body)
        .ok_or_else(|| HttpError::bad_request("Session ID required"))?;

    let delivered = if let Some(reason) = callback_error(&body) {
        state.registry.fail(&session_id, &reason)
    } else {
        let plan = body
            .get("plan")
            .filter(|plan| !plan.is_null())
            .cloned()
            .ok_or_else(|| HttpError::bad_request("Session ID and plan required"))?;
        state.registry.dispatch(&session_id, plan)
    };

    if !delivered {
        warn!(session_id = %session_id, "Plan update for unknown or expired session");
        return Err(ApiError::SessionNotFound(session_id).into());
    }
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct GeneratingBody {
    #[serde(rename = "sessionId", alias = "session_id", alias = "id")]
    session_id: String,
}

async fn plan_generating(
    State(state): State<AppState>,
    Json(body): Json<GeneratingBody>,
) -> Result<Json<Value>, HttpError> {
    if !state.registry.mark_generating(&body.session_id) {
        return Err(ApiError::SessionNotFound(body.session_id).into());
    }
    Ok(Json(json!({ "success": true })))
}

async fn session_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, HttpError> {
    state
        .registry
        .status(&id)
        .map(Json)
        .ok_or_else(|| ApiError::SessionNotFound(id).into())
}
