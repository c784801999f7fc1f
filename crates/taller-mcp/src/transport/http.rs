//! Streamable HTTP (MCP 2025-03-26), JSON responses only.
//!
//! Every JSON-RPC message is a `POST /mcp`. Requests get their response in
//! the body; notifications get `202 Accepted`. A successful `initialize`
//! assigns an `Mcp-Session-Id` which later requests may echo and
//! `DELETE /mcp` ends. No server-initiated stream is offered, so
//! `GET /mcp` is `405`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use axum::{
    extract::State,
    http::{HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::Value;
use taller_protocol::methods;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{lock, serve_router};
use crate::server::{McpServer, ServerError};

pub const SESSION_HEADER: HeaderName = HeaderName::from_static("mcp-session-id");

#[derive(Clone)]
struct HttpState {
    server: McpServer,
    sessions: Arc<Mutex<HashSet<String>>>,
}

pub fn router(server: McpServer) -> Router {
    let state = HttpState {
        server,
        sessions: Arc::default(),
    };

    Router::new()
        .route("/mcp", post(handle_post).delete(handle_delete))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(
    server: McpServer,
    host: &str,
    port: u16,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    info!("Starting MCP server in streamable HTTP mode");
    serve_router(router(server), host, port, shutdown).await
}

fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers.get(&SESSION_HEADER).and_then(|v| v.to_str().ok())
}

async fn handle_post(State(state): State<HttpState>, headers: HeaderMap, body: String) -> Response {
    if let Some(id) = session_id(&headers) {
        if !lock(&state.sessions).contains(id) {
            warn!(session_id = %id, "Request for unknown HTTP session");
            return StatusCode::NOT_FOUND.into_response();
        }
    }

    debug!(request = %body, "Received HTTP request");

    let is_initialize = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("method").and_then(Value::as_str).map(str::to_owned))
        .is_some_and(|m| m == methods::INITIALIZE);

    let Some(response) = state.server.handle_message(&body).await else {
        return StatusCode::ACCEPTED.into_response();
    };

    if is_initialize && response.error.is_none() {
        let id = Uuid::new_v4().to_string();
        lock(&state.sessions).insert(id.clone());
        info!(session_id = %id, "HTTP session opened");
        return ([(SESSION_HEADER, id)], Json(response)).into_response();
    }

    Json(response).into_response()
}

async fn handle_delete(State(state): State<HttpState>, headers: HeaderMap) -> StatusCode {
    let Some(id) = session_id(&headers) else {
        return StatusCode::BAD_REQUEST;
    };

    if lock(&state.sessions).remove(id) {
        info!(session_id = %id, "HTTP session closed");
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}
