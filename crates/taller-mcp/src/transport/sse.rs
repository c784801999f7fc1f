//! HTTP with Server-Sent Events (MCP 2024-11-05).
//!
//! A client opens `GET /sse` and is told, in the first `endpoint` event,
//! where to POST its messages. Responses come back on the event stream as
//! `message` events. A session lives exactly as long as its stream.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{lock, serve_router};
use crate::server::{McpServer, ServerError};

type Sessions = Arc<Mutex<HashMap<Uuid, mpsc::Sender<Event>>>>;

#[derive(Clone)]
struct SseState {
    server: McpServer,
    sessions: Sessions,
    shutdown: CancellationToken,
}

/// Removes its session when the event stream is dropped.
struct SessionGuard {
    id: Uuid,
    sessions: Sessions,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        lock(&self.sessions).remove(&self.id);
        info!(session_id = %self.id, "SSE session closed");
    }
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    session_id: Uuid,
}

pub fn router(server: McpServer, shutdown: CancellationToken) -> Router {
    let state = SseState {
        server,
        sessions: Sessions::default(),
        shutdown,
    };

    Router::new()
        .route("/sse", get(open_stream))
        .route("/messages/", post(post_message))
        .route("/messages", post(post_message))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(
    server: McpServer,
    host: &str,
    port: u16,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    info!("Starting MCP server in SSE mode");
    serve_router(router(server, shutdown.clone()), host, port, shutdown).await
}

async fn open_stream(
    State(state): State<SseState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = Uuid::new_v4();
    let (tx, rx) = mpsc::channel::<Event>(64);
    lock(&state.sessions).insert(session_id, tx);
    info!(%session_id, "SSE session opened");

    let guard = SessionGuard {
        id: session_id,
        sessions: state.sessions.clone(),
    };
    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/messages/?session_id={}", session_id));

    // Streams end on shutdown so graceful shutdown is not held open.
    let stream = stream::once(async move { endpoint })
        .chain(ReceiverStream::new(rx))
        .map(move |event| {
            let _session = &guard;
            Ok::<_, Infallible>(event)
        })
        .take_until(state.shutdown.clone().cancelled_owned());

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn post_message(
    State(state): State<SseState>,
    Query(query): Query<SessionQuery>,
    body: String,
) -> StatusCode {
    let Some(tx) = lock(&state.sessions).get(&query.session_id).cloned() else {
        warn!(session_id = %query.session_id, "Message for unknown SSE session");
        return StatusCode::NOT_FOUND;
    };

    debug!(session_id = %query.session_id, request = %body, "Received SSE message");

    let server = state.server.clone();
    tokio::spawn(async move {
        let Some(response) = server.handle_message(&body).await else {
            return;
        };
        match serde_json::to_string(&response) {
            Ok(json) => {
                if tx.send(Event::default().event("message").data(json)).await.is_err() {
                    debug!("SSE session closed before response was delivered");
                }
            }
            Err(e) => error!(error = %e, "Failed to serialize response"),
        }
    });

    StatusCode::ACCEPTED
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::tests::test_server;
    use axum::body::{Body, BodyDataStream};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn next_frame(body: &mut BodyDataStream) -> Option<String> {
        let chunk = body.next().await?.unwrap();
        Some(String::from_utf8(chunk.to_vec()).unwrap())
    }

    async fn open(app: &Router) -> BodyDataStream {
        let response = app
            .clone()
            .oneshot(Request::get("/sse").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "text/event-stream"
        );
        response.into_body().into_data_stream()
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_first_event_is_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_server(dir.path()), CancellationToken::new());

        let mut stream = open(&app).await;
        let frame = next_frame(&mut stream).await.unwrap();

        assert!(frame.starts_with("event: endpoint\n"));
        assert!(frame.contains("data: /messages/?session_id="));
    }

    #[tokio::test]
    async fn test_response_arrives_as_message_event() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_server(dir.path()), CancellationToken::new());

        let mut stream = open(&app).await;
        let frame = next_frame(&mut stream).await.unwrap();
        let endpoint = frame
            .lines()
            .find_map(|l| l.strip_prefix("data: "))
            .unwrap()
            .to_string();

        let response = app
            .clone()
            .oneshot(post(&endpoint, r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let frame = next_frame(&mut stream).await.unwrap();
        assert!(frame.starts_with("event: message\n"));
        let data = frame.lines().find_map(|l| l.strip_prefix("data: ")).unwrap();
        let message: serde_json::Value = serde_json::from_str(data).unwrap();
        assert_eq!(message["id"], 1);
        assert_eq!(message["result"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_server(dir.path()), CancellationToken::new());

        let uri = format!("/messages/?session_id={}", Uuid::new_v4());
        let response = app
            .oneshot(post(&uri, r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_dropped_stream_ends_session() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_server(dir.path()), CancellationToken::new());

        let mut stream = open(&app).await;
        let frame = next_frame(&mut stream).await.unwrap();
        let endpoint = frame
            .lines()
            .find_map(|l| l.strip_prefix("data: "))
            .unwrap()
            .to_string();
        drop(stream);

        let response = app
            .oneshot(post(&endpoint, r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_shutdown_ends_stream() {
        let dir = tempfile::tempdir().unwrap();
        let shutdown = CancellationToken::new();
        let app = router(test_server(dir.path()), shutdown.clone());

        let mut stream = open(&app).await;
        next_frame(&mut stream).await.unwrap();
        shutdown.cancel();

        assert!(next_frame(&mut stream).await.is_none());
    }
}
