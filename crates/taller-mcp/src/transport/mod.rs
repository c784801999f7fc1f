//! Transports carrying JSON-RPC to [`McpServer`](crate::server::McpServer).

pub mod http;
pub mod sse;
pub mod stdio;

use std::sync::{Mutex, MutexGuard, PoisonError};

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::server::ServerError;

/// Bind `host:port` and serve `router` until `shutdown` fires.
pub async fn serve_router(
    router: Router,
    host: &str,
    port: u16,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ServerError::BindFailed(format!("{}: {}", addr, e)))?;

    let local = listener
        .local_addr()
        .map_err(|e| ServerError::BindFailed(e.to_string()))?;
    info!(address = %local, "Listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| ServerError::WriteFailed(e.to_string()))
}

/// Session tables are never left inconsistent by a panicking holder.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
