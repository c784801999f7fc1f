//! Newline-delimited JSON-RPC over stdin/stdout.
//!
//! Each line is handled on its own task so a tool blocked on authorization
//! does not stall `ping` or `tools/list`. Responses are funneled through a
//! single writer task, one JSON document per line.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::server::{McpServer, ServerError};

/// Serve on the process's stdin and stdout until EOF or shutdown.
pub async fn run(server: McpServer, shutdown: CancellationToken) -> Result<(), ServerError> {
    info!("Starting MCP server in STDIO mode");
    serve(server, tokio::io::stdin(), tokio::io::stdout(), shutdown).await
}

pub async fn serve<R, W>(
    server: McpServer,
    input: R,
    mut output: W,
    shutdown: CancellationToken,
) -> Result<(), ServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<String>(64);

    let writer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            debug!(response = %line, "Sending STDIO response");
            output
                .write_all(line.as_bytes())
                .await
                .map_err(|e| ServerError::WriteFailed(e.to_string()))?;
            output
                .write_all(b"\n")
                .await
                .map_err(|e| ServerError::WriteFailed(e.to_string()))?;
            output
                .flush()
                .await
                .map_err(|e| ServerError::WriteFailed(e.to_string()))?;
        }
        Ok::<(), ServerError>(())
    });

    let mut reader = BufReader::new(input);
    let mut line = String::new();

    loop {
        line.clear();
        let read = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutdown requested, closing STDIO transport");
                break;
            }
            read = reader.read_line(&mut line) => read,
        };

        match read {
            Ok(0) => {
                debug!("EOF received, shutting down");
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                debug!(request = %trimmed, "Received STDIO request");

                let server = server.clone();
                let tx = tx.clone();
                let message = trimmed.to_string();
                tokio::spawn(async move {
                    let Some(response) = server.handle_message(&message).await else {
                        return;
                    };
                    match serde_json::to_string(&response) {
                        Ok(json) => {
                            let _ = tx.send(json).await;
                        }
                        Err(e) => error!(error = %e, "Failed to serialize response"),
                    }
                });
            }
            Err(e) => {
                error!(error = %e, "Error reading from stdin");
                drop(tx);
                let _ = writer.await;
                return Err(ServerError::ReadFailed(e.to_string()));
            }
        }
    }

    // In-flight requests keep their sender clones; the writer drains them.
    drop(tx);
    match writer.await {
        Ok(result) => result,
        Err(e) => Err(ServerError::WriteFailed(e.to_string())),
    }
}
