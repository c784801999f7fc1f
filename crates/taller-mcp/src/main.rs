mod server;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use taller_core::{Config, CredentialManager, ToolRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use server::McpServer;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Transport {
    Stdio,
    Sse,
    StreamableHttp,
}

#[derive(Parser, Debug)]
#[command(name = "taller-mcp", version, about)]
struct Args {
    #[arg(long, value_enum, default_value_t = Transport::Sse)]
    transport: Transport,

    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, default_value_t = 7000)]
    port: u16,

    /// Seconds to wait for the browser consent redirect (0 waits forever).
    #[arg(long, value_name = "SECS")]
    auth_timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout belongs to the stdio transport.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = Config::from_env();
    if let Some(secs) = args.auth_timeout {
        config.auth_timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }
    if config.serpapi_key.is_none() {
        warn!("SERPAPI_KEY is not set in the environment or .env; web_search will fail until it is");
    }

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, shutting down");
            }
            shutdown.cancel();
        }
    });

    let credentials = Arc::new(
        CredentialManager::from_config(&config)?.with_cancellation(shutdown.child_token()),
    );
    let server = McpServer::new(ToolRegistry::new(&config, credentials)?);

    match args.transport {
        Transport::Stdio => transport::stdio::run(server, shutdown).await?,
        Transport::Sse => transport::sse::run(server, &args.host, args.port, shutdown).await?,
        Transport::StreamableHttp => {
            transport::http::run(server, &args.host, args.port, shutdown).await?
        }
    }

    info!("Server stopped");
    Ok(())
}
