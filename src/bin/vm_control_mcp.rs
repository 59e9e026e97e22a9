//! MCP server for VM remote control.
//!
//! Opens one SSH session to the VM at startup and serves tool calls over
//! stdio using JSON-RPC 2.0 until the client closes stdin or Ctrl-C.

use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vm_control::mcp::McpServer;
use vm_control::project::ProjectStore;
use vm_control::remote::Connection;
use vm_control::{Config, SessionContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries JSON-RPC
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vm_control=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env()?;
    info!(
        "Loaded configuration: {} display={} projects_dir={}",
        config.remote.destination(),
        config.remote.display,
        config.projects_dir.display()
    );

    ProjectStore::new(config.projects_dir.clone()).ensure_root()?;

    let connection = Connection::open(&config.remote).await?;
    let session = SessionContext::new(connection, &config);

    let mut server = McpServer::new(session);
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    let served = tokio::select! {
        result = server.serve(stdin, stdout) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Ok(())
        }
    };
    if let Err(e) = &served {
        error!("stdio transport failed: {}", e);
    }

    let session = server.into_session();
    if let Err(e) = session.connection().close().await {
        error!("Failed to close remote session: {}", e);
    }
    info!("Server shut down");

    served.map_err(Into::into)
}
