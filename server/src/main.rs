//! AgentMem MCP Server Entry Point
//!
//! Opens the graph store, makes sure the default zone exists, then serves
//! MCP over stdio (default) or HTTP.

use std::path::PathBuf;
use std::sync::Arc;

use agentmem_graph::{connect_with_retry, MemoryGraph};
use agentmem_mcp::{Config, McpServer, TransportType};
use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "agentmem-mcp")]
#[command(about = "Graph memory for AI coding agents, served over MCP")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(long, short, env = "AGENTMEM_CONFIG")]
    config: Option<PathBuf>,

    /// Transport to serve on
    #[arg(long, value_enum)]
    transport: Option<TransportType>,

    /// Listen address for the HTTP transport
    #[arg(long)]
    bind: Option<String>,

    /// Directory holding the graph store
    #[arg(long, env = "AGENTMEM_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Zone used when a tool call does not name one
    #[arg(long)]
    zone: Option<String>,
}

impl Args {
    fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(transport) = self.transport {
            config.server.transport = transport;
        }
        if let Some(bind) = &self.bind {
            config.server.bind = bind.clone();
        }
        if let Some(data_dir) = &self.data_dir {
            config.store.data_dir = data_dir.clone();
        }
        if let Some(zone) = &self.zone {
            config.server.default_zone = zone.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // stdout belongs to the stdio transport; logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agentmem_mcp=info,agentmem_graph=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = args.load_config()?;
    tracing::info!("Starting AgentMem MCP server");
    tracing::info!("Data directory: {:?}", config.store.data_dir);

    let conn = connect_with_retry(&config.store_config(), config.retry_policy(), shutdown_signal())
        .await
        .context("failed to open graph store")?;
    let graph = MemoryGraph::new(Arc::new(conn));

    let zone = graph
        .zones()
        .ensure(&config.server.default_zone)
        .context("failed to prepare default zone")?;
    tracing::info!("Default zone '{}' ({})", zone.name, zone.id);

    let server = McpServer::new(graph, zone.id);
    match config.server.transport {
        TransportType::Stdio => {
            tokio::select! {
                result = server.run_stdio() => result?,
                _ = shutdown_signal() => tracing::info!("Interrupted, shutting down"),
            }
        }
        TransportType::Http => {
            let addr = config.bind_addr()?;
            agentmem_mcp::mcp::http::serve(server, addr, shutdown_signal()).await?;
        }
    }

    Ok(())
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
