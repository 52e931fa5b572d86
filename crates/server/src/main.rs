//! offgrid server entry point.
//!
//! Boots the caching proxy and exposes it as an MCP server on stdio.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use offgrid_client::{FetchClient, FetchConfig};
use offgrid_core::{AppConfig, CacheDb, CacheStore, MemoryStore, Worker};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    let cache_config = config.cache_config()?;

    let store: Arc<dyn CacheStore> = if config.in_memory {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(
            CacheDb::open(&config.db_path)
                .await
                .with_context(|| format!("failed to open cache at {}", config.db_path.display()))?,
        )
    };

    let fetcher = Arc::new(FetchClient::new(FetchConfig::from_app(&config, cache_config.origin.clone()))?);

    tracing::info!(
        version = %cache_config.version,
        origin = %cache_config.origin,
        backend = store.name(),
        "starting offgrid server on stdio transport"
    );

    let worker = Arc::new(Worker::new(cache_config, store, fetcher));

    // The MCP host is itself a client page; it sees every broadcast.
    let host = worker.connect_client().await;
    tracing::info!(client = host, "host registered as client");
    let mut outbound = worker.clients().subscribe();
    tokio::spawn(async move {
        loop {
            match outbound.recv().await {
                Ok(message) => tracing::info!(client = host, ?message, "client message"),
                Err(RecvError::Lagged(skipped)) => tracing::warn!(client = host, skipped, "client messages dropped"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let handler = handler::OffgridServer::new(Arc::clone(&worker));
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    worker.disconnect_client(host).await;
    worker.settle().await;

    Ok(())
}
