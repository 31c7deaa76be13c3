//! tidemark server entry point.
//!
//! Boots the bookmark engine and serves it as MCP tools on stdio.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tidemark_client::{Engine, EngineConfig, FetchConfig, HttpImageFetcher, UpstreamClient, UpstreamConfig, open_store};
use tidemark_core::AppConfig;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(backend = ?config.store_backend, prefix = %config.key_prefix, "Starting tidemark on stdio transport");

    let store = open_store(&config).await?;
    let source = Arc::new(UpstreamClient::new(UpstreamConfig::from_app(&config))?);
    let fetcher = Arc::new(HttpImageFetcher::new(FetchConfig::from_app(&config))?);

    let engine = Arc::new(Engine::new(EngineConfig::from_app(&config), store, source, fetcher));
    engine.start();

    let handler = handler::TidemarkServer::new(engine.clone());
    let server = serve_server(handler, stdio()).await?;

    tokio::select! {
        reason = server.waiting() => {
            tracing::info!(?reason, "client disconnected");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, shutting down");
        }
    }

    engine.stop();
    tracing::info!("tidemark stopped");

    Ok(())
}
