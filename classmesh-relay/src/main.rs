use anyhow::{Context, Result};
use clap::Parser;
use classmesh_relay::{RelayConfig, RelayHub, serve};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = RelayConfig::parse();
    info!(
        "Starting relay on {} ({} accepted tokens)",
        config.bind,
        config.tokens.len()
    );

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    serve(listener, RelayHub::new(config.tokens))
        .await
        .context("Relay server stopped")?;

    Ok(())
}
