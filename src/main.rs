//! Room Hub - Entry Point
//!
//! Loads configuration, starts the Hub actor and accepts connections.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use room_hub::{serve, Hub, MemoryRoomStore, ServerConfig};

/// Room-based WebSocket messaging hub
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Address to bind to (overrides the config file)
    #[arg(short, long)]
    bind: Option<String>,
    /// Tracing filter (overrides the config file; RUST_LOG wins over both)
    #[arg(long)]
    log: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(log) = args.log {
        config.log_filter = log;
    }

    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=room_hub=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Room hub listening on {}", config.bind_addr);

    let config = Arc::new(config);
    let hub = Hub::spawn(&config, Arc::new(MemoryRoomStore::new()));

    serve(listener, hub, config).await;

    Ok(())
}
