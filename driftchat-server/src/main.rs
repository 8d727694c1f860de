//! `Driftchat` store server — hosts the shared room.
//!
//! Serves one in-memory TTL message store to chat clients over WebSocket.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:9400 with a 30-minute retention window
//! cargo run --bin driftchat-server
//!
//! # Custom address and retention
//! cargo run --bin driftchat-server -- --bind 127.0.0.1:9400 --ttl-seconds 600
//!
//! # Or via environment variables
//! DRIFTCHAT_STORE_ADDR=127.0.0.1:9400 cargo run --bin driftchat-server
//! ```

use std::time::Duration;

use clap::Parser;

use driftchat_server::config::{ServerCliArgs, ServerConfig};
use driftchat_server::server;
use driftchat_store::memory::MemoryStore;
use driftchat_store::store::MessageStore;

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(
        addr = %config.bind_addr,
        ttl_seconds = config.ttl_seconds,
        "starting driftchat store server"
    );

    let store = MemoryStore::with_options(
        Duration::from_secs(config.ttl_seconds),
        Duration::from_secs(config.sweep_interval_secs),
        config.channel_capacity,
    );

    // Idempotent schema setup: starts the retention sweeper.
    if let Err(e) = store.ensure_schema().await {
        tracing::error!(error = %e, "failed to set up store schema");
        std::process::exit(1);
    }

    match server::start_server(&config.bind_addr, store).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "store server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "store server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start store server");
            std::process::exit(1);
        }
    }
}
