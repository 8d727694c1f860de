//! `Driftchat` — ephemeral single-room terminal chat.
//!
//! Joins the room hosted by a `driftchat-server` instance, or runs a
//! process-local room when no server is configured. Messages expire after
//! the retention window; on join the most recent ones are backfilled, then
//! new messages stream live while you type.
//!
//! ```bash
//! # Local, single-process room
//! cargo run --bin driftchat -- --username alice
//!
//! # Join a shared room
//! cargo run --bin driftchat -- --server-url ws://127.0.0.1:9400/ws \
//!     --username alice
//!
//! # Or via environment variables
//! DRIFTCHAT_SERVER_URL=ws://127.0.0.1:9400/ws DRIFTCHAT_USERNAME=alice cargo run
//! ```

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use driftchat::config::{CliArgs, ClientConfig};
use driftchat::remote::RemoteStore;
use driftchat::render::{Render, StdoutRender};
use driftchat::session::{self, SessionEnd, input};
use driftchat_store::memory::MemoryStore;
use driftchat_store::message::Username;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > config file > env > defaults).
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    // Logs go to a file; stdout belongs to the chat surface.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!("driftchat starting");

    // Resolve the handle before the stdin pump takes over standard input.
    let username = match resolve_username(config.username.as_deref()) {
        Some(name) => name,
        None => {
            eprintln!("no username provided");
            return ExitCode::FAILURE;
        }
    };

    let render = Arc::new(StdoutRender::new(config.timestamp_format.clone()));
    let lines = input::spawn_stdin_pump(config.line_buffer);

    let result = match config.server_url.as_deref() {
        Some(url) => {
            let store = match RemoteStore::connect(url, config.to_remote_options()).await {
                Ok(store) => store,
                Err(e) => {
                    render.error(&format!("could not reach the store server: {e}"));
                    return ExitCode::FAILURE;
                }
            };
            render.status(&format!("connected to {url}"));
            session::run_session(
                store,
                Arc::clone(&render),
                username,
                lines,
                config.to_session_options(),
            )
            .await
        }
        None => {
            render.status("no server configured \u{2014} running a local, single-process room");
            let store = MemoryStore::with_options(
                Duration::from_secs(config.retention_secs),
                Duration::from_secs(config.sweep_interval_secs),
                256,
            );
            session::run_session(
                store,
                Arc::clone(&render),
                username,
                lines,
                config.to_session_options(),
            )
            .await
        }
    };

    tracing::info!("driftchat exiting");

    match result {
        Ok(SessionEnd::Quit) => ExitCode::SUCCESS,
        Ok(SessionEnd::FeedFailed(e)) => {
            tracing::error!(error = %e, "session ended with a dead live feed");
            ExitCode::FAILURE
        }
        Err(e) => {
            render.error(&format!("session failed: {e}"));
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("driftchat.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Resolves the participant's handle: configured value first, otherwise an
/// interactive prompt (before the stdin pump starts).
///
/// Returns `None` on end of input or a read error.
fn resolve_username(configured: Option<&str>) -> Option<Username> {
    if let Some(raw) = configured {
        match Username::parse(raw) {
            Ok(name) => return Some(name),
            Err(e) => eprintln!("configured username is invalid: {e}"),
        }
    }

    let stdin = std::io::stdin();
    loop {
        {
            let mut out = std::io::stdout().lock();
            let _ = write!(out, "Choose a username: ");
            let _ = out.flush();
        }
        let mut line = String::new();
        match stdin.read_line(&mut line) {
            Ok(0) | Err(_) => return None,
            Ok(_) => match Username::parse(&line) {
                Ok(name) => return Some(name),
                Err(e) => eprintln!("{e}"),
            },
        }
    }
}
