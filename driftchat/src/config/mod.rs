//! Configuration system for the `Driftchat` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/driftchat/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::remote::RemoteOptions;
use crate::render::DEFAULT_TIMESTAMP_FORMAT;
use crate::session::SessionOptions;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    store: StoreFileConfig,
    chat: ChatFileConfig,
    ui: UiFileConfig,
}

/// `[store]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StoreFileConfig {
    server_url: Option<String>,
    retention_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
}

/// `[chat]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ChatFileConfig {
    username: Option<String>,
    history_limit: Option<usize>,
    line_buffer: Option<usize>,
    shutdown_grace_secs: Option<u64>,
}

/// `[ui]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct UiFileConfig {
    timestamp_format: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Store --
    /// WebSocket URL of the store server. `None` runs a process-local
    /// in-memory store (single-participant offline mode).
    pub server_url: Option<String>,
    /// Retention window for the local store, in seconds.
    pub retention_secs: u64,
    /// Sweeper cadence for the local store, in seconds.
    pub sweep_interval_secs: u64,
    /// Timeout for connecting to the store server.
    pub connect_timeout: Duration,
    /// Timeout for each store request.
    pub request_timeout: Duration,

    // -- Chat --
    /// The participant's handle, if preconfigured.
    pub username: Option<String>,
    /// Maximum number of backfilled messages shown on join.
    pub history_limit: usize,
    /// Capacity of the stdin line channel.
    pub line_buffer: usize,
    /// Grace period for the remaining task after shutdown is raised.
    pub shutdown_grace: Duration,

    // -- UI --
    /// Timestamp display format string (chrono).
    pub timestamp_format: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            retention_secs: 30 * 60,
            sweep_interval_secs: 60,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            username: None,
            history_limit: 30,
            line_buffer: 64,
            shutdown_grace: Duration::from_secs(5),
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. Separated from `load()` to enable
    /// unit testing without CLI parsing.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            server_url: cli
                .server_url
                .clone()
                .or_else(|| file.store.server_url.clone()),
            retention_secs: cli
                .retention_secs
                .or(file.store.retention_secs)
                .unwrap_or(defaults.retention_secs),
            sweep_interval_secs: file
                .store
                .sweep_interval_secs
                .unwrap_or(defaults.sweep_interval_secs),
            connect_timeout: file
                .store
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            request_timeout: file
                .store
                .request_timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
            username: cli.username.clone().or_else(|| file.chat.username.clone()),
            history_limit: cli
                .history_limit
                .or(file.chat.history_limit)
                .unwrap_or(defaults.history_limit),
            line_buffer: file.chat.line_buffer.unwrap_or(defaults.line_buffer),
            shutdown_grace: file
                .chat
                .shutdown_grace_secs
                .map_or(defaults.shutdown_grace, Duration::from_secs),
            timestamp_format: cli
                .timestamp_format
                .clone()
                .or_else(|| file.ui.timestamp_format.clone())
                .unwrap_or(defaults.timestamp_format),
        }
    }

    /// Builds the [`RemoteOptions`] for connecting to a store server.
    #[must_use]
    pub const fn to_remote_options(&self) -> RemoteOptions {
        RemoteOptions {
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
        }
    }

    /// Builds the [`SessionOptions`] for running a session.
    #[must_use]
    pub const fn to_session_options(&self) -> SessionOptions {
        SessionOptions {
            history_limit: self.history_limit,
            shutdown_grace: self.shutdown_grace,
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Ephemeral single-room terminal chat")]
pub struct CliArgs {
    /// WebSocket URL of the store server (e.g. `ws://127.0.0.1:9400/ws`).
    #[arg(long, env = "DRIFTCHAT_SERVER_URL")]
    pub server_url: Option<String>,

    /// Your handle in the room.
    #[arg(short, long, env = "DRIFTCHAT_USERNAME")]
    pub username: Option<String>,

    /// Path to config file (default: `~/.config/driftchat/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum number of backfilled messages shown on join.
    #[arg(long)]
    pub history_limit: Option<usize>,

    /// Retention window in seconds (local store mode).
    #[arg(long, env = "DRIFTCHAT_TTL_SECONDS")]
    pub retention_secs: Option<u64>,

    /// Timestamp display format (chrono format string).
    #[arg(long)]
    pub timestamp_format: Option<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "DRIFTCHAT_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/driftchat.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and a missing
/// file is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            // No config dir available; use defaults.
            return Ok(ConfigFile::default());
        };
        config_dir.join("driftchat").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
