//! Server configuration via CLI args and environment variables.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use pricetrack_service::ServiceConfig;
use pricetrack_service::stats::{DEFAULT_STATS_KEY, WriteMode};
use pricetrack_service::store::StoreConfig;

/// Price experiment tracking service.
#[derive(Parser, Debug, Clone)]
#[command(name = "pricetrack-server", version, about)]
pub struct Config {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Bind address.
    #[arg(long, global = true, default_value = "0.0.0.0", env = "PRICETRACK_HOST")]
    pub host: String,

    /// Bind port.
    #[arg(long, global = true, default_value_t = 3000, env = "PRICETRACK_PORT")]
    pub port: u16,

    /// Blob store backend holding the stats document.
    #[arg(long, global = true, value_enum, default_value_t = StoreKind::Memory, env = "PRICETRACK_STORE")]
    pub store: StoreKind,

    /// Root directory for the `fs` store.
    #[arg(long, global = true, env = "PRICETRACK_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Base URL of the `http` store; objects live at `<url>/<key>`.
    #[arg(long, global = true, env = "PRICETRACK_BLOB_URL")]
    pub blob_url: Option<String>,

    /// Bearer token sent to the `http` store.
    #[arg(long, global = true, env = "PRICETRACK_BLOB_TOKEN", hide_env_values = true)]
    pub blob_token: Option<String>,

    /// Object key of the stats document.
    #[arg(long, global = true, default_value = DEFAULT_STATS_KEY, env = "PRICETRACK_STATS_KEY")]
    pub stats_key: String,

    /// Timeout for each blob store call, in seconds.
    #[arg(long, global = true, default_value_t = 10, env = "PRICETRACK_STORE_TIMEOUT")]
    pub store_timeout: u64,

    /// How concurrent writes to the stats document are reconciled.
    #[arg(long, global = true, value_enum, default_value_t = WriteModeArg::LastWriterWins, env = "PRICETRACK_WRITE_MODE")]
    pub write_mode: WriteModeArg,

    /// Extra attempts after a conflicting write in `optimistic` mode.
    #[arg(long, global = true, default_value_t = 5, env = "PRICETRACK_MAX_WRITE_RETRIES")]
    pub max_write_retries: u32,

    /// Username for reading stats (HTTP Basic). Reads are denied when unset.
    #[arg(long, global = true, env = "PRICETRACK_AUTH_USER")]
    pub auth_user: Option<String>,

    /// Password for reading stats (HTTP Basic).
    #[arg(long, global = true, env = "PRICETRACK_AUTH_PASSWORD", hide_env_values = true)]
    pub auth_password: Option<String>,

    /// Maximum write requests per client per window.
    #[arg(long, global = true, default_value_t = 20, env = "PRICETRACK_RATE_LIMIT")]
    pub rate_limit: u64,

    /// Rate limit window in seconds.
    #[arg(long, global = true, default_value_t = 60, env = "PRICETRACK_RATE_LIMIT_WINDOW")]
    pub rate_limit_window: u64,

    /// CORS allowed origins (comma-separated). Empty for no CORS.
    #[arg(long, global = true, env = "PRICETRACK_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    /// Log level.
    #[arg(long, global = true, default_value = "info", env = "PRICETRACK_LOG_LEVEL")]
    pub log_level: String,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text, env = "PRICETRACK_LOG_FORMAT")]
    pub log_format: LogFormat,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Serve the HTTP API (default).
    Serve,
    /// Delete the stats document and exit.
    ResetStats,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Fs,
    Http,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteModeArg {
    LastWriterWins,
    Optimistic,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Invalid flag combinations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("--data-dir is required with --store fs")]
    MissingDataDir,

    #[error("--blob-url is required with --store http")]
    MissingBlobUrl,

    #[error("--rate-limit-window must be at least 1 second")]
    ZeroWindow,

    #[error("--store-timeout must be at least 1 second")]
    ZeroStoreTimeout,
}

impl Config {
    /// Parses configuration from CLI args and env vars.
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Serve)
    }

    /// Builds the service-layer configuration, validating store flags.
    pub fn service_config(&self) -> Result<ServiceConfig, ConfigError> {
        if self.rate_limit_window == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.store_timeout == 0 {
            return Err(ConfigError::ZeroStoreTimeout);
        }

        let store = match self.store {
            StoreKind::Memory => StoreConfig::Memory,
            StoreKind::Fs => StoreConfig::Filesystem {
                root: self.data_dir.clone().ok_or(ConfigError::MissingDataDir)?,
            },
            StoreKind::Http => StoreConfig::Http {
                base_url: self.blob_url.clone().ok_or(ConfigError::MissingBlobUrl)?,
                token: self.blob_token.clone(),
            },
        };

        let write_mode = match self.write_mode {
            WriteModeArg::LastWriterWins => WriteMode::LastWriterWins,
            WriteModeArg::Optimistic => WriteMode::Optimistic {
                max_retries: self.max_write_retries,
            },
        };

        Ok(ServiceConfig {
            store,
            stats_key: self.stats_key.clone(),
            store_timeout: self.store_timeout,
            write_mode,
            rate_limit: self.rate_limit,
            rate_limit_window: self.rate_limit_window,
            auth_user: self.auth_user.clone(),
            auth_password: self.auth_password.clone(),
        })
    }
}
