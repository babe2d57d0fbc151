use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, ValueEnum};
use thiserror::Error;

use crate::filter::DEFAULT_CONTACT_SEPARATOR;
use crate::logging::{DEFAULT_FILTER, LOG_ENV};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DATABASE_FILE: &str = "citrus-farms.sqlite3";
pub const SNAPSHOT_FILE: &str = "farms.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Relational store at `--database-url`.
    Sqlite,
    /// JSON snapshot file inside the data directory.
    File,
    /// Process-local snapshot, discarded on exit.
    Memory,
    /// Another citrus-farms server at `--remote-url`.
    Remote,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no data directory available; pass --data-dir")]
    NoDataDir,
    #[error("page size must be at least 1")]
    InvalidPageSize,
    #[error("the remote backend requires --remote-url")]
    MissingRemoteUrl,
}

/// Runtime options shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// SQLite connection string.
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,

    /// Directory for the database, snapshot file and logs.
    #[arg(long, env = "CITRUS_FARMS_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Address the HTTP server listens on.
    #[arg(long, env = "CITRUS_FARMS_BIND", default_value = DEFAULT_BIND, global = true)]
    pub bind: SocketAddr,

    /// Default page size for `GET /farms`.
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE, global = true)]
    pub page_size: u32,

    /// Character ignored when matching contact numbers.
    #[arg(long, default_value_t = DEFAULT_CONTACT_SEPARATOR, global = true)]
    pub contact_separator: char,

    /// Storage backend.
    #[arg(long, value_enum, default_value_t = Backend::Sqlite, global = true)]
    pub backend: Backend,

    /// Base URL of the server used by the remote backend.
    #[arg(long, env = "CITRUS_FARMS_REMOTE_URL", global = true)]
    pub remote_url: Option<String>,

    /// tracing filter directives.
    #[arg(long = "log", env = LOG_ENV, default_value = DEFAULT_FILTER, global = true)]
    pub log_filter: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_url: String,
    pub data_dir: PathBuf,
    pub bind: SocketAddr,
    pub page_size: u32,
    pub contact_separator: char,
    pub backend: Backend,
    pub remote_url: Option<String>,
    pub log_filter: String,
}

pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("citrus-farms"))
}

impl ConfigArgs {
    pub fn resolve(self) -> Result<AppConfig, ConfigError> {
        let data_dir = match self.data_dir {
            Some(dir) => dir,
            None => default_data_dir().ok_or(ConfigError::NoDataDir)?,
        };
        if self.page_size == 0 {
            return Err(ConfigError::InvalidPageSize);
        }
        if self.backend == Backend::Remote && self.remote_url.is_none() {
            return Err(ConfigError::MissingRemoteUrl);
        }
        let database_url = self.database_url.unwrap_or_else(|| {
            format!("sqlite://{}", data_dir.join(DATABASE_FILE).display())
        });
        Ok(AppConfig {
            database_url,
            data_dir,
            bind: self.bind,
            page_size: self.page_size,
            contact_separator: self.contact_separator,
            backend: self.backend,
            remote_url: self.remote_url,
            log_filter: self.log_filter,
        })
    }
}

impl AppConfig {
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILE)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}
