use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;
use tracing::Level;

/// File name of the SQLite database inside `state_dir`.
pub const DATABASE_FILE: &str = "revassign.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Directory for persistent state (SQLite database).
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
    pub storage_backend: StorageBackend,
    pub log_level: Level,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| non_blank(lookup(name));

        let port = var("PORT")
            .unwrap_or_else(|| "8080".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let state_dir = var("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let storage_backend = parse_storage_backend(var("STORAGE_BACKEND").as_deref())
            .context("STORAGE_BACKEND must be 'sqlite' or 'memory'")?;

        let log_level = parse_log_level(var("LOG_LEVEL").as_deref())
            .context("LOG_LEVEL must be one of trace, debug, info, warn, error")?;

        Ok(Config {
            port,
            state_dir,
            storage_backend,
            log_level,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.state_dir.join(DATABASE_FILE)
    }
}

/// Treat missing, empty and whitespace-only values alike.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

pub fn parse_storage_backend(value: Option<&str>) -> Result<StorageBackend> {
    match value.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        None | Some("sqlite") => Ok(StorageBackend::Sqlite),
        Some("memory") => Ok(StorageBackend::Memory),
        Some(other) => bail!("unknown storage backend '{}'", other),
    }
}

pub fn parse_log_level(value: Option<&str>) -> Result<Level> {
    match value {
        None => Ok(Level::INFO),
        Some(raw) => raw
            .trim()
            .parse::<Level>()
            .map_err(|e| anyhow::anyhow!("invalid log level '{}': {}", raw, e)),
    }
}
