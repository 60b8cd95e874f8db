//! Process configuration read from `NOTESYNC_*` environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::source::SpoolSourceConfig;

/// Default listen address (127.0.0.1:3000).
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 3000);

/// Errors from reading the process configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Everything the service needs to start.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address the HTTP server listens on. `NOTESYNC_BIND_ADDR`.
    pub bind_addr: SocketAddr,

    /// Root of the notes vault. `NOTESYNC_VAULT_DIR`.
    pub vault_dir: PathBuf,

    /// Root of the per-identity buffers. `NOTESYNC_SPOOL_DIR`.
    pub spool_dir: PathBuf,

    /// Settings file. `NOTESYNC_SETTINGS_PATH`.
    pub settings_path: PathBuf,

    /// Shared secret for webhook signatures. `NOTESYNC_WEBHOOK_SECRET`, required.
    pub webhook_secret: Vec<u8>,

    /// `NOTESYNC_POLL_INTERVAL_MS`.
    pub poll_interval: Duration,

    /// `NOTESYNC_RESYNC_INTERVAL_SECS`.
    pub resync_interval: Duration,
}

impl ServiceConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value of
    /// a variable if it is set.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let webhook_secret = lookup("NOTESYNC_WEBHOOK_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("NOTESYNC_WEBHOOK_SECRET"))?;

        let spool_dir = path_or(&lookup, "NOTESYNC_SPOOL_DIR", "./spool");
        let defaults = SpoolSourceConfig::new(&spool_dir);

        Ok(ServiceConfig {
            bind_addr: parse_or(&lookup, "NOTESYNC_BIND_ADDR", || {
                SocketAddr::from(DEFAULT_BIND_ADDR)
            })?,
            vault_dir: path_or(&lookup, "NOTESYNC_VAULT_DIR", "./vault"),
            spool_dir,
            settings_path: path_or(&lookup, "NOTESYNC_SETTINGS_PATH", "./settings.json"),
            webhook_secret: webhook_secret.into_bytes(),
            poll_interval: parse_opt(&lookup, "NOTESYNC_POLL_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            resync_interval: parse_opt(&lookup, "NOTESYNC_RESYNC_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.resync_interval),
        })
    }

    /// The spool source configuration for this service.
    pub fn spool_source(&self) -> SpoolSourceConfig {
        SpoolSourceConfig {
            spool_dir: self.spool_dir.clone(),
            poll_interval: self.poll_interval,
            resync_interval: self.resync_interval,
        }
    }
}

fn path_or(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: &str) -> PathBuf {
    lookup(name)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

fn parse_opt<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    lookup(name)
        .map(|value| value.parse().map_err(|_| ConfigError::Invalid { name, value }))
        .transpose()
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: impl FnOnce() -> T,
) -> Result<T, ConfigError> {
    Ok(parse_opt(lookup, name)?.unwrap_or_else(default))
}
