//! Daemon configuration, read once from the environment

use queueup_core::error::{AppError, Result};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "~/.queueup/queue.db";
const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9630;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_FEED_POLL_MS: u64 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub db_path: PathBuf,
    pub rpc_host: String,
    pub rpc_port: u16,
    pub db_max_connections: u32,
    pub log_format: LogFormat,
    /// How often observed queues are checked for writes from other processes
    pub feed_poll_interval: Duration,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let db_path = lookup("QUEUEUP_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let db_path = PathBuf::from(shellexpand::tilde(&db_path).into_owned());

        let rpc_host = lookup("QUEUEUP_RPC_HOST").unwrap_or_else(|| DEFAULT_RPC_HOST.to_string());
        let rpc_port = parse_or(&lookup, "QUEUEUP_RPC_PORT", DEFAULT_RPC_PORT)?;
        let db_max_connections =
            parse_or(&lookup, "QUEUEUP_DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?;
        if db_max_connections == 0 {
            return Err(AppError::Config(
                "QUEUEUP_DB_MAX_CONNECTIONS must be at least 1".to_string(),
            ));
        }

        let feed_poll_ms = parse_or(&lookup, "QUEUEUP_FEED_POLL_MS", DEFAULT_FEED_POLL_MS)?;
        if feed_poll_ms == 0 {
            return Err(AppError::Config(
                "QUEUEUP_FEED_POLL_MS must be at least 1".to_string(),
            ));
        }

        let log_format = match lookup("QUEUEUP_LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "QUEUEUP_LOG_FORMAT must be 'pretty' or 'json', got '{}'",
                    other
                )))
            }
        };

        Ok(Self {
            db_path,
            rpc_host,
            rpc_port,
            db_max_connections,
            log_format,
            feed_poll_interval: Duration::from_millis(feed_poll_ms),
        })
    }

    pub fn database_url(&self) -> String {
        format!("sqlite://{}", self.db_path.display())
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value: '{}'", key, raw))),
        None => Ok(default),
    }
}
