//! Server configuration.
//!
//! Every option can be given on the command line or through an `EMBERKV_*`
//! environment variable; the command line wins.

use crate::storage::{ExpiryConfig, DEFAULT_DATABASES};
use clap::Parser;
use std::time::Duration;

/// The default port EmberKV listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host EmberKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

#[derive(Debug, Clone, Parser)]
#[command(
    name = "emberkv",
    version,
    about = "An in-memory, Redis-compatible key-value server",
    after_help = "Connect with any Redis client, e.g. `redis-cli -p 6379`."
)]
pub struct Config {
    /// Host to bind to
    #[arg(long, env = "EMBERKV_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "EMBERKV_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Number of selectable databases
    #[arg(
        long,
        env = "EMBERKV_DATABASES",
        default_value_t = DEFAULT_DATABASES,
        value_parser = parse_database_count
    )]
    pub databases: usize,

    /// Milliseconds between background expiry sweeps
    #[arg(long, env = "EMBERKV_SWEEP_INTERVAL_MS", default_value_t = 100)]
    pub sweep_interval_ms: u64,

    /// Start as a read-only replica: write commands are rejected
    #[arg(long, env = "EMBERKV_READ_ONLY")]
    pub read_only: bool,

    /// Log filter used when RUST_LOG is unset (e.g. `info`, `emberkv=debug`)
    #[arg(long, env = "EMBERKV_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

fn parse_database_count(raw: &str) -> Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(0) => Err("at least one database is required".to_string()),
        Ok(count) => Ok(count),
        Err(e) => Err(e.to_string()),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            databases: DEFAULT_DATABASES,
            sweep_interval_ms: 100,
            read_only: false,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// `host:port` for the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn expiry(&self) -> ExpiryConfig {
        ExpiryConfig {
            interval: Duration::from_millis(self.sweep_interval_ms.max(1)),
        }
    }
}
