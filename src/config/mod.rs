use crate::pool::{PoolConfig, DEFAULT_MAX_IDLE};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Pool tuning as it appears in configuration files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Idle connections kept per host
    #[serde(default = "default_max_idle")]
    pub max_idle: usize,

    /// Idle time in milliseconds after which a borrowed connection is pinged
    #[serde(default = "default_test_on_borrow_ms")]
    pub test_on_borrow_ms: u64,

    /// Connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Deadline in milliseconds for AUTH and borrow-time PING replies
    #[serde(default = "default_connect_timeout_ms")]
    pub io_timeout_ms: u64,
}

fn default_max_idle() -> usize {
    DEFAULT_MAX_IDLE
}

fn default_test_on_borrow_ms() -> u64 {
    1
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_idle: default_max_idle(),
            test_on_borrow_ms: default_test_on_borrow_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            io_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl PoolSettings {
    pub fn to_pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_idle: self.max_idle,
            test_on_borrow_after: Duration::from_millis(self.test_on_borrow_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            io_timeout: Duration::from_millis(self.io_timeout_ms),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// A single `host:port` or a comma separated list of them
    pub addr: String,

    /// Client name
    #[serde(default = "default_name")]
    pub name: String,

    /// Credential sent with AUTH on every new connection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Pool settings
    #[serde(default)]
    pub pool: PoolSettings,
}

fn default_name() -> String {
    "redisbloom".to_string()
}

impl ClientConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            name: default_name(),
            password: None,
            pool: PoolSettings::default(),
        }
    }
}

/// Load configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<ClientConfig> {
    let content = std::fs::read_to_string(path.as_ref())
        .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

    let config: ClientConfig =
        serde_yaml::from_str(&content).context("Failed to parse YAML configuration")?;

    Ok(config)
}

/// Load configuration from environment variables
///
/// - REDISBLOOM_ADDR (required, `host:port` or comma separated list)
/// - REDISBLOOM_NAME (optional)
/// - REDISBLOOM_PASSWORD (optional)
/// - REDISBLOOM_MAX_IDLE (optional)
/// - REDISBLOOM_CONNECT_TIMEOUT_MS (optional)
/// - REDISBLOOM_IO_TIMEOUT_MS (optional)
pub fn load_from_env() -> Result<ClientConfig> {
    // Try to load .env file if it exists (don't fail if it doesn't)
    let _ = dotenvy::dotenv();

    let addr = std::env::var("REDISBLOOM_ADDR")
        .context("REDISBLOOM_ADDR environment variable not set")?;
    let mut config = ClientConfig::new(addr);

    if let Ok(name) = std::env::var("REDISBLOOM_NAME") {
        config.name = name;
    }

    config.password = std::env::var("REDISBLOOM_PASSWORD")
        .ok()
        .filter(|p| !p.is_empty());

    if let Ok(max_idle) = std::env::var("REDISBLOOM_MAX_IDLE") {
        config.pool.max_idle = max_idle
            .parse()
            .context("REDISBLOOM_MAX_IDLE must be a non-negative integer")?;
    }

    if let Ok(timeout) = std::env::var("REDISBLOOM_CONNECT_TIMEOUT_MS") {
        config.pool.connect_timeout_ms = timeout
            .parse()
            .context("REDISBLOOM_CONNECT_TIMEOUT_MS must be an integer")?;
    }

    if let Ok(timeout) = std::env::var("REDISBLOOM_IO_TIMEOUT_MS") {
        config.pool.io_timeout_ms = timeout
            .parse()
            .context("REDISBLOOM_IO_TIMEOUT_MS must be an integer")?;
    }

    Ok(config)
}

/// Load configuration from file or environment
///
/// Reads the YAML file when a path is given, environment variables otherwise.
pub fn load_config(config_path: Option<&str>) -> Result<ClientConfig> {
    match config_path {
        Some(path) => load_from_yaml(path),
        None => load_from_env(),
    }
}
