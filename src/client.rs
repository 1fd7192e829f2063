//! Client handle shared by every command call
//!
//! The client owns nothing but a name and a reference to a pool. Every call
//! borrows a connection, performs one request/response exchange, and lets the
//! guard hand the connection back, on error paths too.

use crate::config::ClientConfig;
use crate::pool::{ConnPool, MultiHostPool, PoolConfig, PoolError, SingleHostPool};
use crate::protocol::{Reply, Request};
use std::sync::Arc;
use tracing::debug;

/// Error types for client calls
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("Server replied with error: {0}")]
    Server(String),
}

/// Client for a RedisBloom deployment
#[derive(Clone)]
pub struct Client {
    pool: Arc<dyn ConnPool>,
    name: String,
}

impl Client {
    /// Connect to one `host:port` or a comma separated list of them.
    ///
    /// A single address gets a [`SingleHostPool`]; several get a
    /// [`MultiHostPool`] that picks one at random per call. Duplicates are
    /// kept as given.
    pub fn new(addr: &str, name: &str, credential: Option<String>) -> Result<Self, PoolError> {
        Self::with_config(addr, name, credential, PoolConfig::default())
    }

    pub fn with_config(
        addr: &str,
        name: &str,
        credential: Option<String>,
        config: PoolConfig,
    ) -> Result<Self, PoolError> {
        let mut hosts = parse_addresses(addr)?;
        let pool: Arc<dyn ConnPool> = if hosts.len() == 1 {
            Arc::new(SingleHostPool::new(hosts.remove(0), credential, config))
        } else {
            Arc::new(MultiHostPool::new(hosts, credential, config)?)
        };

        Ok(Self::from_pool(pool, name))
    }

    /// Build a client from loaded configuration
    pub fn from_config(config: &ClientConfig) -> Result<Self, PoolError> {
        Self::with_config(
            &config.addr,
            &config.name,
            config.password.clone(),
            config.pool.to_pool_config(),
        )
    }

    /// Use an existing pool. Clients built from the same `Arc` share it.
    pub fn from_pool(pool: Arc<dyn ConnPool>, name: &str) -> Self {
        Self {
            pool,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pool(&self) -> &Arc<dyn ConnPool> {
        &self.pool
    }

    /// Send one request over a pooled connection and return its reply
    pub async fn execute(&self, request: &Request) -> Result<Reply, ClientError> {
        let mut conn = self.pool.get().await?;
        debug!(client = %self.name, host = %conn.host(), command = %request.name(), "Executing");

        match conn.exchange(request).await? {
            Reply::Error(e) => Err(ClientError::Server(e)),
            reply => Ok(reply),
        }
    }

    pub async fn ping(&self) -> Result<(), ClientError> {
        self.execute(&Request::cmd("PING")).await.map(|_| ())
    }

    /// Close the underlying pool. Other clients sharing it are affected too.
    pub async fn close(&self) -> Result<(), PoolError> {
        self.pool.close().await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").field("name", &self.name).finish()
    }
}

/// Split a comma separated `host:port` list, rejecting blank or malformed
/// entries
pub fn parse_addresses(addr: &str) -> Result<Vec<String>, PoolError> {
    addr.split(',')
        .map(str::trim)
        .map(|entry| {
            let invalid = |what: &str| PoolError::Config(format!("address '{}' {}", entry, what));
            let (host, port) = entry
                .rsplit_once(':')
                .ok_or_else(|| invalid("is missing a port"))?;
            if host.is_empty() {
                return Err(invalid("is missing a host"));
            }
            port.parse::<u16>()
                .map_err(|_| invalid("has an invalid port"))?;
            Ok(entry.to_string())
        })
        .collect()
}
