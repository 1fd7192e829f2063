//! Connection pooling
//!
//! This module provides:
//! - The [`ConnPool`] capability shared by every pool variant
//! - A dialer that connects and authenticates new connections
//! - A fixed-endpoint pool with borrow-time health checks
//! - A multi-host pool that lazily creates and randomly picks per-host pools

pub mod connection;
pub mod error;
pub mod health;
pub mod multi;
pub mod single;

pub use connection::{Connection, Dialer, Endpoint, PoolConfig, DEFAULT_MAX_IDLE};
pub use error::{CloseError, HostCloseFailure, PoolError};
pub use multi::MultiHostPool;
pub use single::{PoolStats, PooledConnection, SingleHostPool};

use async_trait::async_trait;

/// Anything that can hand out connections and be shut down
#[async_trait]
pub trait ConnPool: Send + Sync {
    /// Borrow a connection; dropping the guard gives it back
    async fn get(&self) -> Result<PooledConnection, PoolError>;

    /// Release every idle connection held by the pool
    async fn close(&self) -> Result<(), PoolError>;
}

#[async_trait]
impl ConnPool for SingleHostPool {
    async fn get(&self) -> Result<PooledConnection, PoolError> {
        SingleHostPool::get(self).await
    }

    async fn close(&self) -> Result<(), PoolError> {
        SingleHostPool::close(self)
    }
}

#[async_trait]
impl ConnPool for MultiHostPool {
    async fn get(&self) -> Result<PooledConnection, PoolError> {
        MultiHostPool::get(self).await
    }

    async fn close(&self) -> Result<(), PoolError> {
        MultiHostPool::close(self)
    }
}
