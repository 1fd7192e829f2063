//! redisbloom - pooled async client for RedisBloom servers

pub mod client;
pub mod config;
pub mod pool;
pub mod protocol;

#[cfg(test)]
#[path = "../tests/common/mod.rs"]
mod testing;

pub use client::{Client, ClientError};
pub use config::ClientConfig;
pub use pool::{ConnPool, MultiHostPool, PoolConfig, PoolError, SingleHostPool};
