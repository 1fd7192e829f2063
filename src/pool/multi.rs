//! Pool spread across several hosts
//!
//! Each `get` picks a host uniformly at random (with replacement) and borrows
//! from that host's sub-pool, creating the sub-pool the first time the host is
//! picked. The registry lock covers only selection and lookup/insert; dialing
//! and probing happen after it is released, so a slow or hung host never
//! blocks acquisitions routed to other hosts.

use super::connection::PoolConfig;
use super::error::{CloseError, HostCloseFailure, PoolError};
use super::single::{PooledConnection, SingleHostPool};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

struct Registry {
    pools: HashMap<String, SingleHostPool>,
    rng: Box<dyn RngCore + Send>,
}

/// Lazily populated set of per-host pools with random host selection
pub struct MultiHostPool {
    hosts: Vec<String>,
    credential: Option<String>,
    config: PoolConfig,
    registry: Mutex<Registry>,
}

impl MultiHostPool {
    /// Create a pool over `hosts`, seeding host selection from OS entropy.
    ///
    /// Duplicate hosts are kept, which weights selection toward them.
    pub fn new(
        hosts: Vec<String>,
        credential: Option<String>,
        config: PoolConfig,
    ) -> Result<Self, PoolError> {
        Self::with_rng(hosts, credential, config, StdRng::from_entropy())
    }

    /// Create a pool that draws host selections from `rng`
    pub fn with_rng<R>(
        hosts: Vec<String>,
        credential: Option<String>,
        config: PoolConfig,
        rng: R,
    ) -> Result<Self, PoolError>
    where
        R: RngCore + Send + 'static,
    {
        if hosts.is_empty() {
            return Err(PoolError::Config("host list is empty".to_string()));
        }
        if let Some(blank) = hosts.iter().position(|h| h.trim().is_empty()) {
            return Err(PoolError::Config(format!("host #{} is blank", blank)));
        }

        Ok(Self {
            registry: Mutex::new(Registry {
                pools: HashMap::with_capacity(hosts.len()),
                rng: Box::new(rng),
            }),
            hosts,
            credential,
            config,
        })
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Configured hosts, duplicates included
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Number of sub-pools created so far
    pub fn registry_len(&self) -> usize {
        self.registry().pools.len()
    }

    /// The sub-pool for `host`, if it has been created
    pub fn sub_pool(&self, host: &str) -> Option<SingleHostPool> {
        self.registry().pools.get(host).cloned()
    }

    /// Register a pre-built sub-pool under its own host.
    ///
    /// Returns `false` and leaves the registry untouched if that host already
    /// has a sub-pool.
    pub fn register_sub_pool(&self, pool: SingleHostPool) -> bool {
        let mut registry = self.registry();
        if registry.pools.contains_key(pool.host()) {
            return false;
        }
        registry.pools.insert(pool.host().to_string(), pool);
        true
    }

    /// Pick a host and return its sub-pool, creating it on first use
    fn select(&self) -> SingleHostPool {
        let mut registry = self.registry();
        let host = &self.hosts[registry.rng.gen_range(0..self.hosts.len())];

        registry
            .pools
            .entry(host.clone())
            .or_insert_with(|| {
                info!(host = %host, "Creating sub-pool");
                SingleHostPool::new(host.clone(), self.credential.clone(), self.config.clone())
            })
            .clone()
    }

    /// Borrow a connection from a randomly chosen host
    pub async fn get(&self) -> Result<PooledConnection, PoolError> {
        let pool = self.select();
        pool.get().await
    }

    /// Close every sub-pool, continuing past failures.
    ///
    /// All failures are reported together in one [`CloseError`]. Sub-pools are
    /// not removed, so calling this again reports each as already closed.
    pub fn close(&self) -> Result<(), PoolError> {
        let registry = self.registry();
        let mut hosts: Vec<&String> = registry.pools.keys().collect();
        hosts.sort();

        let mut failures = Vec::new();
        for host in hosts {
            if let Err(e) = registry.pools[host].close() {
                warn!(host = %host, error = %e, "Failed to close sub-pool");
                failures.push(HostCloseFailure {
                    host: host.clone(),
                    cause: Box::new(e),
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CloseError::new(failures).into())
        }
    }
}

impl std::fmt::Debug for MultiHostPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiHostPool")
            .field("hosts", &self.hosts)
            .field("sub_pools", &self.registry_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Reply, Request};
    use crate::testing::FakeServer;
    use rand::rngs::mock::StepRng;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// Replays a fixed list of values, then zeros
    struct Sequence(VecDeque<u64>);

    impl RngCore for Sequence {
        fn next_u32(&mut self) -> u32 {
            (self.next_u64() >> 32) as u32
        }

        fn next_u64(&mut self) -> u64 {
            self.0.pop_front().unwrap_or(0)
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            for chunk in dest.chunks_mut(8) {
                let bytes = self.next_u64().to_le_bytes();
                chunk.copy_from_slice(&bytes[..chunk.len()]);
            }
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    async fn unreachable_addr() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        addr
    }

    #[test]
    fn test_duplicate_hosts_preserved() {
        for n in 1..=5 {
            let hosts = vec!["localhost:6379".to_string(); n];
            let pool = MultiHostPool::new(hosts, None, PoolConfig::default()).unwrap();
            assert_eq!(pool.hosts().len(), n);
            assert_eq!(pool.registry_len(), 0);
        }
    }

    #[test]
    fn test_empty_host_list_rejected() {
        let err = MultiHostPool::new(vec![], None, PoolConfig::default()).unwrap_err();
        assert!(matches!(err, PoolError::Config(_)));

        let hosts = vec!["a:1".to_string(), " ".to_string()];
        let err = MultiHostPool::new(hosts, None, PoolConfig::default()).unwrap_err();
        assert!(matches!(err, PoolError::Config(_)));
    }

    #[test]
    fn test_close_empty_pool() {
        let pool =
            MultiHostPool::new(vec!["a:1".to_string()], None, PoolConfig::default()).unwrap();
        assert!(pool.close().is_ok());
    }

    #[tokio::test]
    async fn test_single_host_reuses_one_sub_pool() {
        let server = FakeServer::start().await;
        let pool =
            MultiHostPool::new(vec![server.addr.clone()], None, PoolConfig::default()).unwrap();

        for _ in 0..10 {
            let mut conn = pool.get().await.unwrap();
            let reply = conn.exchange(&Request::cmd("PING")).await.unwrap();
            assert_eq!(reply, Reply::Status("PONG".to_string()));
        }

        assert_eq!(pool.registry_len(), 1);
        assert!(pool.sub_pool(&server.addr).is_some());
    }

    #[tokio::test]
    async fn test_injected_rng_controls_selection() {
        let server = FakeServer::start().await;
        let dead = unreachable_addr().await;
        let pool = MultiHostPool::with_rng(
            vec![server.addr.clone(), dead.clone()],
            None,
            PoolConfig::default(),
            StepRng::new(0, 0),
        )
        .unwrap();

        for _ in 0..20 {
            assert!(pool.get().await.is_ok());
        }
        assert_eq!(pool.registry_len(), 1);
        assert!(pool.sub_pool(&dead).is_none());
    }

    #[tokio::test]
    async fn test_duplicate_unreachable_host_fails_uniformly() {
        let dead = unreachable_addr().await;
        let hosts = vec![dead.clone(), dead.clone()];
        let pool = MultiHostPool::new(hosts, None, PoolConfig::default()).unwrap();

        for _ in 0..100 {
            match pool.get().await {
                Err(PoolError::Dial { host, .. }) => assert_eq!(host, dead),
                other => panic!("expected dial failure, got {:?}", other),
            }
            assert!(pool.registry_len() <= 1);
        }
        assert_eq!(pool.sub_pool(&dead).unwrap().stats().failed_dials, 100);
    }

    #[tokio::test]
    async fn test_close_aggregates_and_closes_everything() {
        let server = FakeServer::start().await;
        let pool =
            MultiHostPool::new(vec![server.addr.clone()], None, PoolConfig::default()).unwrap();

        let healthy = SingleHostPool::new("hostpool1", None, PoolConfig::default());
        let closed = SingleHostPool::new("hostpool2", None, PoolConfig::default());
        closed.close().unwrap();
        assert!(pool.register_sub_pool(healthy.clone()));
        assert!(pool.register_sub_pool(closed.clone()));

        match pool.close() {
            Err(PoolError::CloseFailed(err)) => {
                assert_eq!(err.hosts().collect::<Vec<_>>(), vec!["hostpool2"]);
                assert!(err.to_string().contains("hostpool2"));
            }
            other => panic!("expected aggregated close failure, got {:?}", other),
        }

        assert!(healthy.is_closed());
        assert!(matches!(healthy.get().await, Err(PoolError::Closed)));
        assert!(matches!(closed.get().await, Err(PoolError::Closed)));
        assert_eq!(pool.registry_len(), 2);

        // Second close reports every sub-pool without panicking
        match pool.close() {
            Err(PoolError::CloseFailed(err)) => assert_eq!(err.failures().len(), 2),
            other => panic!("expected aggregated close failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_register_does_not_replace() {
        let pool =
            MultiHostPool::new(vec!["a:1".to_string()], None, PoolConfig::default()).unwrap();
        assert!(pool.register_sub_pool(SingleHostPool::new("a:1", None, PoolConfig::default())));
        assert!(!pool.register_sub_pool(SingleHostPool::new("a:1", None, PoolConfig::default())));
        assert_eq!(pool.registry_len(), 1);
    }

    #[tokio::test]
    async fn test_hung_host_does_not_block_other_hosts() {
        // Accepts TCP connections but never answers, so AUTH waits out the deadline
        let hung = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let hung_addr = hung.local_addr().unwrap().to_string();
        let server = FakeServer::with_password("secret").await;
        let config = PoolConfig {
            io_timeout: Duration::from_secs(60),
            ..PoolConfig::default()
        };

        let pool = Arc::new(
            MultiHostPool::with_rng(
                vec![hung_addr, server.addr.clone()],
                Some("secret".to_string()),
                config,
                Sequence(VecDeque::from(vec![0, 1 << 63])),
            )
            .unwrap(),
        );

        let stuck = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.get().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let conn = tokio::time::timeout(Duration::from_secs(2), pool.get())
            .await
            .expect("registry lock held across a hung dial")
            .unwrap();
        assert_eq!(conn.host(), server.addr);
        assert_eq!(pool.registry_len(), 2);

        stuck.abort();
    }

    #[tokio::test]
    async fn test_concurrent_gets_create_one_sub_pool() {
        let server = FakeServer::start().await;
        let pool = Arc::new(
            MultiHostPool::new(vec![server.addr.clone(); 3], None, PoolConfig::default()).unwrap(),
        );

        let mut handles = Vec::new();
        for _ in 0..16 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move {
                let mut conn = pool.get().await.unwrap();
                conn.exchange(&Request::cmd("PING")).await.unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Reply::Status("PONG".to_string()));
        }

        assert_eq!(pool.registry_len(), 1);
    }
}
