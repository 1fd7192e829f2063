//! Fixed-endpoint connection pool
//!
//! Idle connections are kept newest-first. Borrowing takes the newest one,
//! pinging it first if it has been idle past the staleness threshold; a failed
//! ping discards it and dials a replacement. Returning a connection that would
//! push the idle count past `max_idle` closes the oldest idle one instead.

use super::connection::{Connection, Dialer, Endpoint, PoolConfig};
use super::error::PoolError;
use super::health;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, warn};

/// Statistics for a connection pool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total connections created
    pub total_created: u64,

    /// Total connections reused from the idle list
    pub total_reused: u64,

    /// Failed dial or authentication attempts
    pub failed_dials: u64,

    /// Liveness probes issued on borrow
    pub probes: u64,

    /// Probes that failed and caused a redial
    pub probe_failures: u64,

    /// Idle connections
    pub idle_connections: usize,
}

struct IdleConnection {
    conn: Connection,
    idle_since: Instant,
}

struct PoolState {
    idle: VecDeque<IdleConnection>,
    closed: bool,
    stats: PoolStats,
}

struct Inner {
    dialer: Dialer,
    config: PoolConfig,
    state: Mutex<PoolState>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, PoolState> {
        // The state stays consistent across a panic, so recover from poisoning
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn put(&self, conn: Connection) {
        let evicted = {
            let mut state = self.state();
            if state.closed || conn.is_broken() {
                debug!(
                    host = %self.dialer.endpoint().host,
                    closed = state.closed,
                    broken = conn.is_broken(),
                    "Discarding returned connection"
                );
                return;
            }
            state.idle.push_front(IdleConnection {
                conn,
                idle_since: Instant::now(),
            });
            let mut evicted = Vec::new();
            while state.idle.len() > self.config.max_idle {
                if let Some(oldest) = state.idle.pop_back() {
                    evicted.push(oldest);
                }
            }
            state.stats.idle_connections = state.idle.len();
            evicted
        };

        if !evicted.is_empty() {
            debug!(
                host = %self.dialer.endpoint().host,
                evicted = evicted.len(),
                "Closed idle connections over max_idle"
            );
        }
    }
}

/// Pool of connections to one endpoint.
///
/// Clones share the same idle list.
#[derive(Clone)]
pub struct SingleHostPool {
    inner: Arc<Inner>,
}

impl SingleHostPool {
    /// Create a pool for `host`, authenticating each new connection with
    /// `credential` when one is given
    pub fn new(host: impl Into<String>, credential: Option<String>, config: PoolConfig) -> Self {
        let dialer = Dialer::new(Endpoint::new(host, credential), &config);
        Self {
            inner: Arc::new(Inner {
                dialer,
                state: Mutex::new(PoolState {
                    idle: VecDeque::with_capacity(config.max_idle.min(64)),
                    closed: false,
                    stats: PoolStats::default(),
                }),
                config,
            }),
        }
    }

    pub fn host(&self) -> &str {
        &self.inner.dialer.endpoint().host
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state().closed
    }

    pub fn idle_count(&self) -> usize {
        self.inner.state().idle.len()
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state();
        let mut stats = state.stats.clone();
        stats.idle_connections = state.idle.len();
        stats
    }

    /// Borrow an idle connection or dial a new one
    pub async fn get(&self) -> Result<PooledConnection, PoolError> {
        let candidate = {
            let mut state = self.inner.state();
            if state.closed {
                return Err(PoolError::Closed);
            }
            state.idle.pop_front()
        };

        if let Some(mut idle) = candidate {
            let config = &self.inner.config;
            if !health::needs_probe(idle.idle_since, config.test_on_borrow_after) {
                self.inner.state().stats.total_reused += 1;
                debug!(
                    host = %self.host(),
                    age_ms = idle.conn.age().as_millis() as u64,
                    "Reusing connection"
                );
                return Ok(self.wrap(idle.conn));
            }

            self.inner.state().stats.probes += 1;
            match health::probe(&mut idle.conn, config.io_timeout).await {
                Ok(()) => {
                    self.inner.state().stats.total_reused += 1;
                    debug!(host = %self.host(), "Reusing connection after probe");
                    return Ok(self.wrap(idle.conn));
                }
                Err(e) => {
                    self.inner.state().stats.probe_failures += 1;
                    warn!(
                        host = %self.host(),
                        error = %e,
                        "Stale connection failed probe, redialing"
                    );
                }
            }
        }

        self.dial().await
    }

    async fn dial(&self) -> Result<PooledConnection, PoolError> {
        match self.inner.dialer.dial().await {
            Ok(conn) => {
                let mut state = self.inner.state();
                if state.closed {
                    return Err(PoolError::Closed);
                }
                state.stats.total_created += 1;
                drop(state);
                Ok(self.wrap(conn))
            }
            Err(e) => {
                self.inner.state().stats.failed_dials += 1;
                Err(e)
            }
        }
    }

    fn wrap(&self, conn: Connection) -> PooledConnection {
        PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
        }
    }

    /// Close every idle connection and refuse further borrows.
    ///
    /// Returns [`PoolError::AlreadyClosed`] on every call after the first.
    pub fn close(&self) -> Result<(), PoolError> {
        let drained: Vec<IdleConnection> = {
            let mut state = self.inner.state();
            if state.closed {
                return Err(PoolError::AlreadyClosed);
            }
            state.closed = true;
            state.stats.idle_connections = 0;
            state.idle.drain(..).collect()
        };

        debug!(host = %self.host(), closed = drained.len(), "Closed pool");
        Ok(())
    }
}

impl std::fmt::Debug for SingleHostPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleHostPool")
            .field("host", &self.host())
            .field("stats", &self.stats())
            .finish()
    }
}

/// A connection checked out of a pool.
///
/// Dropping the guard returns the connection to the pool it came from, unless
/// the connection is broken or the pool has been closed.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<Inner>,
}

impl PooledConnection {
    /// Drop the connection instead of returning it to the pool
    pub fn discard(mut self) {
        self.conn = None;
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // Only `discard` and `drop` take the connection, both consume the guard
        self.conn.as_ref().expect("connection present until guard is consumed")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection present until guard is consumed")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put(conn);
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("conn", &self.conn)
            .finish()
    }
}
