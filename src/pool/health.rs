//! Borrow-time health checking
//!
//! A connection that has sat idle for longer than the configured threshold
//! gets a `PING` round trip before it is handed out. Fresher connections are
//! returned as-is.

use super::connection::Connection;
use super::error::PoolError;
use crate::protocol::{Reply, Request};
use std::time::{Duration, Instant};

/// Whether a connection idle since `idle_since` must be probed before reuse
pub fn needs_probe(idle_since: Instant, threshold: Duration) -> bool {
    idle_since.elapsed() > threshold
}

/// Issue a `PING` and require a non-error reply within `timeout`
///
/// A missed deadline marks the connection broken, since a late `PONG` would
/// otherwise be read as the reply to the next command.
pub async fn probe(conn: &mut Connection, timeout: Duration) -> Result<(), PoolError> {
    let ping = Request::cmd("PING");
    match tokio::time::timeout(timeout, conn.exchange(&ping)).await {
        Err(_) => {
            conn.mark_broken();
            Err(PoolError::Unhealthy(format!("no PING reply within {:?}", timeout)))
        }
        Ok(reply) => match reply? {
            Reply::Error(e) => Err(PoolError::Unhealthy(e)),
            _ => Ok(()),
        },
    }
}
