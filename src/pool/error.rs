use crate::protocol::ProtocolError;
use std::fmt;

/// Error types for connection pool operations
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Failed to connect to {host}: {source}")]
    Dial {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out connecting to {0}")]
    DialTimeout(String),

    #[error("Authentication failed for {host}: {reason}")]
    Auth { host: String, reason: String },

    #[error("Connection is unhealthy: {0}")]
    Unhealthy(String),

    #[error("Connection pool is closed")]
    Closed,

    #[error("Connection pool is already closed")]
    AlreadyClosed,

    #[error("Invalid pool configuration: {0}")]
    Config(String),

    #[error(transparent)]
    CloseFailed(#[from] CloseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// One sub-pool that failed to close
#[derive(Debug)]
pub struct HostCloseFailure {
    pub host: String,
    pub cause: Box<PoolError>,
}

/// Every close failure collected while closing a multi-host pool
#[derive(Debug)]
pub struct CloseError {
    failures: Vec<HostCloseFailure>,
}

impl CloseError {
    pub(crate) fn new(failures: Vec<HostCloseFailure>) -> Self {
        Self { failures }
    }

    pub fn failures(&self) -> &[HostCloseFailure] {
        &self.failures
    }

    /// Hosts whose sub-pool failed to close, in the order they were visited
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.host.as_str())
    }
}

impl fmt::Display for CloseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to close {} pool(s):", self.failures.len())?;
        for failure in &self.failures {
            write!(f, " [{}: {}]", failure.host, failure.cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for CloseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|f| f.cause.as_ref() as &(dyn std::error::Error + 'static))
    }
}
