//! Physical connections and the dialer that creates them
//!
//! A [`Dialer`] is bound to one [`Endpoint`]. Every pool miss calls
//! [`Dialer::dial`], which connects, tunes the socket, and authenticates
//! before the connection is handed to anyone.

use crate::pool::error::PoolError;
use crate::protocol::{Reply, Request};
use bytes::BytesMut;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Idle connections retained per host when no explicit limit is configured
pub const DEFAULT_MAX_IDLE: usize = 500;

/// Idle time after which a borrowed connection is pinged before use
pub const DEFAULT_TEST_ON_BORROW_AFTER: Duration = Duration::from_millis(1);

/// Default TCP connect deadline, also the default reply deadline
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for connection pool behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of idle connections kept per host
    pub max_idle: usize,

    /// Idle connections older than this are health-checked when borrowed
    pub test_on_borrow_after: Duration,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Deadline for the AUTH reply on a new connection and for borrow-time pings
    pub io_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: DEFAULT_MAX_IDLE,
            test_on_borrow_after: DEFAULT_TEST_ON_BORROW_AFTER,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// One server address plus optional credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub credential: Option<String>,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, credential: Option<String>) -> Self {
        Self {
            host: host.into(),
            credential,
        }
    }
}

/// An open, authenticated channel to one server
pub struct Connection {
    host: String,
    stream: TcpStream,
    read_buf: BytesMut,
    broken: bool,
    created_at: Instant,
}

impl Connection {
    fn new(host: String, stream: TcpStream) -> Self {
        Self {
            host,
            stream,
            read_buf: BytesMut::with_capacity(4096),
            broken: false,
            created_at: Instant::now(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// True once a transport or framing error has been seen on this connection
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Flag the connection so it is dropped instead of returned to a pool
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Send one request and read exactly one reply.
    ///
    /// Error replies from the server come back as [`Reply::Error`]. Any I/O or
    /// framing failure marks the connection broken so the pool drops it.
    pub async fn exchange(&mut self, request: &Request) -> Result<Reply, PoolError> {
        let result = self.exchange_inner(request).await;
        if result.is_err() {
            self.broken = true;
        }
        result
    }

    async fn exchange_inner(&mut self, request: &Request) -> Result<Reply, PoolError> {
        let mut out = BytesMut::new();
        request.encode(&mut out);
        self.stream.write_all(&out).await?;
        self.stream.flush().await?;

        loop {
            if let Some((reply, used)) = Reply::parse(&self.read_buf)? {
                let _ = self.read_buf.split_to(used);
                return Ok(reply);
            }
            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(PoolError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("connection to {} closed by peer", self.host),
                )));
            }
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.host)
            .field("broken", &self.broken)
            .finish()
    }
}

/// Opens new connections to a single endpoint
#[derive(Debug, Clone)]
pub struct Dialer {
    endpoint: Endpoint,
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl Dialer {
    pub fn new(endpoint: Endpoint, config: &PoolConfig) -> Self {
        Self {
            endpoint,
            connect_timeout: config.connect_timeout,
            io_timeout: config.io_timeout,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Connect and, when a credential is configured, authenticate.
    ///
    /// A connect failure is returned without attempting authentication. A
    /// rejected credential drops the connection and returns
    /// [`PoolError::Auth`]; no AUTH reply within `io_timeout` returns
    /// [`PoolError::DialTimeout`].
    pub async fn dial(&self) -> Result<Connection, PoolError> {
        let host = &self.endpoint.host;
        debug!(host = %host, "Dialing new connection");

        let connect = TcpStream::connect(host.as_str());
        let stream = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| PoolError::DialTimeout(host.clone()))?
            .map_err(|source| PoolError::Dial {
                host: host.clone(),
                source,
            })?;

        stream.set_nodelay(true)?;
        socket2::SockRef::from(&stream).set_keepalive(true)?;

        let mut conn = Connection::new(host.clone(), stream);

        if let Some(credential) = &self.endpoint.credential {
            let auth = Request::cmd("AUTH").arg(credential.clone());
            match tokio::time::timeout(self.io_timeout, conn.exchange(&auth)).await {
                Err(_) => return Err(PoolError::DialTimeout(host.clone())),
                Ok(Ok(Reply::Error(reason))) => {
                    return Err(PoolError::Auth {
                        host: host.clone(),
                        reason,
                    })
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    return Err(PoolError::Auth {
                        host: host.clone(),
                        reason: e.to_string(),
                    })
                }
            }
        }

        info!(
            host = %host,
            authenticated = self.endpoint.credential.is_some(),
            "Created new connection"
        );
        Ok(conn)
    }
}
