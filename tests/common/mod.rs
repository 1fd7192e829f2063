//! In-process stand-in for a server
//!
//! Shared by the integration tests and, through a `#[path]` include in
//! `src/lib.rs`, by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

#[derive(Default)]
pub struct Counters {
    pub accepted: AtomicUsize,
    pub pings: AtomicUsize,
    pub auths: AtomicUsize,
}

pub struct FakeServer {
    pub addr: String,
    pub counters: Arc<Counters>,
}

impl FakeServer {
    pub async fn start() -> Self {
        Self::spawn(None).await
    }

    pub async fn with_password(password: &str) -> Self {
        Self::spawn(Some(password.to_string())).await
    }

    pub fn pings(&self) -> usize {
        self.counters.pings.load(Ordering::SeqCst)
    }

    pub fn accepted(&self) -> usize {
        self.counters.accepted.load(Ordering::SeqCst)
    }

    async fn spawn(password: Option<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let counters = Arc::new(Counters::default());

        let shared = Arc::clone(&counters);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                shared.accepted.fetch_add(1, Ordering::SeqCst);
                let counters = Arc::clone(&shared);
                let password = password.clone();
                tokio::spawn(async move {
                    let (read, mut write) = socket.into_split();
                    let mut lines = BufReader::new(read).lines();
                    let mut authed = password.is_none();
                    loop {
                        let Ok(Some(header)) = lines.next_line().await else {
                            return;
                        };
                        let count: usize =
                            header.trim_start_matches('*').parse().unwrap_or(0);
                        let mut args = Vec::with_capacity(count);
                        for _ in 0..count {
                            let _len = lines.next_line().await;
                            match lines.next_line().await {
                                Ok(Some(arg)) => args.push(arg),
                                _ => return,
                            }
                        }
                        let cmd = args.first().map(|s| s.to_uppercase()).unwrap_or_default();
                        let reply: Vec<u8> = match cmd.as_str() {
                            "AUTH" => {
                                counters.auths.fetch_add(1, Ordering::SeqCst);
                                if password.as_deref() == args.get(1).map(String::as_str) {
                                    authed = true;
                                    b"+OK\r\n".to_vec()
                                } else {
                                    b"-WRONGPASS invalid password\r\n".to_vec()
                                }
                            }
                            _ if !authed => b"-NOAUTH Authentication required.\r\n".to_vec(),
                            "PING" => {
                                counters.pings.fetch_add(1, Ordering::SeqCst);
                                b"+PONG\r\n".to_vec()
                            }
                            "ECHO" => {
                                let arg = args.get(1).cloned().unwrap_or_default();
                                format!("${}\r\n{}\r\n", arg.len(), arg).into_bytes()
                            }
                            // Acknowledge, then keep the socket open without ever replying again
                            "HANG" => {
                                let _ = write.write_all(b"+OK\r\n").await;
                                std::future::pending::<()>().await;
                                return;
                            }
                            "QUIT" => {
                                let _ = write.write_all(b"+OK\r\n").await;
                                return;
                            }
                            _ => format!("-ERR unknown command '{}'\r\n", cmd).into_bytes(),
                        };
                        if write.write_all(&reply).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });

        Self { addr, counters }
    }
}
