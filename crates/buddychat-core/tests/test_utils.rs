//! Test utilities for driving the client core over loopback sockets
//!
//! Stub directories and stub peers stand in for the external collaborators
//! so presence and session behavior can be checked end to end.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use buddychat_core::PresenceConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

// ----------------------------------------------------------------------------
// Stub Directory
// ----------------------------------------------------------------------------

/// UDP directory that records every datagram, keeps the last announced
/// status per user and answers `GET` with a fixed reply (or not at all)
pub struct StubDirectory {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    statuses: Arc<Mutex<HashMap<String, String>>>,
    task: JoinHandle<()>,
}

impl StubDirectory {
    /// Start a directory. `None` means poll requests are never answered.
    pub async fn start(reply: Option<&str>) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let statuses = Arc::new(Mutex::new(HashMap::new()));
        let reply = reply.map(str::to_string);

        let task = {
            let received = received.clone();
            let statuses = statuses.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 2048];
                loop {
                    let (len, from) = match socket.recv_from(&mut buf).await {
                        Ok(got) => got,
                        Err(_) => return,
                    };
                    let datagram = String::from_utf8_lossy(&buf[..len]).into_owned();
                    received.lock().await.push(datagram.clone());
                    let tokens: Vec<&str> = datagram.split_whitespace().collect();
                    match tokens.first().copied() {
                        Some("SET") if tokens.len() >= 5 => {
                            statuses
                                .lock()
                                .await
                                .insert(tokens[1].to_string(), tokens[2..].join(" "));
                        }
                        Some("GET") => {
                            if let Some(reply) = &reply {
                                let _ = socket.send_to(reply.as_bytes(), from).await;
                            }
                        }
                        _ => {}
                    }
                }
            })
        };

        Self {
            addr,
            received,
            statuses,
            task,
        }
    }

    pub async fn received(&self) -> Vec<String> {
        self.received.lock().await.clone()
    }

    /// Last announced `code word port` for a user
    pub async fn status_of(&self, user_id: &str) -> Option<String> {
        self.statuses.lock().await.get(user_id).cloned()
    }

    pub async fn status_count(&self) -> usize {
        self.statuses.lock().await.len()
    }

    /// Wait until a datagram satisfying `pred` has been recorded. Statuses
    /// are updated right after recording, so allow a short settle after this.
    pub async fn wait_for<F>(&self, pred: F, within: Duration) -> bool
    where
        F: Fn(&str) -> bool,
    {
        let deadline = tokio::time::Instant::now() + within;
        while tokio::time::Instant::now() < deadline {
            if self.received.lock().await.iter().any(|d| pred(d.as_str())) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

impl Drop for StubDirectory {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Presence timing short enough for tests
pub fn fast_presence() -> PresenceConfig {
    PresenceConfig {
        heartbeat_interval_secs: 1,
        poll_timeout_secs: 1,
        max_datagram_size: 1024,
    }
}

// ----------------------------------------------------------------------------
// Stub Peers
// ----------------------------------------------------------------------------

/// Peer that accepts one dial, writes `ACCEPT` and then collects every byte
/// it reads until end-of-stream
pub async fn accepting_peer() -> (SocketAddr, JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(b"ACCEPT\n").await.unwrap();
        let mut collected = Vec::new();
        stream.read_to_end(&mut collected).await.unwrap();
        collected
    });
    (addr, handle)
}

/// Peer that accepts one dial and closes it without writing anything
pub async fn rejecting_peer() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
    });
    (addr, handle)
}
