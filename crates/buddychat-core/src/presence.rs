//! Presence heartbeat
//!
//! `PresenceService` owns this client's UDP socket. Every cycle it sleeps
//! for the heartbeat interval, then (when logged in) announces the local
//! status, polls the directory for the buddy list and waits a bounded time
//! for the reply. A parsed reply replaces the whole buddy list; a missing
//! reply leaves the previous list in place.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::{lookup_host, UdpSocket};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, PresenceConfig};
use crate::errors::{BuddyResult, TransportError};
use crate::protocol::presence::{parse_poll_reply, PresenceRequest};
use crate::state::ClientState;

/// What one heartbeat cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// Not logged in, nothing sent
    Skipped,
    /// Reply parsed and swapped in
    Updated { peers: usize, discarded: usize },
    /// No reply before the poll timeout; the buddy list is unchanged
    TimedOut,
}

/// Periodic announce and poll against the directory's UDP port
#[derive(Debug)]
pub struct PresenceService {
    socket: UdpSocket,
    directory: SocketAddr,
    config: PresenceConfig,
    listen_port: u16,
    state: Arc<ClientState>,
}

impl PresenceService {
    /// Resolve the directory's presence endpoint and bind a local socket of
    /// the same address family
    pub async fn bind(config: &ClientConfig, state: Arc<ClientState>) -> BuddyResult<Self> {
        let directory = resolve(&config.directory.udp_endpoint()).await?;
        Self::bind_to(
            directory,
            config.presence.clone(),
            config.peer.listen_port,
            state,
        )
        .await
    }

    /// Bind against an already resolved directory address
    pub async fn bind_to(
        directory: SocketAddr,
        config: PresenceConfig,
        listen_port: u16,
        state: Arc<ClientState>,
    ) -> BuddyResult<Self> {
        let local = if directory.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| TransportError::Bind {
                what: "presence socket",
                addr: local.to_string(),
                source,
            })?;

        Ok(Self {
            socket,
            directory,
            config,
            listen_port,
            state,
        })
    }

    pub fn directory_addr(&self) -> SocketAddr {
        self.directory
    }

    /// Heartbeat until shutdown. A failed cycle is logged and the next one
    /// runs on schedule. On the way out the current status is announced
    /// once more, so a logout set just before shutdown reaches the directory.
    pub async fn run(self) -> BuddyResult<()> {
        info!(
            "Presence service starting (directory {}, every {:?})",
            self.directory,
            self.config.heartbeat_interval()
        );

        while self.state.is_running() {
            tokio::select! {
                _ = tokio::time::sleep(self.config.heartbeat_interval()) => {}
                _ = self.state.stopped() => break,
            }

            tokio::select! {
                outcome = self.heartbeat() => match outcome {
                    Ok(HeartbeatOutcome::Updated { peers, discarded }) => {
                        debug!("Buddy list updated: {} records, {} lines dropped", peers, discarded);
                    }
                    Ok(HeartbeatOutcome::TimedOut) => {
                        debug!("No poll reply within {:?}, keeping buddy list", self.config.poll_timeout());
                    }
                    Ok(HeartbeatOutcome::Skipped) => {}
                    Err(e) => warn!("Presence heartbeat failed: {}", e),
                },
                _ = self.state.stopped() => break,
            }
        }

        if let Err(e) = self.announce().await {
            debug!("Final status announce failed: {}", e);
        }
        info!("Presence service stopped");
        Ok(())
    }

    /// One announce + poll cycle
    pub async fn heartbeat(&self) -> BuddyResult<HeartbeatOutcome> {
        let identity = match self.state.identity() {
            Some(identity) => identity,
            None => return Ok(HeartbeatOutcome::Skipped),
        };

        self.announce().await?;
        self.discard_stale_replies();
        self.send(&PresenceRequest::Poll {
            peer_id: identity.user_id.clone(),
        })
        .await?;

        match self.receive_reply().await? {
            Some(reply) => {
                let parsed = parse_poll_reply(&reply);
                let outcome = HeartbeatOutcome::Updated {
                    peers: parsed.records.len(),
                    discarded: parsed.discarded,
                };
                self.state.replace_peers(parsed.records);
                Ok(outcome)
            }
            None => Ok(HeartbeatOutcome::TimedOut),
        }
    }

    /// Send `SET` for the current identity, if any
    pub async fn announce(&self) -> BuddyResult<()> {
        if let Some(identity) = self.state.identity() {
            self.send(&PresenceRequest::Announce {
                peer_id: identity.user_id.clone(),
                status: identity.status,
                listen_port: self.listen_port,
            })
            .await?;
        }
        Ok(())
    }

    async fn send(&self, request: &PresenceRequest) -> BuddyResult<()> {
        let payload = request.encode();
        self.socket
            .send_to(payload.as_bytes(), self.directory)
            .await
            .map_err(|source| TransportError::Send {
                addr: self.directory,
                source,
            })?;
        Ok(())
    }

    /// Drop datagrams already queued on the socket, such as a reply that
    /// arrived after an earlier poll timed out
    fn discard_stale_replies(&self) {
        let mut buf = [0u8; 64];
        loop {
            match self.socket.try_recv_from(&mut buf) {
                Ok((_, from)) => debug!("Discarding stale datagram from {}", from),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    debug!("Stopped discarding stale datagrams: {}", e);
                    break;
                }
            }
        }
    }

    /// Wait for a datagram from the directory until the poll deadline.
    /// Datagrams from anywhere else are ignored.
    async fn receive_reply(&self) -> BuddyResult<Option<String>> {
        let deadline = Instant::now() + self.config.poll_timeout();
        let limit = self.config.max_datagram_size;
        // One spare byte tells a reply that fits exactly from a cut one
        let mut buf = vec![0u8; limit + 1];

        loop {
            match tokio::time::timeout_at(deadline, self.socket.recv_from(&mut buf)).await {
                Err(_) => return Ok(None),
                Ok(Err(e)) => return Err(TransportError::Receive(e).into()),
                Ok(Ok((len, from))) if from == self.directory => {
                    let reply = String::from_utf8_lossy(&buf[..len.min(limit)]).into_owned();
                    if len > limit {
                        return Ok(Some(drop_partial_line(reply, limit)));
                    }
                    return Ok(Some(reply));
                }
                Ok(Ok((_, from))) => debug!("Ignoring datagram from {}", from),
            }
        }
    }
}

/// Cut a truncated reply back to its last complete line
fn drop_partial_line(mut reply: String, limit: usize) -> String {
    if !reply.ends_with('\n') {
        let keep = reply.rfind('\n').map_or(0, |end| end + 1);
        warn!(
            "Poll reply exceeded {} bytes, dropping partial line {:?}",
            limit,
            &reply[keep..]
        );
        reply.truncate(keep);
    }
    reply
}

/// Resolve `host:port`, preferring an IPv4 address
async fn resolve(endpoint: &str) -> BuddyResult<SocketAddr> {
    let addrs: Vec<SocketAddr> = lookup_host(endpoint)
        .await
        .map_err(|e| TransportError::Resolve {
            host: endpoint.to_string(),
            reason: e.to_string(),
        })?
        .collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| {
            TransportError::Resolve {
                host: endpoint.to_string(),
                reason: "no addresses".to_string(),
            }
            .into()
        })
}
