//! Inbound connection listener
//!
//! The listener owns this client's TCP listening socket. Its only job is to
//! accept: every accepted connection is queued in `PendingConnections` and
//! the command layer is woken to ask the user for a decision. The handshake
//! itself belongs to `PeerSession`.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::errors::{BuddyResult, TransportError};
use crate::state::ClientState;

/// Pause after a failed accept so a persistent failure does not spin
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

// ----------------------------------------------------------------------------
// Pending Connections
// ----------------------------------------------------------------------------

/// An accepted connection waiting for the local accept/reject decision
#[derive(Debug)]
pub struct PendingConnection {
    pub stream: TcpStream,
    pub peer_addr: SocketAddr,
    pub arrived_at: Instant,
}

impl PendingConnection {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        Self {
            stream,
            peer_addr,
            arrived_at: Instant::now(),
        }
    }

    /// Time spent waiting for a decision
    pub fn waited(&self) -> Duration {
        self.arrived_at.elapsed()
    }
}

/// Bounded FIFO of undecided inbound connections.
///
/// The listener is the only producer and the command layer the only
/// consumer. When the queue is full the newcomer is handed back to the
/// listener, which closes it; the dialer reads that as a rejection.
#[derive(Debug)]
pub struct PendingConnections {
    queue: Mutex<VecDeque<PendingConnection>>,
    capacity: usize,
    arrivals: Notify,
}

impl PendingConnections {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            arrivals: Notify::new(),
        }
    }

    /// Queue a connection, or give it back when the queue is full
    pub fn offer(&self, connection: PendingConnection) -> Result<(), PendingConnection> {
        {
            let mut queue = match self.queue.lock() {
                Ok(queue) => queue,
                Err(poisoned) => poisoned.into_inner(),
            };
            if queue.len() >= self.capacity {
                return Err(connection);
            }
            queue.push_back(connection);
        }
        self.arrivals.notify_one();
        Ok(())
    }

    /// Oldest undecided connection. If others are still queued the arrival
    /// signal is raised again, so each of them gets asked about in turn.
    pub fn take(&self) -> Option<PendingConnection> {
        let (taken, remaining) = {
            let mut queue = match self.queue.lock() {
                Ok(queue) => queue,
                Err(poisoned) => poisoned.into_inner(),
            };
            (queue.pop_front(), queue.len())
        };
        if taken.is_some() && remaining > 0 {
            self.arrivals.notify_one();
        }
        taken
    }

    pub fn len(&self) -> usize {
        match self.queue.lock() {
            Ok(queue) => queue.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Wait until a connection is offered. An arrival that happened while
    /// nobody was waiting is remembered, so one is never missed.
    pub async fn arrived(&self) {
        self.arrivals.notified().await;
    }
}

// ----------------------------------------------------------------------------
// Connection Listener
// ----------------------------------------------------------------------------

/// Accept loop over this client's peer listening port
#[derive(Debug)]
pub struct ConnectionListener {
    listener: TcpListener,
    pending: Arc<PendingConnections>,
    state: Arc<ClientState>,
}

impl ConnectionListener {
    /// Bind the listening port on all interfaces. Fails fast if it is taken;
    /// the caller reports the error and carries on without inbound chats.
    pub async fn bind(
        port: u16,
        pending: Arc<PendingConnections>,
        state: Arc<ClientState>,
    ) -> BuddyResult<Self> {
        let listener =
            Self::bind_addr(SocketAddr::from(([0, 0, 0, 0], port)), pending, state).await?;
        info!("Listening for buddy connections on port {}", port);
        Ok(listener)
    }

    /// Bind an explicit address (tests use `127.0.0.1:0`)
    pub async fn bind_addr(
        addr: SocketAddr,
        pending: Arc<PendingConnections>,
        state: Arc<ClientState>,
    ) -> BuddyResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                what: "peer listener",
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self {
            listener,
            pending,
            state,
        })
    }

    pub fn local_addr(&self) -> BuddyResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept until shutdown. The listening socket is closed when this returns.
    pub async fn run(self) -> BuddyResult<()> {
        info!("Connection listener starting");

        while self.state.is_running() {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => self.hand_off(stream, peer_addr),
                    Err(e) => {
                        if !self.state.is_running() {
                            break;
                        }
                        warn!("Accept failed: {}", e);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
                _ = self.state.stopped() => {
                    debug!("Listener observed shutdown");
                    break;
                }
            }
        }

        info!("Connection listener stopped");
        Ok(())
    }

    fn hand_off(&self, stream: TcpStream, peer_addr: SocketAddr) {
        match self.pending.offer(PendingConnection::new(stream, peer_addr)) {
            Ok(()) => info!("Incoming buddy connection from {}", peer_addr),
            Err(rejected) => {
                warn!(
                    "Pending queue full ({}), closing connection from {}",
                    self.pending.capacity(),
                    rejected.peer_addr
                );
                drop(rejected);
            }
        }
    }
}
