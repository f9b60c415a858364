//! Peer session: handshake and message relay
//!
//! A session turns a raw bidirectional byte stream into a negotiated,
//! line-oriented chat:
//!
//! ```text
//! IDLE -> CONNECTING -> ACCEPTED -> MESSAGING -> CLOSED
//!                    \-> REJECTED
//! IDLE -> MESSAGING            (acceptor, after writing ACCEPT)
//! ```
//!
//! Once in MESSAGING two relays share the connection: a spawned inbound
//! relay forwards peer lines to the display channel, and the outbound relay
//! (driven by the caller's task) sends local input lines until the quit
//! sentinel, end of local input, or peer disconnect. A session is not
//! reusable after CLOSED.

use std::fmt;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};

use crate::errors::{BuddyResult, SessionError, TransportError};
use crate::protocol::handshake::{self, ACCEPT_TOKEN};
use crate::state::ClientState;
use crate::types::PeerRecord;

// ----------------------------------------------------------------------------
// Session Types
// ----------------------------------------------------------------------------

/// Which side of the handshake this session plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Local user dialed the peer
    Initiator,
    /// Peer dialed us and the local user accepted
    Acceptor,
}

/// Handshake and relay lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Accepted,
    Rejected,
    Messaging,
    Closed,
}

impl SessionState {
    pub fn name(self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Connecting => "Connecting",
            SessionState::Accepted => "Accepted",
            SessionState::Rejected => "Rejected",
            SessionState::Messaging => "Messaging",
            SessionState::Closed => "Closed",
        }
    }

    fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Idle, Messaging)
                | (Connecting, Accepted)
                | (Connecting, Rejected)
                | (Accepted, Messaging)
                | (Messaging, Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the acceptor answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeOutcome {
    Accepted,
    Rejected,
}

/// Why a messaging session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Local user typed the quit sentinel
    LocalQuit,
    /// Peer closed the connection or a read/write failed
    PeerDisconnected,
    /// Local input stream ended
    InputClosed,
}

/// Output of the inbound relay, for the display
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    MessageReceived(String),
    PeerDisconnected,
}

// ----------------------------------------------------------------------------
// Peer Session
// ----------------------------------------------------------------------------

/// A single chat session over one exclusively owned connection
pub struct PeerSession<S> {
    role: SessionRole,
    state: SessionState,
    peer: String,
    max_line_length: usize,
    framed: Option<Framed<S, LinesCodec>>,
}

impl<S> fmt::Debug for PeerSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerSession")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("peer", &self.peer)
            .field("connected", &self.framed.is_some())
            .finish()
    }
}

impl PeerSession<TcpStream> {
    /// Initiator path: resolve `peer_id` against the current buddy list and
    /// dial it. Unknown and offline buddies fail before any connection is made.
    pub async fn dial(
        state: &ClientState,
        peer_id: &str,
        max_line_length: usize,
    ) -> BuddyResult<Self> {
        let record = Self::lookup(state, peer_id)?;
        Self::connect(&record, max_line_length).await
    }

    /// Find a buddy that can be dialed right now
    pub fn lookup(state: &ClientState, peer_id: &str) -> BuddyResult<PeerRecord> {
        let record = state
            .find_peer(peer_id)
            .ok_or_else(|| SessionError::PeerUnknown {
                peer_id: peer_id.to_string(),
            })?;
        if !record.is_online() {
            return Err(SessionError::PeerOffline {
                peer_id: peer_id.to_string(),
            }
            .into());
        }
        Ok(record)
    }

    /// Open the connection to a looked-up buddy; the session is left in
    /// CONNECTING, waiting for the buddy's answer
    pub async fn connect(record: &PeerRecord, max_line_length: usize) -> BuddyResult<Self> {
        let mut session = Self::new(SessionRole::Initiator, &record.peer_id, max_line_length);
        session.transition(SessionState::Connecting)?;

        let target = record.dial_target();
        info!("Dialing {} at {}", record.peer_id, target);
        let stream = TcpStream::connect(target.as_str())
            .await
            .map_err(|source| TransportError::ConnectionFailed {
                addr: target.clone(),
                source,
            })?;

        session.framed = Some(Framed::new(stream, handshake::line_codec(max_line_length)));
        Ok(session)
    }
}

impl<S> PeerSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn new(role: SessionRole, peer: &str, max_line_length: usize) -> Self {
        Self {
            role,
            state: SessionState::Idle,
            peer: peer.to_string(),
            max_line_length,
            framed: None,
        }
    }

    /// Initiator over an already connected stream, waiting for the answer
    pub fn initiator(stream: S, peer: &str, max_line_length: usize) -> Self {
        let mut session = Self::new(SessionRole::Initiator, peer, max_line_length);
        session.state = SessionState::Connecting;
        session.framed = Some(Framed::new(stream, handshake::line_codec(max_line_length)));
        session
    }

    /// Acceptor path, accepted: write `ACCEPT` and go straight to MESSAGING
    pub async fn accept(stream: S, peer: &str, max_line_length: usize) -> BuddyResult<Self> {
        let mut session = Self::new(SessionRole::Acceptor, peer, max_line_length);
        let mut framed = Framed::new(stream, handshake::line_codec(max_line_length));
        framed.send(ACCEPT_TOKEN).await?;
        session.framed = Some(framed);
        session.transition(SessionState::Messaging)?;
        info!("Accepted chat from {}", peer);
        Ok(session)
    }

    /// Acceptor path, rejected: close without writing anything. The dialer
    /// sees end-of-stream, which is the whole rejection signal.
    pub async fn reject(mut stream: S, peer: &str) {
        if let Err(e) = stream.shutdown().await {
            debug!("Shutdown while rejecting {} failed: {}", peer, e);
        }
        info!("Rejected chat from {}", peer);
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// True once the connection has been given up
    pub fn is_released(&self) -> bool {
        self.framed.is_none()
    }

    /// Initiator: read exactly one line. `ACCEPT` moves to MESSAGING; end of
    /// stream (or anything else) is a rejection and releases the connection.
    pub async fn await_acceptance(&mut self) -> BuddyResult<HandshakeOutcome> {
        self.expect_state(SessionState::Connecting)?;
        let framed = self.framed.as_mut().ok_or(SessionError::InvalidState {
            expected: "connected",
            actual: "released",
        })?;

        let accepted = match framed.next().await {
            Some(Ok(line)) if handshake::is_accept(&line) => true,
            Some(Ok(line)) => {
                warn!("{} answered {:?} instead of {}", self.peer, line, ACCEPT_TOKEN);
                false
            }
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                warn!("{} sent an oversized handshake line", self.peer);
                false
            }
            Some(Err(LinesCodecError::Io(e))) => {
                debug!("Connection to {} failed before handshake: {}", self.peer, e);
                false
            }
            None => false,
        };

        if accepted {
            self.transition(SessionState::Accepted)?;
            self.transition(SessionState::Messaging)?;
            info!("{} accepted the chat", self.peer);
            Ok(HandshakeOutcome::Accepted)
        } else {
            self.transition(SessionState::Rejected)?;
            self.framed = None;
            info!("{} rejected the chat", self.peer);
            Ok(HandshakeOutcome::Rejected)
        }
    }

    /// Relay lines in both directions until the session ends.
    ///
    /// Inbound lines go to `events` from a spawned task. Lines from `input`
    /// are sent verbatim, except the quit sentinel, which is never sent and
    /// closes the connection instead. A peer disconnect also ends the session.
    pub async fn run(
        &mut self,
        input: &mut mpsc::Receiver<String>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> BuddyResult<SessionEnd> {
        self.expect_state(SessionState::Messaging)?;
        let framed = self.framed.take().ok_or(SessionError::InvalidState {
            expected: "connected",
            actual: "released",
        })?;

        let (mut sink, lines) = framed.split::<String>();
        let mut inbound = tokio::spawn(relay_inbound(lines, events, self.peer.clone()));
        let mut inbound_done = false;

        let end = loop {
            tokio::select! {
                line = input.recv() => match line {
                    Some(line) if handshake::is_quit(&line) => break SessionEnd::LocalQuit,
                    Some(line) => {
                        if let Err(e) = sink.send(line).await {
                            debug!("Send to {} failed: {}", self.peer, e);
                            break SessionEnd::PeerDisconnected;
                        }
                    }
                    None => break SessionEnd::InputClosed,
                },
                _ = &mut inbound => {
                    inbound_done = true;
                    break SessionEnd::PeerDisconnected;
                }
            }
        };

        // Half-close first so the peer's inbound relay sees end-of-stream
        if let Err(e) = sink.close().await {
            debug!("Closing connection to {} failed: {}", self.peer, e);
        }
        if !inbound_done {
            inbound.abort();
            let _ = inbound.await;
        }
        drop(sink);

        self.transition(SessionState::Closed)?;
        info!("Chat with {} closed ({:?})", self.peer, end);
        Ok(end)
    }

    fn expect_state(&self, expected: SessionState) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                expected: expected.name(),
                actual: self.state.name(),
            })
        }
    }

    fn transition(&mut self, next: SessionState) -> Result<(), SessionError> {
        if !self.state.can_transition_to(next) {
            return Err(SessionError::InvalidState {
                expected: next.name(),
                actual: self.state.name(),
            });
        }
        debug!("Session with {}: {} -> {}", self.peer, self.state, next);
        self.state = next;
        Ok(())
    }
}

/// Forward peer lines until end-of-stream. A disconnect is a normal end.
async fn relay_inbound<R>(
    mut lines: R,
    events: mpsc::UnboundedSender<SessionEvent>,
    peer: String,
) where
    R: futures::Stream<Item = Result<String, LinesCodecError>> + Unpin,
{
    while let Some(next) = lines.next().await {
        match next {
            Ok(line) => {
                if events.send(SessionEvent::MessageReceived(line)).is_err() {
                    debug!("Display for {} went away", peer);
                    return;
                }
            }
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                warn!("Dropping oversized line from {}", peer);
            }
            Err(LinesCodecError::Io(e)) => {
                debug!("Read from {} failed: {}", peer, e);
                break;
            }
        }
    }
    let _ = events.send(SessionEvent::PeerDisconnected);
}
