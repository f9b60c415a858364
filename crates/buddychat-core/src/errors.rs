//! Error types for the buddychat client core
//!
//! This module contains the error types used by the presence, listener,
//! session and directory components, and the `BuddyError` type that
//! unifies them. Every variant describes a local outcome: none of these
//! errors is meant to bring the process down.

use std::io;
use std::net::SocketAddr;

use tokio_util::codec::LinesCodecError;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Socket setup and network I/O failures
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to bind {what} on {addr}: {source}")]
    Bind {
        what: &'static str,
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to resolve {host}: {reason}")]
    Resolve { host: String, reason: String },
    #[error("Connection to {addr} failed: {source}")]
    ConnectionFailed {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("Send to {addr} failed: {source}")]
    Send {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("Receive failed: {0}")]
    Receive(#[source] io::Error),
    #[error("Timed out after {duration_ms}ms waiting for {operation}")]
    Timeout {
        operation: &'static str,
        duration_ms: u64,
    },
    #[error("Connection closed before {expected} arrived")]
    UnexpectedEof { expected: &'static str },
    #[error("Network I/O error: {0}")]
    NetworkIo(#[from] io::Error),
}

/// Peer session failures
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Buddy {peer_id} is not in the buddy list")]
    PeerUnknown { peer_id: String },
    #[error("Buddy {peer_id} is not online")]
    PeerOffline { peer_id: String },
    #[error("Session state invalid: expected {expected}, got {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("Line framing error: {0}")]
    Codec(#[from] LinesCodecError),
}

/// Malformed protocol input
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Status line has {tokens} tokens, expected at least 5: {line:?}")]
    ShortStatusLine { line: String, tokens: usize },
    #[error("Invalid {field} in status line: {value:?}")]
    InvalidStatusField { field: &'static str, value: String },
    #[error("Directory response has no status code: {line:?}")]
    MissingResponseCode { line: String },
    #[error("Empty directory response")]
    EmptyResponse,
}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Unified error type for the buddychat core
#[derive(Debug, thiserror::Error)]
pub enum BuddyError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Must register or login first")]
    NotLoggedIn,

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl From<io::Error> for BuddyError {
    fn from(err: io::Error) -> Self {
        BuddyError::Transport(TransportError::NetworkIo(err))
    }
}

impl From<LinesCodecError> for BuddyError {
    fn from(err: LinesCodecError) -> Self {
        BuddyError::Session(SessionError::Codec(err))
    }
}

/// Result type for buddychat core operations
pub type BuddyResult<T> = core::result::Result<T, BuddyError>;

impl BuddyError {
    /// True for failures that the next heartbeat or user action may not hit again
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BuddyError::Transport(
                TransportError::Send { .. }
                    | TransportError::Receive(_)
                    | TransportError::Timeout { .. }
                    | TransportError::ConnectionFailed { .. }
                    | TransportError::Resolve { .. }
            )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_converts_to_transport() {
        let err: BuddyError = io::Error::new(io::ErrorKind::BrokenPipe, "pipe").into();
        assert!(matches!(
            err,
            BuddyError::Transport(TransportError::NetworkIo(_))
        ));
    }

    #[test]
    fn test_transient_classification() {
        let timeout = BuddyError::Transport(TransportError::Timeout {
            operation: "poll reply",
            duration_ms: 5000,
        });
        assert!(timeout.is_transient());

        let offline = BuddyError::Session(SessionError::PeerOffline {
            peer_id: "alice".to_string(),
        });
        assert!(!offline.is_transient());
    }

    #[test]
    fn test_error_messages() {
        let err = BuddyError::Session(SessionError::PeerUnknown {
            peer_id: "bob".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Session error: Buddy bob is not in the buddy list"
        );
    }
}
