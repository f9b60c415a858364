//! buddychat Client Core
//!
//! This crate provides the concurrent network layer of a buddychat client:
//! the presence heartbeat against the directory, the inbound connection
//! listener, the peer session handshake and relay, and the shared client
//! state they coordinate through. The interactive menu lives in
//! `buddychat-cli`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod directory;
pub mod errors;
pub mod listener;
pub mod presence;
pub mod protocol;
pub mod session;
pub mod state;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{ClientConfig, DirectoryConfig, PeerConfig, PresenceConfig};
pub use directory::DirectoryClient;
pub use errors::{BuddyError, BuddyResult, ProtocolError, SessionError, TransportError};
pub use listener::{ConnectionListener, PendingConnection, PendingConnections};
pub use presence::{HeartbeatOutcome, PresenceService};
pub use protocol::{DirectoryRequest, DirectoryResponse, PollReply, PresenceRequest};
pub use session::{
    HandshakeOutcome, PeerSession, SessionEnd, SessionEvent, SessionRole, SessionState,
};
pub use state::ClientState;
pub use types::{LocalIdentity, PeerRecord, PresenceStatus};
