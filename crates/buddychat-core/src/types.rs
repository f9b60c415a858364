//! Core data types: peer records, presence status and local identity

use std::fmt;

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Presence Status
// ----------------------------------------------------------------------------

/// Status code the directory uses for an online client
pub const ONLINE_CODE: u16 = 100;
/// Status code the directory uses for an offline client
pub const OFFLINE_CODE: u16 = 101;

/// Local presence status announced to the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl PresenceStatus {
    /// Numeric status code
    pub fn code(self) -> u16 {
        match self {
            PresenceStatus::Online => ONLINE_CODE,
            PresenceStatus::Offline => OFFLINE_CODE,
        }
    }

    /// Single-word status text
    pub fn text(self) -> &'static str {
        match self {
            PresenceStatus::Online => "ONLINE",
            PresenceStatus::Offline => "OFFLINE",
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.text())
    }
}

// ----------------------------------------------------------------------------
// Local Identity
// ----------------------------------------------------------------------------

/// Who this client is logged in as, and what it announces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub user_id: String,
    pub status: PresenceStatus,
}

impl LocalIdentity {
    pub fn new(user_id: impl Into<String>, status: PresenceStatus) -> Self {
        Self {
            user_id: user_id.into(),
            status,
        }
    }

    /// Same user with a different status
    pub fn with_status(&self, status: PresenceStatus) -> Self {
        Self {
            user_id: self.user_id.clone(),
            status,
        }
    }
}

// ----------------------------------------------------------------------------
// Peer Record
// ----------------------------------------------------------------------------

/// Last-known status of one tracked buddy, as reported by the directory.
///
/// Records are never mutated; a poll produces a fresh collection that
/// replaces the previous one wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerRecord {
    pub peer_id: String,
    pub status_code: u16,
    pub status_text: String,
    pub address: String,
    pub port: u16,
}

impl PeerRecord {
    pub fn new(
        peer_id: impl Into<String>,
        status_code: u16,
        status_text: impl Into<String>,
        address: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            peer_id: peer_id.into(),
            status_code,
            status_text: status_text.into(),
            address: address.into(),
            port,
        }
    }

    /// Whether the directory reports this buddy online
    pub fn is_online(&self) -> bool {
        self.status_code == ONLINE_CODE
    }

    /// `host:port` string suitable for dialing
    pub fn dial_target(&self) -> String {
        // Bare IPv6 literals need brackets to carry a port
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

/// Buddy list rendering: `id<TAB>code text<TAB>address<TAB>port`
impl fmt::Display for PeerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{} {}\t{}\t{}",
            self.peer_id, self.status_code, self.status_text, self.address, self.port
        )
    }
}
