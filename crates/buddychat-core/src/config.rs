//! Client Configuration
//!
//! Fixed values the client needs at startup: where the directory lives, how
//! often to run the presence heartbeat, and which port peers dial us on.
//! The listen port must differ for every client instance sharing a host.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{BuddyError, BuddyResult};

// ----------------------------------------------------------------------------
// Directory Configuration
// ----------------------------------------------------------------------------

/// Location of the directory server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Hostname or IP of the directory
    pub address: String,
    /// TCP port for REG/ADD/DEL requests
    pub tcp_port: u16,
    /// UDP port for SET/GET presence datagrams
    pub udp_port: u16,
    /// Upper bound on one request/response exchange
    pub request_timeout_secs: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            tcp_port: 1234,
            udp_port: 1235,
            request_timeout_secs: 10,
        }
    }
}

impl DirectoryConfig {
    /// `host:port` of the request endpoint
    pub fn tcp_endpoint(&self) -> String {
        endpoint(&self.address, self.tcp_port)
    }

    /// `host:port` of the presence endpoint
    pub fn udp_endpoint(&self) -> String {
        endpoint(&self.address, self.udp_port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn endpoint(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

// ----------------------------------------------------------------------------
// Presence Configuration
// ----------------------------------------------------------------------------

/// Presence heartbeat timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Sleep between heartbeat cycles
    pub heartbeat_interval_secs: u64,
    /// How long one cycle waits for the poll reply
    pub poll_timeout_secs: u64,
    /// Receive buffer for a poll reply datagram; longer replies are truncated
    pub max_datagram_size: usize,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 10,
            poll_timeout_secs: 5,
            max_datagram_size: 1024,
        }
    }
}

impl PresenceConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}

// ----------------------------------------------------------------------------
// Peer Configuration
// ----------------------------------------------------------------------------

/// Peer-to-peer listening and session limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// TCP port peers dial to start a chat
    pub listen_port: u16,
    /// Inbound connections that may wait for a decision at once
    pub pending_capacity: usize,
    /// Longest chat line accepted from a peer, in bytes
    pub max_line_length: usize,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            listen_port: 1247,
            pending_capacity: 4,
            max_line_length: 64 * 1024,
        }
    }
}

// ----------------------------------------------------------------------------
// Client Configuration
// ----------------------------------------------------------------------------

/// Complete network configuration for one client instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub directory: DirectoryConfig,
    pub presence: PresenceConfig,
    pub peer: PeerConfig,
}

impl ClientConfig {
    /// Reject values that would stall or disable a component
    pub fn validate(&self) -> BuddyResult<()> {
        if self.directory.address.trim().is_empty() {
            return Err(BuddyError::Configuration(
                "Directory address must not be empty".to_string(),
            ));
        }
        if self.directory.tcp_port == 0 || self.directory.udp_port == 0 {
            return Err(BuddyError::Configuration(
                "Directory ports must be greater than 0".to_string(),
            ));
        }
        if self.directory.request_timeout_secs == 0 {
            return Err(BuddyError::Configuration(
                "Directory request timeout must be greater than 0".to_string(),
            ));
        }
        if self.presence.heartbeat_interval_secs == 0 {
            return Err(BuddyError::Configuration(
                "Heartbeat interval must be greater than 0".to_string(),
            ));
        }
        if self.presence.poll_timeout_secs == 0 {
            return Err(BuddyError::Configuration(
                "Poll timeout must be greater than 0".to_string(),
            ));
        }
        if self.presence.max_datagram_size == 0 {
            return Err(BuddyError::Configuration(
                "Poll reply buffer must be greater than 0".to_string(),
            ));
        }
        if self.peer.listen_port == 0 {
            return Err(BuddyError::Configuration(
                "Listen port must be greater than 0".to_string(),
            ));
        }
        if self.peer.pending_capacity == 0 {
            return Err(BuddyError::Configuration(
                "Pending connection capacity must be greater than 0".to_string(),
            ));
        }
        if self.peer.max_line_length == 0 {
            return Err(BuddyError::Configuration(
                "Max line length must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
