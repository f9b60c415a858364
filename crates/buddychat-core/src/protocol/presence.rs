//! Presence datagrams
//!
//! Requests sent to the directory's UDP port:
//!
//! ```text
//! SET <peerId> <statusCode> <statusWord> <listenPort>
//! GET <peerId>
//! ```
//!
//! A poll reply is a single datagram holding zero or more lines of
//! `<peerId> <statusCode> <statusWord> <address> <port>`. Lines that do not
//! parse are dropped one by one; the rest of the batch still counts.

use tracing::debug;

use crate::errors::ProtocolError;
use crate::types::{PeerRecord, PresenceStatus};

// ----------------------------------------------------------------------------
// Requests
// ----------------------------------------------------------------------------

/// Datagrams this client sends to the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceRequest {
    /// Publish our status and the port peers can dial us on
    Announce {
        peer_id: String,
        status: PresenceStatus,
        listen_port: u16,
    },
    /// Ask for the status of everyone on our buddy list
    Poll { peer_id: String },
}

impl PresenceRequest {
    /// Encode as datagram payload. The datagram boundary terminates the
    /// request, so no trailing newline is written.
    pub fn encode(&self) -> String {
        match self {
            PresenceRequest::Announce {
                peer_id,
                status,
                listen_port,
            } => format!("SET {} {} {}", peer_id, status, listen_port),
            PresenceRequest::Poll { peer_id } => format!("GET {}", peer_id),
        }
    }
}

// ----------------------------------------------------------------------------
// Replies
// ----------------------------------------------------------------------------

/// Result of parsing one poll reply datagram
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReply {
    /// Records from every well-formed line, in reply order
    pub records: Vec<PeerRecord>,
    /// Number of non-blank lines that were dropped
    pub discarded: usize,
}

/// Parse a single buddy status line.
///
/// Tokens are split on any whitespace. The first five are used; anything
/// after the port is ignored.
pub fn parse_status_line(line: &str) -> Result<PeerRecord, ProtocolError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 5 {
        return Err(ProtocolError::ShortStatusLine {
            line: line.to_string(),
            tokens: tokens.len(),
        });
    }

    let status_code = tokens[1]
        .parse::<u16>()
        .map_err(|_| ProtocolError::InvalidStatusField {
            field: "status code",
            value: tokens[1].to_string(),
        })?;
    let port = tokens[4]
        .parse::<u16>()
        .map_err(|_| ProtocolError::InvalidStatusField {
            field: "port",
            value: tokens[4].to_string(),
        })?;

    Ok(PeerRecord::new(
        tokens[0], status_code, tokens[2], tokens[3], port,
    ))
}

/// Parse a whole poll reply into peer records
pub fn parse_poll_reply(reply: &str) -> PollReply {
    let mut parsed = PollReply::default();

    for line in reply.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_status_line(line) {
            Ok(record) => parsed.records.push(record),
            Err(e) => {
                debug!("Dropping status line: {}", e);
                parsed.discarded += 1;
            }
        }
    }

    parsed
}

/// Encode a record the way the directory reports it
pub fn encode_status_line(record: &PeerRecord) -> String {
    format!(
        "{} {} {} {} {}",
        record.peer_id, record.status_code, record.status_text, record.address, record.port
    )
}
