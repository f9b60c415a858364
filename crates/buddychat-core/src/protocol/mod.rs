//! buddychat wire protocols
//!
//! All three protocols are plain text:
//! - `presence`: UDP status announce and buddy-list poll against the directory
//! - `directory`: one-line TCP requests to the directory (register, add, delete)
//! - `handshake`: the ACCEPT/EOF negotiation and chat line rules between peers

pub mod directory;
pub mod handshake;
pub mod presence;

// Re-export presence types
pub use presence::{parse_poll_reply, parse_status_line, PollReply, PresenceRequest};

// Re-export directory types
pub use directory::{DirectoryRequest, DirectoryResponse};

// Re-export handshake constants
pub use handshake::{ACCEPT_TOKEN, QUIT_SENTINEL};
