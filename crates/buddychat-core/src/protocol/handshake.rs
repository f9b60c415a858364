//! Peer handshake and chat line rules
//!
//! The acceptor answers a dial with a single `ACCEPT` line. Rejection has no
//! frame of its own: the acceptor closes the connection and the dialer sees
//! end-of-stream before any line. After acceptance both sides exchange
//! newline-terminated UTF-8 lines until one of them closes.

use tokio_util::codec::LinesCodec;

/// Line the acceptor writes to admit the dialer
pub const ACCEPT_TOKEN: &str = "ACCEPT";

/// Local input that ends a session; it is never sent to the peer
pub const QUIT_SENTINEL: &str = "q";

/// Line codec shared by both handshake roles and the relays
pub fn line_codec(max_line_length: usize) -> LinesCodec {
    LinesCodec::new_with_max_length(max_line_length)
}

/// Whether the first line from the acceptor admits us
pub fn is_accept(line: &str) -> bool {
    line == ACCEPT_TOKEN
}

/// Whether a line of local input ends the session
pub fn is_quit(line: &str) -> bool {
    line == QUIT_SENTINEL
}
