//! A message transport on top of UDP with per-message delivery guarantees, intended for
//!  latency sensitive applications (e.g. game networking) that need some messages to arrive
//!  in order and others delivered best-effort with minimal overhead.
//!
//! ## Design goals
//!
//! * The abstraction is sending / receiving *messages*, each fitting into a single datagram
//! * Every message carries its own delivery mode:
//!   * *reliable*: the receiver acknowledges the message on receipt with an ACK message
//!   * *sequenced*: the receiver drops every message that is not newer than the newest message
//!      of the same type it already accepted from that connection. Gaps are not filled.
//!   * *ordered*: the receiver buffers messages that arrive ahead of a gap and delivers them
//!      once the gap is filled, strictly in sequence
//!   * *reliable* combines with either *sequenced* or *ordered*
//! * Connections are established by an explicit handshake: the accepting side assigns a token
//!    that identifies the connection in every subsequent message
//! * Connections are dropped after a configurable period of inactivity
//! * Explicitly *not* a full stream protocol: there is no retransmission, no fragmentation and no
//!    congestion control. ACKs are a signal to the application, nothing more.
//!
//! ## Header
//!
//! All numbers in network byte order (BE):
//!
//! ```ascii
//! 0: protocol version (u8)
//! 1: message type (u16) - application defined, values from 0xFF00 are reserved:
//!     * FF00 HANDSHAKE
//!     * FF01 TOKEN (reply to HANDSHAKE)
//!     * FF02 ACK
//! 3: mode flags (u8):
//!     * bit 0: reliable
//!     * bit 1: sequenced
//!     * bit 2: ordered
//!     * bit 3-7: unused, must be 0
//! 4: sequence id (u16) - per connection and message type, wrapping
//! 6: connection token (u32) - 0 for HANDSHAKE
//! 10: payload
//! ```
//!
//! ## Handshake
//!
//! The connecting side sends a HANDSHAKE message without token. The accepting side creates a
//!  connection with a fresh token (or re-uses the connection it already has for the sender's
//!  address) and replies with a TOKEN message carrying that token in its header. The connecting
//!  side registers its own connection with the token from the reply.
//!
//! ## Sequence ids
//!
//! Sequence ids are 16 bit and wrap around. They are compared circularly, i.e. an id is 'newer'
//!  than another if it is less than half the id space ahead of it. See [sequence_id::SequenceId].

pub mod config;
pub mod connection;
pub mod connection_manager;
pub mod error;
pub mod host;
pub mod message;
pub mod sequence_id;
pub mod token;

#[cfg(test)]
pub mod test_util;


#[cfg(test)]
mod test {
    use tracing::Level;

    #[ctor::ctor]
    fn init_test_logging() {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(Level::DEBUG)
            .try_init()
            .ok();
    }
}
