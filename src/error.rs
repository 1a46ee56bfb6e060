use std::net::SocketAddr;
use std::time::Duration;

/// Failure kinds that callers may want to distinguish. They are returned wrapped in
///  `anyhow::Error`, use `downcast_ref::<HostError>()` to inspect them.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("no reply to handshake from {addr:?} within {timeout:?}")]
    ConnectTimeout {
        addr: SocketAddr,
        timeout: Duration,
    },
    #[error("host is already listening")]
    AlreadyListening,
    #[error("host is not connected to a server")]
    NotConnected,
    #[error("unexpected reply to handshake from {addr:?}: {reason}")]
    UnexpectedReply {
        addr: SocketAddr,
        reason: String,
    },
}
