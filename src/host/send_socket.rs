use std::net::SocketAddr;
use std::sync::Arc;
use anyhow::bail;
use async_trait::async_trait;
use bytes::BytesMut;
#[cfg(test)] use mockall::automock;
use tokio::net::UdpSocket;
use tracing::trace;
use crate::connection::Connection;
use crate::host::hooks::NotificationHooks;
use crate::message::Message;

/// This is an abstraction for sending a buffer on a UDP socket, introduced to facilitate mocking
///  the I/O part away for testing
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SendSocket: Send + Sync + 'static {
    async fn send_datagram(&self, to: SocketAddr, buf: &[u8]) -> std::io::Result<()>;
}

#[async_trait]
impl SendSocket for UdpSocket {
    async fn send_datagram(&self, to: SocketAddr, buf: &[u8]) -> std::io::Result<()> {
        trace!("UDP socket: sending {} bytes to {:?}", buf.len(), to);
        self.send_to(buf, to).await?;
        Ok(())
    }
}


/// Serializes messages and sends them as single datagrams. Sending is fire-and-forget: failures
///  are reported through the error hook rather than returned.
#[derive(Clone)]
pub struct Outbound {
    socket: Arc<dyn SendSocket>,
    hooks: Arc<NotificationHooks>,
    max_datagram_size: usize,
}

impl Outbound {
    pub fn new(socket: Arc<dyn SendSocket>, hooks: Arc<NotificationHooks>, max_datagram_size: usize) -> Outbound {
        Outbound {
            socket,
            hooks,
            max_datagram_size,
        }
    }

    /// Stamps the message with the connection's token and the next sequence id for its type,
    ///  and sends it to the connection's peer.
    pub async fn send(&self, mut message: Message, connection: &Connection) {
        message.header.token = Some(connection.token());
        message.header.sequence_id = connection.next_outgoing_id(message.message_type());

        self.send_to(&message, connection.peer_addr()).await
    }

    pub async fn send_to(&self, message: &Message, to: SocketAddr) {
        if let Err(e) = self.try_send_to(message, to).await {
            self.hooks.error(&format!("error sending {:?} message to {:?}: {}", message.message_type(), to, e));
        }
    }

    /// sends a message as is, without touching its header
    pub async fn try_send_to(&self, message: &Message, to: SocketAddr) -> anyhow::Result<()> {
        if message.serialized_len() > self.max_datagram_size {
            bail!("message of {} bytes exceeds the maximum datagram size of {} bytes", message.serialized_len(), self.max_datagram_size);
        }

        let mut buf = BytesMut::with_capacity(message.serialized_len());
        message.ser(&mut buf);
        self.socket.send_datagram(to, &buf).await?;
        Ok(())
    }
}
