use std::net::SocketAddr;
use std::time::Duration;
use anyhow::bail;
use crate::message::MessageHeader;

#[derive(Debug, Clone)]
pub struct HostConfig {
    /// The address the host binds to in `start_listen`. A host that only connects to a peer
    ///  binds an ephemeral port of the same address family instead.
    pub bind_addr: SocketAddr,

    /// The maximum size of a datagram including the message header. Bigger datagrams are truncated
    ///  by the OS on receipt and are dropped.
    ///
    /// With full Ethernet frames and no optional IP headers, the UDP payload is
    ///  `1500 - 20 - 8 = 1472` for IPV4 and `1500 - 40 - 8 = 1452` for IPV6.
    pub max_datagram_size: usize,

    /// Connections without any successfully dispatched message for this long are removed
    pub inactivity_timeout: Duration,
    /// interval at which inactive connections are checked for
    pub reaper_interval: Duration,

    /// maximum time `connect` waits for the peer's reply to a handshake
    pub connect_timeout: Duration,

    /// number of datagrams buffered per worker before the listener waits for the worker to
    ///  catch up
    pub worker_queue_capacity: usize,

    /// number of receive buffers retained for reuse
    pub buffer_pool_size: usize,
}

impl HostConfig {
    pub fn new(bind_addr: SocketAddr) -> HostConfig {
        HostConfig {
            bind_addr,
            max_datagram_size: 1472,
            inactivity_timeout: Duration::from_secs(30),
            reaper_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(5),
            worker_queue_capacity: 1024,
            buffer_pool_size: 256,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_datagram_size <= MessageHeader::SERIALIZED_LEN {
            bail!("max datagram size must exceed the message header size of {} bytes", MessageHeader::SERIALIZED_LEN);
        }
        if self.reaper_interval.is_zero() {
            bail!("reaper interval must be positive");
        }
        if self.worker_queue_capacity == 0 {
            bail!("worker queue capacity must be positive");
        }

        Ok(())
    }
}
