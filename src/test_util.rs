use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use crate::connection::Connection;
use crate::message::{Message, MessageType, Mode};
use crate::sequence_id::SequenceId;
use crate::token::Token;

/// convenience method for unit test code: a localhost address with the given port
pub fn test_addr(port: u16) -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port))
}

pub fn test_token(raw: u32) -> Token {
    Token::from_raw(raw).expect("test tokens must be non-zero")
}

/// a message as it arrives from the network, i.e. with its sequence id assigned
pub fn test_message(message_type: u16, mode: Mode, id: u16) -> Message {
    let mut result = Message::new(MessageType(message_type), mode, vec![id as u8]);
    result.header.sequence_id = SequenceId::from_raw(id);
    result
}

/// Collects the messages passed to a receive handler
#[derive(Clone, Default)]
pub struct TrackingHandler {
    received: Arc<Mutex<Vec<(Message, Token)>>>,
}

impl TrackingHandler {
    pub fn handler(&self) -> impl Fn(&Message, &Arc<Connection>) -> anyhow::Result<()> + Send + Sync + 'static {
        let received = self.received.clone();
        move |msg: &Message, conn: &Arc<Connection>| -> anyhow::Result<()> {
            received.lock().unwrap().push((msg.clone(), conn.token()));
            Ok(())
        }
    }

    pub fn len(&self) -> usize {
        self.received.lock().unwrap().len()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.received.lock().unwrap()
            .iter()
            .map(|(m, _)| m.clone())
            .collect()
    }

    pub fn raw_ids(&self) -> Vec<u16> {
        self.messages().iter()
            .map(|m| m.sequence_id().to_raw())
            .collect()
    }

    pub fn tokens(&self) -> Vec<Token> {
        self.received.lock().unwrap()
            .iter()
            .map(|(_, t)| *t)
            .collect()
    }
}

/// polls a condition until it holds or the timeout expires, returning whether it held
pub async fn wait_until(condition: impl Fn() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !condition() {
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(10)).await;
    }
    true
}
