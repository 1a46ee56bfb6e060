use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use rustc_hash::FxHashMap;
use tracing::{debug, info};
use crate::connection::Connection;
use crate::message::{Message, MessageType};
use crate::token::Token;

/// The outcome of successfully resolving the connection for an incoming message
#[derive(Debug, Clone)]
pub enum Resolution {
    /// the message carries the token of a known connection
    Established(Arc<Connection>),
    /// The message is a handshake. The peer is waiting for the connection's token, so the caller
    ///  is expected to send it.
    Handshake(Arc<Connection>),
}

impl Resolution {
    pub fn connection(&self) -> &Arc<Connection> {
        match self {
            Resolution::Established(c) => c,
            Resolution::Handshake(c) => c,
        }
    }
}

/// Owns all connections of a host, keyed by token. All access goes through a single lock, so
///  handshakes, lookups and eviction of inactive connections can happen from different tasks.
#[derive(Default)]
pub struct ConnectionManager {
    connections: Mutex<FxHashMap<Token, Arc<Connection>>>,
}

impl ConnectionManager {
    pub fn new() -> ConnectionManager {
        Default::default()
    }

    /// Finds the connection an incoming message belongs to.
    ///
    /// Returns `None` if the message carries a token that is not (or no longer) known, or if it
    ///  carries no token and is not a handshake.
    pub fn resolve(&self, message: &Message, remote_addr: SocketAddr) -> Option<Resolution> {
        if let Some(token) = message.token() {
            let result = self.get(&token);
            if result.is_none() {
                debug!("received message with unknown token {} from {:?}", token, remote_addr);
            }
            return result.map(Resolution::Established);
        }

        if message.message_type() != MessageType::HANDSHAKE {
            debug!("received {:?} message without token from {:?}", message.message_type(), remote_addr);
            return None;
        }

        let mut connections = self.connections.lock().unwrap();

        if let Some(existing) = connections.values().find(|c| c.peer_addr() == remote_addr) {
            debug!("repeated handshake from {:?}, re-using connection {} with a new session", remote_addr, existing.token());
            existing.reset_session();
            return Some(Resolution::Handshake(existing.clone()));
        }

        let token = Token::generate(|t| connections.contains_key(t));
        let connection = Arc::new(Connection::new(token, remote_addr));
        connections.insert(token, connection.clone());

        info!("handshake from {:?}: created connection {}", remote_addr, token);
        Some(Resolution::Handshake(connection))
    }

    /// Registers a connection that was established by this side's handshake
    pub fn add(&self, connection: Arc<Connection>) {
        let token = connection.token();
        if let Some(prev) = self.connections.lock().unwrap().insert(token, connection) {
            debug!("replacing connection {:?} with a new connection for the same token", prev);
        }
    }

    pub fn get(&self, token: &Token) -> Option<Arc<Connection>> {
        self.connections.lock().unwrap()
            .get(token)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes all connections without activity for at least `timeout`, returning their tokens
    pub fn remove_inactive(&self, timeout: Duration) -> Vec<Token> {
        let mut removed = Vec::new();

        self.connections.lock().unwrap()
            .retain(|token, connection| {
                if connection.is_inactive(timeout) {
                    removed.push(*token);
                    false
                }
                else {
                    true
                }
            });

        for token in &removed {
            info!("removed inactive connection {}", token);
        }
        removed
    }
}
