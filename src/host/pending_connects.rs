use std::net::SocketAddr;
use std::sync::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tracing::debug;
use crate::message::{Message, MessageType};
use crate::token::Token;

/// Handshakes sent by `connect` that wait for the peer's TOKEN reply. When the host is listening,
///  the reply arrives through the regular receive path and is handed over from there.
#[derive(Default)]
pub struct PendingConnects {
    pending: Mutex<FxHashMap<SocketAddr, oneshot::Sender<Token>>>,
}

impl PendingConnects {
    pub fn register(&self, peer_addr: SocketAddr) -> oneshot::Receiver<Token> {
        let (sender, receiver) = oneshot::channel();
        if self.pending.lock().unwrap().insert(peer_addr, sender).is_some() {
            debug!("replacing pending connect to {:?}", peer_addr);
        }
        receiver
    }

    pub fn remove(&self, peer_addr: &SocketAddr) {
        self.pending.lock().unwrap().remove(peer_addr);
    }

    /// Returns `true` if the message is the TOKEN reply for a pending connect, i.e. it was
    ///  consumed.
    pub fn try_complete(&self, from: SocketAddr, message: &Message) -> bool {
        if message.message_type() != MessageType::TOKEN {
            return false;
        }
        let Some(token) = message.token() else {
            return false;
        };

        match self.pending.lock().unwrap().remove(&from) {
            Some(sender) => {
                if sender.send(token).is_err() {
                    debug!("connect to {:?} was abandoned before the reply arrived", from);
                }
                true
            }
            None => false,
        }
    }
}
