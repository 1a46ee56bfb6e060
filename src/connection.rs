pub mod reorder_buffer;

use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;
use bytes::BytesMut;
use rustc_hash::FxHashMap;
use tokio::time::Instant;
use tracing::trace;
use crate::connection::reorder_buffer::ReorderBuffer;
use crate::message::{AckPayload, Message, MessageType, Mode};
use crate::sequence_id::SequenceId;
use crate::token::Token;

/// State for a single peer, identified by its [Token].
///
/// All mutable state is behind a single lock per connection.
pub struct Connection {
    token: Token,
    peer_addr: SocketAddr,
    state: Mutex<ConnectionState>,
}

struct ConnectionState {
    last_activity: Instant,
    /// the id to assign to the next message sent for a given type
    outgoing_ids: FxHashMap<MessageType, SequenceId>,
    /// the newest id accepted for sequenced messages of a given type
    sequenced_high_water_marks: FxHashMap<MessageType, SequenceId>,
    reorder_buffers: FxHashMap<MessageType, ReorderBuffer>,
}

impl Debug for Connection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Connection{{token:{},peer:{:?}}}", self.token, self.peer_addr)
    }
}

impl Connection {
    pub fn new(token: Token, peer_addr: SocketAddr) -> Connection {
        Connection {
            token,
            peer_addr,
            state: Mutex::new(ConnectionState {
                last_activity: Instant::now(),
                outgoing_ids: Default::default(),
                sequenced_high_water_marks: Default::default(),
                reorder_buffers: Default::default(),
            }),
        }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn last_activity(&self) -> Instant {
        self.state.lock().unwrap().last_activity
    }

    pub fn record_activity(&self) {
        self.state.lock().unwrap().last_activity = Instant::now();
    }

    pub fn is_inactive(&self, timeout: Duration) -> bool {
        self.last_activity().elapsed() >= timeout
    }

    /// Returns the id for the next outgoing message of a given type, advancing the counter.
    ///  The first id for every type is [SequenceId::ZERO].
    pub fn next_outgoing_id(&self, message_type: MessageType) -> SequenceId {
        let mut state = self.state.lock().unwrap();
        let counter = state.outgoing_ids
            .entry(message_type)
            .or_insert(SequenceId::ZERO);

        let result = *counter;
        *counter = counter.next();
        result
    }

    /// Sequenced delivery: returns `true` iff the id is newer than all ids accepted for this
    ///  message type so far, updating the high water mark in that case.
    pub fn accept_sequenced(&self, message_type: MessageType, id: SequenceId) -> bool {
        let mut state = self.state.lock().unwrap();

        match state.sequenced_high_water_marks.get(&message_type).copied() {
            Some(prev) if !id.is_newer_than(prev) => {
                trace!("sequenced message {} of type {:?} is not newer than {} - rejecting", id, message_type, prev);
                false
            }
            _ => {
                state.sequenced_high_water_marks.insert(message_type, id);
                true
            }
        }
    }

    /// Ordered delivery: buffers the message, returning the messages that can be delivered now
    ///  in ascending id order. The result is empty if there is a gap before this message.
    pub fn admit_ordered(&self, message: Message) -> Vec<Message> {
        let mut state = self.state.lock().unwrap();
        state.reorder_buffers
            .entry(message.message_type())
            .or_default()
            .admit(message)
    }

    /// Starts a new session on a connection that was handshaked again: outgoing ids restart at
    ///  zero, and sequencing / ordering state for incoming messages is discarded.
    pub fn reset_session(&self) {
        let mut state = self.state.lock().unwrap();
        state.outgoing_ids.clear();
        state.sequenced_high_water_marks.clear();
        state.reorder_buffers.clear();
    }

    /// Creates the ACK for a message received through this connection. ACKs are sent
    ///  as plain messages, i.e. they are not acknowledged themselves.
    pub fn generate_ack(&self, message: &Message) -> Message {
        let mut payload = BytesMut::with_capacity(AckPayload::SERIALIZED_LEN);
        AckPayload {
            acked_type: message.message_type(),
            acked_id: message.sequence_id(),
        }.ser(&mut payload);

        let mut ack = Message::new(MessageType::ACK, Mode::NONE, payload.freeze());
        ack.header.token = Some(self.token);
        ack
    }
}
