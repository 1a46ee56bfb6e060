use std::any::Any;
use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use bytes::Bytes;
use tracing::{debug, trace};
use crate::connection::Connection;
use crate::connection_manager::{ConnectionManager, Resolution};
use crate::host::handler_registry::{HandlerRegistry, ReceiveHandler};
use crate::host::hooks::NotificationHooks;
use crate::host::pending_connects::PendingConnects;
use crate::host::send_socket::Outbound;
use crate::message::{Delivery, Message, MessageType, Mode};

/// The per-datagram processing pipeline: parsing, connection resolution, acknowledgement,
///  sequencing / ordering, and finally invocation of the application's handlers.
pub struct Dispatcher {
    connections: Arc<ConnectionManager>,
    handlers: Arc<HandlerRegistry>,
    hooks: Arc<NotificationHooks>,
    pending_connects: Arc<PendingConnects>,
    outbound: Outbound,
}

impl Dispatcher {
    pub fn new(
        connections: Arc<ConnectionManager>,
        handlers: Arc<HandlerRegistry>,
        hooks: Arc<NotificationHooks>,
        pending_connects: Arc<PendingConnects>,
        outbound: Outbound,
    ) -> Dispatcher {
        Dispatcher {
            connections,
            handlers,
            hooks,
            pending_connects,
            outbound,
        }
    }

    pub fn hooks(&self) -> &NotificationHooks {
        &self.hooks
    }

    #[tracing::instrument(level = "trace", skip(self, buf), fields(len = buf.len()))]
    pub async fn on_datagram(&self, buf: &[u8], from: SocketAddr) {
        if buf.is_empty() {
            trace!("empty datagram - ignoring");
            return;
        }

        let message = match Message::deser(buf) {
            Ok(message) => message,
            Err(e) => {
                debug!("unparseable datagram from {:?} - dropping: {}", from, e);
                return;
            }
        };

        self.hooks.peer_seen(from);

        if self.pending_connects.try_complete(from, &message) {
            trace!("received reply to pending handshake");
            return;
        }

        let connection = match self.connections.resolve(&message, from) {
            None => {
                debug!("no connection for {:?} message from {:?} - dropping", message.message_type(), from);
                return;
            }
            Some(Resolution::Handshake(connection)) => {
                self.hooks.debug(&format!("handshake from {:?}, sending token {}", from, connection.token()));
                self.outbound.send(Message::new(MessageType::TOKEN, Mode::NONE, Bytes::new()), &connection).await;
                connection
            }
            Some(Resolution::Established(connection)) => connection,
        };

        // acknowledge on receipt, even if the message turns out to be stale
        if message.mode().reliable {
            self.outbound.send(connection.generate_ack(&message), &connection).await;
        }

        match message.mode().delivery {
            Delivery::Unordered => {
                self.deliver(&[message], &connection);
            }
            Delivery::Sequenced => {
                if connection.accept_sequenced(message.message_type(), message.sequence_id()) {
                    self.deliver(&[message], &connection);
                }
                else {
                    debug!("stale sequenced {:?} message {} from {:?} - dropping", message.message_type(), message.sequence_id(), from);
                }
            }
            Delivery::Ordered => {
                let run = connection.admit_ordered(message);
                if !run.is_empty() {
                    self.deliver(&run, &connection);
                }
            }
        }
    }

    /// passes messages of a single type to all handlers registered for that type
    fn deliver(&self, messages: &[Message], connection: &Arc<Connection>) {
        let Some(first) = messages.first() else {
            return;
        };

        let handlers = self.handlers.get(first.message_type());
        if handlers.is_empty() {
            trace!("no handler registered for {:?}", first.message_type());
        }

        for message in messages {
            for handler in &handlers {
                self.invoke(handler, message, connection);
            }
        }

        connection.record_activity();
    }

    fn invoke(&self, handler: &ReceiveHandler, message: &Message, connection: &Arc<Connection>) {
        match catch_unwind(AssertUnwindSafe(|| handler(message, connection))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.hooks.error(&format!("handler for {:?} message {} failed: {}", message.message_type(), message.sequence_id(), e));
            }
            Err(panic) => {
                self.hooks.error(&format!("handler for {:?} message {} panicked: {}", message.message_type(), message.sequence_id(), panic_text(&*panic)));
            }
        }
    }
}

fn panic_text(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    }
    else if let Some(s) = panic.downcast_ref::<String>() {
        s
    }
    else {
        "<no message>"
    }
}
