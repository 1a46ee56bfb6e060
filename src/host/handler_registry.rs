use std::sync::{Arc, RwLock};
use rustc_hash::FxHashMap;
use crate::connection::Connection;
use crate::message::{Message, MessageType};

/// Application callback for received messages. Errors are reported through the host's error
///  hook, they do not affect other handlers or the processing of other messages.
pub type ReceiveHandler = Arc<dyn Fn(&Message, &Arc<Connection>) -> anyhow::Result<()> + Send + Sync>;

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<FxHashMap<MessageType, Vec<ReceiveHandler>>>,
}

impl HandlerRegistry {
    pub fn add(&self, message_type: MessageType, handler: ReceiveHandler) {
        self.handlers.write().unwrap()
            .entry(message_type)
            .or_default()
            .push(handler);
    }

    /// a snapshot of the handlers for a message type, in registration order
    pub fn get(&self, message_type: MessageType) -> Vec<ReceiveHandler> {
        self.handlers.read().unwrap()
            .get(&message_type)
            .cloned()
            .unwrap_or_default()
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use super::*;
    use crate::test_util::{test_addr, test_message, test_token};
    use crate::message::Mode;

    #[test]
    fn test_registration_order() {
        let registry = HandlerRegistry::default();
        let calls = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let calls = calls.clone();
            registry.add(MessageType(1), Arc::new(move |_: &Message, _: &Arc<Connection>| -> anyhow::Result<()> {
                calls.lock().unwrap().push(i);
                Ok(())
            }));
        }

        assert!(registry.get(MessageType(2)).is_empty());

        let conn = Arc::new(Connection::new(test_token(1), test_addr(1)));
        for handler in registry.get(MessageType(1)) {
            handler(&test_message(1, Mode::NONE, 0), &conn).unwrap();
        }
        assert_eq!(*calls.lock().unwrap(), vec![0, 1, 2]);
    }
}
