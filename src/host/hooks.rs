use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use tracing::{debug, error};

pub type LogHook = Arc<dyn Fn(&str) + Send + Sync>;
pub type PeerSeenHook = Arc<dyn Fn(SocketAddr) + Send + Sync>;

/// Optional application callbacks. Error and debug notifications go to `tracing` regardless of
///  whether a hook is registered.
#[derive(Default)]
pub struct NotificationHooks {
    error: RwLock<Option<LogHook>>,
    debug: RwLock<Option<LogHook>>,
    peer_seen: RwLock<Option<PeerSeenHook>>,
}

impl NotificationHooks {
    pub fn set_error_hook(&self, hook: Option<LogHook>) {
        *self.error.write().unwrap() = hook;
    }

    pub fn set_debug_hook(&self, hook: Option<LogHook>) {
        *self.debug.write().unwrap() = hook;
    }

    pub fn set_peer_seen_hook(&self, hook: Option<PeerSeenHook>) {
        *self.peer_seen.write().unwrap() = hook;
    }

    pub fn error(&self, text: &str) {
        error!("{}", text);

        // clone the hook so it is not called while holding the lock
        let hook = self.error.read().unwrap().clone();
        if let Some(hook) = hook {
            hook(text);
        }
    }

    pub fn debug(&self, text: &str) {
        debug!("{}", text);

        let hook = self.debug.read().unwrap().clone();
        if let Some(hook) = hook {
            hook(text);
        }
    }

    pub fn peer_seen(&self, addr: SocketAddr) {
        let hook = self.peer_seen.read().unwrap().clone();
        if let Some(hook) = hook {
            hook(addr);
        }
    }
}
