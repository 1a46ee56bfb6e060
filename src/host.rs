pub mod buffer_pool;
pub mod dispatcher;
pub mod event_loops;
pub mod handler_registry;
pub mod hooks;
pub mod pending_connects;
pub mod send_socket;


use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex, RwLock};
use tokio::net::UdpSocket;
use tokio::select;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use crate::config::HostConfig;
use crate::connection::Connection;
use crate::connection_manager::ConnectionManager;
use crate::error::HostError;
use crate::host::buffer_pool::ReceiveBufferPool;
use crate::host::dispatcher::Dispatcher;
use crate::host::event_loops::{listen_loop, reap_loop, worker_loop};
use crate::host::handler_registry::HandlerRegistry;
use crate::host::hooks::NotificationHooks;
use crate::host::pending_connects::PendingConnects;
use crate::host::send_socket::Outbound;
use crate::message::{Message, MessageType};
use crate::token::Token;

struct RunningLoops {
    cancel_sender: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

/// A UDP endpoint that accepts connections (after `start_listen`), connects to a peer
///  (`connect`), or both through the same socket.
pub struct Host {
    config: Arc<HostConfig>,
    connections: Arc<ConnectionManager>,
    handlers: Arc<HandlerRegistry>,
    hooks: Arc<NotificationHooks>,
    pending_connects: Arc<PendingConnects>,
    buffer_pool: Arc<ReceiveBufferPool>,
    socket: RwLock<Option<Arc<UdpSocket>>>,
    /// the connection established by `connect`
    server_connection: Mutex<Option<Arc<Connection>>>,
    running: tokio::sync::Mutex<Option<RunningLoops>>,
}

impl Host {
    pub fn new(config: HostConfig) -> anyhow::Result<Host> {
        config.validate()?;

        Ok(Host {
            connections: Arc::new(ConnectionManager::new()),
            handlers: Default::default(),
            hooks: Default::default(),
            pending_connects: Default::default(),
            buffer_pool: Arc::new(ReceiveBufferPool::new(config.max_datagram_size + 1, config.buffer_pool_size)),
            socket: RwLock::new(None),
            server_connection: Mutex::new(None),
            running: tokio::sync::Mutex::new(None),
            config: Arc::new(config),
        })
    }

    fn socket(&self) -> Option<Arc<UdpSocket>> {
        self.socket.read().unwrap().clone()
    }

    fn outbound(&self, socket: Arc<UdpSocket>) -> Outbound {
        Outbound::new(socket, self.hooks.clone(), self.config.max_datagram_size)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket()
            .and_then(|s| s.local_addr().ok())
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// the token assigned by the server in `connect`
    pub fn client_token(&self) -> Option<Token> {
        self.server_connection.lock().unwrap()
            .as_ref()
            .map(|c| c.token())
    }

    pub async fn is_listening(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Starts receiving on the configured bind address, or on the socket bound by an earlier
    ///  `connect`. Datagrams are processed by `worker_count` worker tasks, or inline by the
    ///  listener if `worker_count` is 0.
    pub async fn start_listen(&self, worker_count: usize) -> anyhow::Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(HostError::AlreadyListening.into());
        }

        let socket = match self.socket() {
            Some(socket) => socket,
            None => {
                let socket = Arc::new(UdpSocket::bind(self.config.bind_addr).await?);
                self.socket.write().unwrap()
                    .get_or_insert(socket)
                    .clone()
            }
        };
        info!("listening on {:?}", socket.local_addr()?);

        let dispatcher = Arc::new(Dispatcher::new(
            self.connections.clone(),
            self.handlers.clone(),
            self.hooks.clone(),
            self.pending_connects.clone(),
            self.outbound(socket.clone()),
        ));

        let (cancel_sender, _) = broadcast::channel(1);
        let mut handles = Vec::with_capacity(worker_count + 2);

        let mut worker_queues = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let (queue_sender, queue_receiver) = mpsc::channel(self.config.worker_queue_capacity);
            worker_queues.push(queue_sender);
            handles.push(tokio::spawn(worker_loop(
                worker_id,
                queue_receiver,
                dispatcher.clone(),
                self.buffer_pool.clone(),
                cancel_sender.subscribe(),
            )));
        }

        handles.push(tokio::spawn(reap_loop(
            self.connections.clone(),
            self.hooks.clone(),
            self.config.inactivity_timeout,
            self.config.reaper_interval,
            cancel_sender.subscribe(),
        )));

        handles.push(tokio::spawn(listen_loop(
            socket,
            worker_queues,
            dispatcher,
            self.buffer_pool.clone(),
            self.config.max_datagram_size,
            cancel_sender.subscribe(),
        )));

        *running = Some(RunningLoops {
            cancel_sender,
            handles,
        });
        Ok(())
    }

    /// Stops all loops, waits for them to terminate and releases the socket
    pub async fn stop_listen(&self) {
        let Some(running) = self.running.lock().await.take() else {
            debug!("stop_listen called while not listening");
            return;
        };

        if running.cancel_sender.send(()).is_err() {
            debug!("all loops terminated before stop_listen");
        }
        for handle in running.handles {
            if let Err(e) = handle.await {
                self.hooks.error(&format!("loop terminated abnormally: {}", e));
            }
        }

        *self.socket.write().unwrap() = None;
        info!("stopped listening");
    }

    /// Sends a message to a connection's peer, assigning the connection's token and the next
    ///  sequence id for the message's type. Failures are reported through the error hook.
    pub async fn send(&self, message: Message, connection: &Connection) {
        match self.socket() {
            Some(socket) => self.outbound(socket).send(message, connection).await,
            None => self.hooks.error(&format!("cannot send {:?} message to {:?}: socket is not bound", message.message_type(), connection.peer_addr())),
        }
    }

    /// Sends a message through the connection established by `connect`
    pub async fn send_to_server(&self, message: Message) {
        let connection = self.server_connection.lock().unwrap().clone();
        match connection {
            Some(connection) => self.send(message, &connection).await,
            None => self.hooks.error(&HostError::NotConnected.to_string()),
        }
    }

    /// Performs the handshake with a remote host, returning the token the remote host assigned
    ///  to the new connection.
    pub async fn connect(&self, remote_addr: SocketAddr) -> anyhow::Result<Token> {
        let timeout = self.config.connect_timeout;
        let result = tokio::time::timeout(timeout, self.do_handshake(remote_addr)).await;
        self.pending_connects.remove(&remote_addr);

        let token = match result {
            Ok(token) => token?,
            Err(_) => return Err(HostError::ConnectTimeout { addr: remote_addr, timeout }.into()),
        };

        let connection = Arc::new(Connection::new(token, remote_addr));
        self.connections.add(connection.clone());
        *self.server_connection.lock().unwrap() = Some(connection);

        info!("connected to {:?} with token {}", remote_addr, token);
        Ok(token)
    }

    async fn do_handshake(&self, remote_addr: SocketAddr) -> anyhow::Result<Token> {
        let socket = self.bound_socket(remote_addr).await?;
        let mut reply = self.pending_connects.register(remote_addr);

        self.outbound(socket.clone())
            .try_send_to(&Message::handshake(), remote_addr)
            .await?;

        if self.is_listening().await {
            // the listener hands the reply over through the pending connect
            return Ok(reply.await?);
        }

        let mut buf = vec![0u8; self.config.max_datagram_size + 1];
        loop {
            let (len, from) = select! {
                token = &mut reply => return Ok(token?),
                r = socket.recv_from(&mut buf) => r?,
            };

            if from != remote_addr {
                debug!("ignoring datagram from {:?} while waiting for the handshake reply from {:?}", from, remote_addr);
                continue;
            }

            let message = match Message::deser(&buf[..len]) {
                Ok(message) => message,
                Err(e) => {
                    debug!("unparseable reply from {:?} - ignoring: {}", from, e);
                    continue;
                }
            };
            self.hooks.peer_seen(from);

            if message.message_type() != MessageType::TOKEN {
                debug!("ignoring {:?} message while waiting for the handshake reply from {:?}", message.message_type(), from);
                continue;
            }

            return match message.token() {
                Some(token) => Ok(token),
                None => Err(HostError::UnexpectedReply {
                    addr: from,
                    reason: "TOKEN message without a token".to_string(),
                }.into()),
            };
        }
    }

    /// the host's socket, binding an ephemeral port of the remote address's family if there is none
    async fn bound_socket(&self, remote_addr: SocketAddr) -> anyhow::Result<Arc<UdpSocket>> {
        if let Some(socket) = self.socket() {
            return Ok(socket);
        }

        let local_addr: SocketAddr = if remote_addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        }
        else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = Arc::new(UdpSocket::bind(local_addr).await?);
        debug!("bound {:?} for connecting to {:?}", socket.local_addr()?, remote_addr);

        Ok(self.socket.write().unwrap()
            .get_or_insert(socket)
            .clone())
    }

    /// Registers a handler for a message type. Handlers are called in registration order.
    pub fn add_handler(&self, message_type: MessageType, handler: impl Fn(&Message, &Arc<Connection>) -> anyhow::Result<()> + Send + Sync + 'static) {
        self.handlers.add(message_type, Arc::new(handler));
    }

    pub fn set_error_hook(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        self.hooks.set_error_hook(Some(Arc::new(hook)));
    }

    pub fn set_debug_hook(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        self.hooks.set_debug_hook(Some(Arc::new(hook)));
    }

    pub fn set_peer_seen_hook(&self, hook: impl Fn(SocketAddr) + Send + Sync + 'static) {
        self.hooks.set_peer_seen_hook(Some(Arc::new(hook)));
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut() {
            let _ = running.cancel_sender.send(());
        }
    }
}
