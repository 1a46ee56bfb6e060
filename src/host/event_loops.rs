use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use bytes::BytesMut;
use rustc_hash::FxHasher;
use tokio::net::UdpSocket;
use tokio::select;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, trace_span, Instrument};
use uuid::Uuid;
use crate::connection_manager::ConnectionManager;
use crate::host::buffer_pool::ReceiveBufferPool;
use crate::host::dispatcher::Dispatcher;
use crate::host::hooks::NotificationHooks;
use crate::message::MessageHeader;

/// A received datagram on its way from the listener to a worker
pub struct Datagram {
    pub buf: BytesMut,
    pub from: SocketAddr,
}

/// All datagrams of a connection go to the same worker, so their arrival order is preserved and
///  a connection's messages are dispatched by one worker at a time, even if the peer's address
///  changes. Datagrams without a token (i.e. handshakes) are routed by sender address.
fn worker_index(buf: &[u8], from: &SocketAddr, num_workers: usize) -> usize {
    let mut hasher = FxHasher::default();
    match MessageHeader::peek_token(buf) {
        Some(token) => token.hash(&mut hasher),
        None => from.hash(&mut hasher),
    }
    (hasher.finish() % num_workers as u64) as usize
}

async fn dispatch(dispatcher: &Dispatcher, buf: &[u8], from: SocketAddr) {
    let correlation_id = Uuid::new_v4();
    dispatcher.on_datagram(buf, from)
        .instrument(trace_span!("datagram_received", ?correlation_id))
        .await
}

/// Receives datagrams and hands them to the worker queues. With no workers, datagrams are
///  dispatched inline.
pub async fn listen_loop(
    socket: Arc<UdpSocket>,
    worker_queues: Vec<mpsc::Sender<Datagram>>,
    dispatcher: Arc<Dispatcher>,
    buffer_pool: Arc<ReceiveBufferPool>,
    max_datagram_size: usize,
    mut cancel: broadcast::Receiver<()>,
) {
    info!("starting listen loop on {:?} with {} workers", socket.local_addr().ok(), worker_queues.len());

    loop {
        // pooled buffers have one byte more than the maximum, so oversized datagrams can be recognized
        let mut buf = buffer_pool.get_from_pool();

        let received = select! {
            r = socket.recv_from(&mut buf) => r,
            _ = cancel.recv() => break,
        };

        let (len, from) = match received {
            Ok(x) => x,
            Err(e) => {
                dispatcher.hooks().error(&format!("error receiving from socket: {}", e));
                buffer_pool.return_to_pool(buf);
                continue;
            }
        };

        if len > max_datagram_size {
            debug!("datagram from {:?} exceeds the maximum size of {} bytes - dropping", from, max_datagram_size);
            buffer_pool.return_to_pool(buf);
            continue;
        }
        buf.truncate(len);

        if worker_queues.is_empty() {
            dispatch(&dispatcher, &buf, from).await;
            buffer_pool.return_to_pool(buf);
            continue;
        }

        let worker = worker_index(&buf, &from, worker_queues.len());
        trace!("received {} bytes from {:?}, passing to worker #{}", len, from, worker);
        if worker_queues[worker].send(Datagram { buf, from }).await.is_err() {
            debug!("worker #{} has stopped - dropping datagram", worker);
        }
    }

    info!("listen loop stopped");
}

pub async fn worker_loop(
    worker_id: usize,
    mut queue: mpsc::Receiver<Datagram>,
    dispatcher: Arc<Dispatcher>,
    buffer_pool: Arc<ReceiveBufferPool>,
    mut cancel: broadcast::Receiver<()>,
) {
    debug!("starting worker #{}", worker_id);

    loop {
        let datagram = select! {
            d = queue.recv() => match d {
                Some(d) => d,
                None => break,
            },
            _ = cancel.recv() => break,
        };

        dispatch(&dispatcher, &datagram.buf, datagram.from).await;
        buffer_pool.return_to_pool(datagram.buf);
    }

    debug!("worker #{} stopped", worker_id);
}

/// Periodically evicts connections that have been inactive for at least `inactivity_timeout`
pub async fn reap_loop(
    connections: Arc<ConnectionManager>,
    hooks: Arc<NotificationHooks>,
    inactivity_timeout: Duration,
    reaper_interval: Duration,
    mut cancel: broadcast::Receiver<()>,
) {
    let mut ticks = interval(reaper_interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        select! {
            _ = ticks.tick() => {
                for token in connections.remove_inactive(inactivity_timeout) {
                    hooks.debug(&format!("evicted inactive connection {}", token));
                }
            }
            _ = cancel.recv() => break,
        }
    }

    debug!("reap loop stopped");
}


#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use tokio::time::sleep;
    use super::*;
    use crate::connection::Connection;
    use crate::host::handler_registry::HandlerRegistry;
    use crate::host::pending_connects::PendingConnects;
    use crate::host::send_socket::Outbound;
    use crate::message::{Message, MessageType, Mode};
    use crate::test_util::{test_addr, test_token, wait_until, TrackingHandler};
    use crate::token::Token;

    fn serialized(token: Option<u32>) -> BytesMut {
        let mut msg = Message::new(MessageType(1), Mode::ORDERED, vec![]);
        msg.header.token = token.and_then(Token::from_raw);
        let mut buf = BytesMut::new();
        msg.ser(&mut buf);
        buf
    }

    #[test]
    fn test_worker_index_by_address_without_token() {
        let handshake = serialized(None);
        for port in 1000..1100 {
            let index = worker_index(&handshake, &test_addr(port), 3);
            assert!(index < 3);
            assert_eq!(worker_index(&handshake, &test_addr(port), 3), index);
        }
        assert_eq!(worker_index(&handshake, &test_addr(1), 1), 0);
    }

    #[test]
    fn test_worker_index_by_token() {
        let mut indices = Vec::new();
        for token in 1..50 {
            let buf = serialized(Some(token));
            let index = worker_index(&buf, &test_addr(1000), 4);
            for port in 1001..1020 {
                assert_eq!(worker_index(&buf, &test_addr(port), 4), index, "token {} from port {}", token, port);
            }
            indices.push(index);
        }
        indices.sort();
        indices.dedup();
        assert!(indices.len() > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_loop_evicts_inactive() {
        let connections = Arc::new(ConnectionManager::new());
        connections.add(Arc::new(Connection::new(test_token(1), test_addr(1))));
        let active = Arc::new(Connection::new(test_token(2), test_addr(2)));
        connections.add(active.clone());

        let hooks = Arc::new(NotificationHooks::default());
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let evicted2 = evicted.clone();
        hooks.set_debug_hook(Some(Arc::new(move |s: &str| evicted2.lock().unwrap().push(s.to_string()))));

        let (cancel_sender, _) = broadcast::channel(1);
        let handle = tokio::spawn(reap_loop(connections.clone(), hooks, Duration::from_secs(30), Duration::from_secs(1), cancel_sender.subscribe()));

        sleep(Duration::from_secs(20)).await;
        active.record_activity();
        sleep(Duration::from_secs(12)).await;

        assert_eq!(connections.len(), 1);
        assert!(connections.get(&test_token(2)).is_some());
        assert_eq!(evicted.lock().unwrap().len(), 1);

        cancel_sender.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_listen_loop_inline() {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let server_addr = socket.local_addr().unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let connections = Arc::new(ConnectionManager::new());
        connections.add(Arc::new(Connection::new(test_token(7), client.local_addr().unwrap())));

        let handlers = Arc::new(HandlerRegistry::default());
        let tracker = TrackingHandler::default();
        handlers.add(MessageType(3), Arc::new(tracker.handler()));

        let hooks = Arc::new(NotificationHooks::default());
        let dispatcher = Arc::new(Dispatcher::new(
            connections,
            handlers,
            hooks.clone(),
            Arc::new(PendingConnects::default()),
            Outbound::new(socket.clone(), hooks, 64),
        ));

        let (cancel_sender, _) = broadcast::channel(1);
        let handle = tokio::spawn(listen_loop(socket, vec![], dispatcher, Arc::new(ReceiveBufferPool::new(65, 4)), 64, cancel_sender.subscribe()));

        let mut oversized = Message::new(MessageType(3), Mode::NONE, vec![0; 60]);
        oversized.header.token = Some(test_token(7));
        let mut regular = Message::new(MessageType(3), Mode::NONE, vec![1, 2, 3]);
        regular.header.token = Some(test_token(7));

        for msg in [oversized, regular] {
            let mut buf = BytesMut::new();
            msg.ser(&mut buf);
            client.send_to(&buf, server_addr).await.unwrap();
        }

        assert!(wait_until(|| tracker.len() == 1, Duration::from_secs(5)).await);
        assert_eq!(tracker.messages()[0].payload.as_ref(), &[1, 2, 3]);

        cancel_sender.send(()).unwrap();
        handle.await.unwrap();
    }
}
