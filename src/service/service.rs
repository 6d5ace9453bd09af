use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::messaging::envelope::{Envelope, MessageKind};
use crate::messaging::peer_addr::PeerAddr;
use crate::service::config::NetConfig;
use crate::service::events::{ServiceEvent, ServiceEventNotifier};
use crate::service::filter::{Direction, EnvelopeFilter};
use crate::service::latency::{ping_payload, try_read_ping, PongData, WireClock};
use crate::service::registry::ConnectionRegistry;
use crate::transport::tcp::{TcpClientTransport, TcpServerTransport};
use crate::transport::TransportEvent;
use crate::util::buf_ext::BufExt;

/// Fixed at service start; determines the fan-out behavior of [Service::send].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Role {
    Client,
    Server,
}

/// Receives decoded envelopes of the kind it was registered for. Implemented by the external
///  collaborators (rendering, tracking, UI) that consume this layer.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn on_message(&self, from: PeerAddr, envelope: Envelope);
}

enum RoleTransport {
    Server(TcpServerTransport),
    Client(TcpClientTransport),
}

/// One logical, independently connectable data channel, bound to its own transport instance.
///
/// Inbound envelopes run through a fixed pipeline: liveness refresh, protocol-internal kinds
///  (hello / disconnect / ping / pong), the optional filter, synthetic latency, then the
///  registered handler for the kind.
pub struct Service {
    config: Arc<NetConfig>,
    clock: Arc<WireClock>,
    transport: RoleTransport,
    /// the logical id this process identifies itself with in hello envelopes
    my_unique: u32,
    handlers: RwLock<FxHashMap<MessageKind, Arc<dyn MessageHandler>>>,
    registry: RwLock<ConnectionRegistry>,
    notifier: Arc<ServiceEventNotifier>,
    filter: std::sync::RwLock<Option<Arc<dyn EnvelopeFilter>>>,
    requested_latency_micros: AtomicU64,
    unhandled_warned: Mutex<FxHashSet<MessageKind>>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl Service {
    /// Binds a SERVER-role service: accepts any number of peers and fans every send out to all
    ///  of them.
    pub async fn start_server(bind_addr: SocketAddr, config: Arc<NetConfig>, clock: Arc<WireClock>) -> anyhow::Result<Arc<Service>> {
        let (transport, events_rx) = TcpServerTransport::bind(bind_addr, config.clone()).await?;
        Ok(Self::launch(RoleTransport::Server(transport), config, clock, events_rx))
    }

    /// Connects a CLIENT-role service to exactly one remote server.
    pub async fn connect(server_addr: SocketAddr, config: Arc<NetConfig>, clock: Arc<WireClock>) -> anyhow::Result<Arc<Service>> {
        let (transport, events_rx) = TcpClientTransport::connect(server_addr, config.clone()).await?;
        Ok(Self::launch(RoleTransport::Client(transport), config, clock, events_rx))
    }

    fn launch(transport: RoleTransport, config: Arc<NetConfig>, clock: Arc<WireClock>, events_rx: mpsc::Receiver<TransportEvent>) -> Arc<Service> {
        let notifier = Arc::new(ServiceEventNotifier::new());

        let service = Arc::new(Service {
            requested_latency_micros: AtomicU64::new(config.requested_latency.as_micros() as u64),
            config,
            clock,
            transport,
            my_unique: rand::random(),
            handlers: Default::default(),
            registry: RwLock::new(ConnectionRegistry::new(notifier.clone())),
            notifier,
            filter: std::sync::RwLock::new(None),
            unhandled_warned: Default::default(),
            event_loop: Mutex::new(None),
        });

        let task = tokio::spawn(service.clone().run_event_loop(events_rx));
        *service.event_loop.lock().unwrap() = Some(task);
        service
    }

    pub fn role(&self) -> Role {
        match &self.transport {
            RoleTransport::Server(_) => Role::Server,
            RoleTransport::Client(_) => Role::Client,
        }
    }

    /// Server role only; the address peers dial.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.transport {
            RoleTransport::Server(t) => Some(t.local_addr()),
            RoleTransport::Client(_) => None,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ServiceEvent> {
        self.notifier.subscribe()
    }

    /// At most one handler per kind; re-registering replaces silently. Returns `true` when the
    ///  kind was not registered before.
    pub async fn register_handler(&self, kind: MessageKind, handler: Arc<dyn MessageHandler>) -> bool {
        self.handlers.write().await
            .insert(kind, handler)
            .is_none()
    }

    pub async fn unregister_handler(&self, kind: MessageKind) -> bool {
        self.handlers.write().await
            .remove(&kind)
            .is_some()
    }

    pub fn set_filter(&self, filter: Option<Arc<dyn EnvelopeFilter>>) {
        *self.filter.write().unwrap() = filter;
    }

    /// Minimum artificial one-way latency; dispatch of inbound messages is delayed by whatever
    ///  the measured latency falls short of this.
    pub fn set_requested_latency(&self, latency: Duration) {
        self.requested_latency_micros.store(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn is_connected(&self) -> bool {
        match &self.transport {
            RoleTransport::Server(_) => true,
            RoleTransport::Client(t) => t.is_connected(),
        }
    }

    pub async fn connected_peer_count(&self) -> usize {
        self.registry.read().await.connected_addrs().len()
    }

    /// Client role: dials the server again after a lost connection. Driven by the service
    ///  directory; the service itself never reconnects on its own.
    pub async fn reconnect(&self) -> anyhow::Result<()> {
        match &self.transport {
            RoleTransport::Server(_) => Ok(()),
            RoleTransport::Client(t) => t.reconnect().await,
        }
    }

    /// Sends one message to every connected peer (server role) or to the server (client role).
    ///  With nobody connected this is a silent no-op. Errors on individual peers are logged,
    ///  never propagated - a failing peer is reported through its own disconnect event.
    pub async fn send(&self, kind: MessageKind, payload: Bytes) {
        let envelope = Envelope::new(kind, self.clock.now_micros(), payload);

        let Some(envelope) = self.filter_envelope(Direction::Outbound, envelope) else {
            return;
        };
        let frame = envelope.to_frame();

        match &self.transport {
            RoleTransport::Server(t) => {
                let addrs = self.registry.read().await.connected_addrs();
                for addr in addrs {
                    if let Err(e) = t.send_to(addr, frame.clone()) {
                        debug!("error sending {:?} to {}: {}", envelope.kind, addr, e);
                    }
                }
            }
            RoleTransport::Client(t) => {
                if !t.is_connected() {
                    trace!("not connected, dropping outbound {:?}", envelope.kind);
                    return;
                }
                if let Err(e) = t.send(frame) {
                    debug!("error sending {:?} to server: {}", envelope.kind, e);
                }
            }
        }
    }

    /// Stops all background loops and closes the transport. A connected client announces the
    ///  disconnect to its server first so the server can clean up without waiting for a sweep.
    pub async fn stop(&self) {
        info!("stopping {:?} service", self.role());

        if let RoleTransport::Client(t) = &self.transport {
            if t.is_connected() {
                let goodbye = Envelope::new(MessageKind::DisconnectFromServer, self.clock.now_micros(), Bytes::new());
                self.send_direct(t.server_addr(), goodbye);
            }
        }

        if let Some(task) = self.event_loop.lock().unwrap().take() {
            task.abort();
        }
        match &self.transport {
            RoleTransport::Server(t) => t.shutdown(),
            RoleTransport::Client(t) => t.shutdown(),
        }
    }

    async fn run_event_loop(self: Arc<Self>, mut events: mpsc::Receiver<TransportEvent>) {
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        let mut sweep = tokio::time::interval(self.config.sweep_interval);

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(TransportEvent::PeerConnected { addr }) => self.on_peer_connected(addr).await,
                        Some(TransportEvent::PeerDisconnected { addr }) => self.on_peer_disconnected(addr).await,
                        Some(TransportEvent::Frame { from, envelope }) => self.on_frame(from, envelope).await,
                        None => {
                            debug!("transport gone, stopping event loop");
                            break;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    self.send_heartbeat().await;
                }
                _ = sweep.tick() => {
                    self.registry.write().await.sweep(self.config.peer_timeout);
                }
            }
        }
    }

    async fn on_peer_connected(&self, addr: SocketAddr) {
        match &self.transport {
            RoleTransport::Server(_) => {
                // confirmation comes from the peer's hello envelope
                self.registry.write().await.on_socket_connected(addr);
            }
            RoleTransport::Client(_) => {
                // a successful dial is the confirmation; introduce ourselves
                self.registry.write().await.confirm_quietly(addr, 0);
                let hello = Envelope::new(MessageKind::ConnectToServer, self.clock.now_micros(), hello_payload(self.my_unique));
                self.send_direct(addr, hello);
                self.notifier.send_event(ServiceEvent::ConnectedToServer);
            }
        }
    }

    async fn on_peer_disconnected(&self, addr: SocketAddr) {
        self.registry.write().await.on_disconnect(addr);
        if matches!(self.transport, RoleTransport::Client(_)) {
            self.notifier.send_event(ServiceEvent::DisconnectedFromServer);
        }
    }

    async fn on_frame(self: &Arc<Self>, from: SocketAddr, envelope: Envelope) {
        let received_micros = self.clock.now_micros();
        self.registry.write().await.on_envelope(from);

        match envelope.kind {
            MessageKind::ConnectToServer => {
                match try_read_hello(&envelope.payload) {
                    Ok(unique) => self.registry.write().await.on_hello(from, unique),
                    Err(e) => warn!("malformed hello from {} - ignoring: {}", from, e),
                }
            }
            MessageKind::DisconnectFromServer => {
                self.registry.write().await.on_disconnect(from);
                if let RoleTransport::Server(t) = &self.transport {
                    t.drop_connection(from);
                }
            }
            MessageKind::Ping => {
                match try_read_ping(&envelope.payload) {
                    Ok(origin_send_micros) => {
                        let pong = PongData {
                            origin_send_micros,
                            peer_recv_micros: received_micros,
                            peer_send_micros: self.clock.now_micros(),
                        };
                        let reply = Envelope::new(MessageKind::Pong, self.clock.now_micros(), pong.ser_payload());
                        self.send_direct(from, reply);
                    }
                    Err(e) => warn!("malformed ping from {} - ignoring: {}", from, e),
                }
            }
            MessageKind::Pong => {
                match PongData::try_read(&envelope.payload) {
                    Ok(pong) => self.registry.write().await.on_pong(from, &pong, received_micros),
                    Err(e) => warn!("malformed pong from {} - ignoring: {}", from, e),
                }
            }
            _ => {
                self.dispatch(from, envelope).await;
            }
        }
    }

    async fn dispatch(self: &Arc<Self>, from: SocketAddr, envelope: Envelope) {
        let Some(envelope) = self.filter_envelope(Direction::Inbound, envelope) else {
            trace!("filter dropped inbound envelope from {}", from);
            return;
        };

        let handler = self.handlers.read().await
            .get(&envelope.kind)
            .cloned();
        let Some(handler) = handler else {
            let mut warned = self.unhandled_warned.lock().unwrap();
            if warned.insert(envelope.kind) {
                warn!("no handler registered for {:?} messages - dropping them (reported once per kind)", envelope.kind);
            }
            return;
        };

        let peer = self.registry.read().await
            .get(&from)
            .map(|r| r.addr)
            .unwrap_or_else(|| PeerAddr::new(0, from));

        let requested = Duration::from_micros(self.requested_latency_micros.load(Ordering::Relaxed));
        let measured = self.registry.read().await
            .peer_latency(&from)
            .unwrap_or(Duration::ZERO);

        if requested > measured {
            // each message is delayed independently, so handler-side reordering relative to
            //  undelayed messages is possible here
            let delay = requested - measured;
            trace!("delaying {:?} dispatch by {:?}", envelope.kind, delay);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                handler.on_message(peer, envelope).await;
            });
        }
        else {
            handler.on_message(peer, envelope).await;
        }
    }

    async fn send_heartbeat(&self) {
        let targets = match &self.transport {
            RoleTransport::Server(_) => self.registry.read().await.connected_addrs(),
            RoleTransport::Client(t) => {
                if t.is_connected() {
                    vec![t.server_addr()]
                }
                else {
                    return;
                }
            }
        };

        for to in targets {
            let now = self.clock.now_micros();
            let ping = Envelope::new(MessageKind::Ping, now, ping_payload(now));
            self.send_direct(to, ping);
        }
    }

    /// Addressed send for protocol-internal envelopes; runs through the outbound filter like
    ///  everything else. Never waits: this is called from the event loop itself, and a peer
    ///  that stopped draining must not stall dispatch for everyone else.
    fn send_direct(&self, to: SocketAddr, envelope: Envelope) {
        let Some(envelope) = self.filter_envelope(Direction::Outbound, envelope) else {
            return;
        };
        let frame = envelope.to_frame();

        let result = match &self.transport {
            RoleTransport::Server(t) => t.send_to(to, frame),
            RoleTransport::Client(t) => t.send(frame),
        };
        if let Err(e) = result {
            debug!("error sending {:?} to {}: {}", envelope.kind, to, e);
        }
    }

    fn filter_envelope(&self, direction: Direction, envelope: Envelope) -> Option<Envelope> {
        let filter = self.filter.read().unwrap().clone();
        match filter {
            Some(filter) => filter.apply(direction, envelope),
            None => Some(envelope),
        }
    }
}

fn hello_payload(unique: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(size_of::<u32>());
    buf.put_u32_le(unique);
    buf.freeze()
}

fn try_read_hello(mut payload: &[u8]) -> anyhow::Result<u32> {
    payload.try_get_u32_le()
}


#[cfg(test)]
mod test {
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::sync::mpsc::UnboundedSender;
    use tokio::time::{timeout, Instant};

    use crate::service::filter::MockEnvelopeFilter;

    use super::*;

    async fn next_server_event(events: &mut broadcast::Receiver<ServiceEvent>) -> ServiceEvent {
        timeout(Duration::from_secs(5), events.recv()).await
            .expect("timeout waiting for service event")
            .expect("event channel closed")
    }

    struct RecordingHandler {
        tx: UnboundedSender<(PeerAddr, Envelope)>,
    }
    #[async_trait]
    impl MessageHandler for RecordingHandler {
        async fn on_message(&self, from: PeerAddr, envelope: Envelope) {
            let _ = self.tx.send((from, envelope));
        }
    }

    fn recording_handler() -> (Arc<RecordingHandler>, tokio::sync::mpsc::UnboundedReceiver<(PeerAddr, Envelope)>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Arc::new(RecordingHandler { tx }), rx)
    }

    async fn server_client_pair(config: Arc<NetConfig>) -> (Arc<Service>, Arc<Service>) {
        let clock = Arc::new(WireClock::new());
        let server = Service::start_server("127.0.0.1:0".parse().unwrap(), config.clone(), clock.clone()).await.unwrap();
        let client = Service::connect(server.local_addr().unwrap(), config, clock).await.unwrap();
        (server, client)
    }

    #[tokio::test]
    async fn test_client_message_reaches_server_handler() {
        let (server, client) = server_client_pair(Arc::new(NetConfig::new())).await;

        let mut server_events = server.subscribe_events();
        let (handler, mut received) = recording_handler();
        assert!(server.register_handler(MessageKind::StateUpdate, handler).await);

        client.send(MessageKind::StateUpdate, Bytes::from_static(b"pose")).await;

        let (_, envelope) = timeout(Duration::from_secs(5), received.recv()).await.unwrap().unwrap();
        assert_eq!(envelope.kind, MessageKind::StateUpdate);
        assert_eq!(&envelope.payload[..], b"pose");

        // the hello must have confirmed the client exactly once
        let event = timeout(Duration::from_secs(5), server_events.recv()).await.unwrap().unwrap();
        assert!(matches!(event, ServiceEvent::ClientConnected(_)));

        client.stop().await;
        server.stop().await;
    }

    #[tokio::test]
    async fn test_server_send_fans_out_to_client() {
        let (server, client) = server_client_pair(Arc::new(NetConfig::new())).await;

        let (handler, mut received) = recording_handler();
        client.register_handler(MessageKind::RoomUpdate, handler).await;

        // wait until the server has confirmed the client before fanning out
        let mut server_events = server.subscribe_events();
        loop {
            let event = timeout(Duration::from_secs(5), server_events.recv()).await.unwrap().unwrap();
            if matches!(event, ServiceEvent::ClientConnected(_)) {
                break;
            }
        }

        server.send(MessageKind::RoomUpdate, Bytes::from_static(b"room 42")).await;

        let (_, envelope) = timeout(Duration::from_secs(5), received.recv()).await.unwrap().unwrap();
        assert_eq!(&envelope.payload[..], b"room 42");

        client.stop().await;
        server.stop().await;
    }

    #[tokio::test]
    async fn test_send_with_zero_peers_is_a_no_op() {
        let config = Arc::new(NetConfig::new());
        let clock = Arc::new(WireClock::new());
        let server = Service::start_server("127.0.0.1:0".parse().unwrap(), config, clock).await.unwrap();

        // nobody connected; must neither fail nor panic
        server.send(MessageKind::StateUpdate, Bytes::from_static(b"nobody")).await;
        server.stop().await;
    }

    #[tokio::test]
    async fn test_requested_latency_delays_dispatch() {
        let (server, client) = server_client_pair(Arc::new(NetConfig::new())).await;

        let (handler, mut received) = recording_handler();
        server.register_handler(MessageKind::BodyFrame, handler).await;
        server.set_requested_latency(Duration::from_millis(300));

        let sent_at = Instant::now();
        client.send(MessageKind::BodyFrame, Bytes::from_static(b"skeleton")).await;

        timeout(Duration::from_secs(5), received.recv()).await.unwrap().unwrap();
        // measured latency starts at zero, so the full requested latency applies
        assert!(sent_at.elapsed() >= Duration::from_millis(250), "dispatch was not delayed: {:?}", sent_at.elapsed());

        client.stop().await;
        server.stop().await;
    }

    #[tokio::test]
    async fn test_measured_latency_above_requested_bypasses_delay() {
        let (server, client) = server_client_pair(Arc::new(NetConfig::new())).await;

        let (handler, mut received) = recording_handler();
        server.register_handler(MessageKind::BodyFrame, handler).await;

        let peer = timeout(Duration::from_secs(5), async {
            loop {
                if let Some(addr) = server.registry.read().await.connected_addrs().first().copied() {
                    return addr;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }).await.expect("client never confirmed");

        // pretend the peer already measures at 3s one-way, above the 2s requested below
        server.registry.write().await.on_pong(peer, &PongData {
            origin_send_micros: 0,
            peer_recv_micros: 0,
            peer_send_micros: 0,
        }, 6_000_000);
        server.set_requested_latency(Duration::from_secs(2));

        let sent_at = Instant::now();
        client.send(MessageKind::BodyFrame, Bytes::from_static(b"skeleton")).await;

        timeout(Duration::from_secs(5), received.recv()).await.unwrap().unwrap();
        assert!(sent_at.elapsed() < Duration::from_secs(1),
                "dispatch was delayed although the measured latency exceeds the requested one: {:?}", sent_at.elapsed());

        client.stop().await;
        server.stop().await;
    }

    #[tokio::test]
    async fn test_stalled_peer_does_not_stall_the_service() {
        let config = Arc::new(NetConfig {
            send_queue_capacity: 2,
            heartbeat_interval: Duration::from_millis(50),
            ..NetConfig::new()
        });
        let clock = Arc::new(WireClock::new());
        let server = Service::start_server("127.0.0.1:0".parse().unwrap(), config.clone(), clock.clone()).await.unwrap();
        let mut server_events = server.subscribe_events();

        // a raw peer that introduces itself and then never reads anything again
        let mut stalled = tokio::net::TcpStream::connect(server.local_addr().unwrap()).await.unwrap();
        let hello = Envelope::new(MessageKind::ConnectToServer, 0, hello_payload(0xdead));
        tokio::io::AsyncWriteExt::write_all(&mut stalled, &hello.to_frame()).await.unwrap();
        assert!(matches!(next_server_event(&mut server_events).await, ServiceEvent::ClientConnected(_)));

        // push traffic until the stalled peer's queue overflows and it gets dropped
        let big = Bytes::from(vec![0u8; 64 * 1024]);
        let dropped = timeout(Duration::from_secs(10), async {
            loop {
                server.send(MessageKind::PointCloud, big.clone()).await;
                match server_events.try_recv() {
                    Ok(ServiceEvent::ClientDisconnected(_)) => return,
                    Ok(_) | Err(TryRecvError::Empty) => {}
                    Err(e) => panic!("event stream broke: {:?}", e),
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }).await;
        assert!(dropped.is_ok(), "the stalled peer was never reported as disconnected");

        // the event loop must still be alive: a fresh client is served normally
        let (handler, mut received) = recording_handler();
        server.register_handler(MessageKind::StateUpdate, handler).await;
        let client = Service::connect(server.local_addr().unwrap(), config, clock).await.unwrap();
        client.send(MessageKind::StateUpdate, Bytes::from_static(b"still alive")).await;

        let (_, envelope) = timeout(Duration::from_secs(5), received.recv()).await
            .expect("a healthy client's message was never dispatched")
            .unwrap();
        assert_eq!(&envelope.payload[..], b"still alive");

        drop(stalled);
        client.stop().await;
        server.stop().await;
    }

    #[tokio::test]
    async fn test_filter_can_drop_inbound() {
        let (server, client) = server_client_pair(Arc::new(NetConfig::new())).await;

        let (handler, mut received) = recording_handler();
        server.register_handler(MessageKind::UserUpdate, handler).await;

        let mut filter = MockEnvelopeFilter::new();
        filter.expect_apply()
            .returning(|direction, envelope| {
                match direction {
                    Direction::Inbound if envelope.kind == MessageKind::UserUpdate => None,
                    _ => Some(envelope),
                }
            });
        server.set_filter(Some(Arc::new(filter)));

        client.send(MessageKind::UserUpdate, Bytes::from_static(b"dropped")).await;

        assert!(timeout(Duration::from_millis(500), received.recv()).await.is_err());

        client.stop().await;
        server.stop().await;
    }

    #[tokio::test]
    async fn test_register_handler_replaces_silently() {
        let config = Arc::new(NetConfig::new());
        let clock = Arc::new(WireClock::new());
        let server = Service::start_server("127.0.0.1:0".parse().unwrap(), config, clock).await.unwrap();

        let (first, _rx1) = recording_handler();
        let (second, _rx2) = recording_handler();

        assert!(server.register_handler(MessageKind::AudioFrame, first).await);
        assert!(!server.register_handler(MessageKind::AudioFrame, second).await);
        assert!(server.unregister_handler(MessageKind::AudioFrame).await);
        assert!(!server.unregister_handler(MessageKind::AudioFrame).await);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_ping_pong_produces_latency_estimate() {
        let config = Arc::new(NetConfig {
            heartbeat_interval: Duration::from_millis(50),
            ..NetConfig::new()
        });
        let (server, client) = server_client_pair(config).await;

        // give a few heartbeat rounds time to complete
        tokio::time::sleep(Duration::from_millis(300)).await;

        let server_addr = client.local_addr();
        assert!(server_addr.is_none());
        let latency = client.registry.read().await
            .peer_latency(&match &client.transport {
                RoleTransport::Client(t) => t.server_addr(),
                _ => unreachable!(),
            });
        assert!(latency.is_some(), "no latency estimate after heartbeats");

        client.stop().await;
        server.stop().await;
    }
}
