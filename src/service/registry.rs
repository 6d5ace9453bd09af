use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::messaging::peer_addr::PeerAddr;
use crate::service::events::{PeerInfo, ServiceEvent, ServiceEventNotifier};
use crate::service::latency::{LatencyEstimator, PongData};

/// Lifecycle of one remote peer. Legal transitions:
/// `Connecting -> Connected -> {Missing | Disconnected}` and
/// `Missing -> {Connected (reappeared) | Disconnected}`; `Disconnected` removes the record, so
///  it is never observable as a stored status.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PeerStatus {
    /// socket is open but the peer has not confirmed itself at protocol level yet
    Connecting,
    Connected,
    /// no traffic within the timeout, and no clean disconnect either
    Missing,
}

pub struct PeerRecord {
    pub addr: PeerAddr,
    pub status: PeerStatus,
    pub last_seen: Instant,
    pub latency: LatencyEstimator,
    /// no `Client*` events for this record - its lifecycle is reported through the server
    ///  connection events instead (the client role's record of its server)
    pub quiet: bool,
}

/// The sole authority on peer liveness: raw socket events and protocol-level envelopes both
///  funnel into here, and nothing above this layer may infer liveness from socket state alone -
///  a socket can stay open long after the application-level peer went quiet.
pub struct ConnectionRegistry {
    peers: FxHashMap<SocketAddr, PeerRecord>,
    notifier: Arc<ServiceEventNotifier>,
}

impl ConnectionRegistry {
    pub fn new(notifier: Arc<ServiceEventNotifier>) -> ConnectionRegistry {
        ConnectionRegistry {
            peers: FxHashMap::default(),
            notifier,
        }
    }

    /// Transport-level connect: the record starts unconfirmed.
    pub fn on_socket_connected(&mut self, socket_addr: SocketAddr) {
        self.peers.entry(socket_addr)
            .or_insert_with(|| {
                trace!("new peer record for {}", socket_addr);
                PeerRecord {
                    addr: PeerAddr::new(0, socket_addr),
                    status: PeerStatus::Connecting,
                    last_seen: Instant::now(),
                    latency: LatencyEstimator::default(),
                    quiet: false,
                }
            });
    }

    /// Protocol-level connect envelope naming the peer's logical id: confirms the peer and
    ///  fires `ClientConnected`. Creates the record fresh if the socket event got lost.
    pub fn on_hello(&mut self, socket_addr: SocketAddr, unique: u32) {
        let record = self.peers.entry(socket_addr)
            .or_insert_with(|| PeerRecord {
                addr: PeerAddr::new(unique, socket_addr),
                status: PeerStatus::Connecting,
                last_seen: Instant::now(),
                latency: LatencyEstimator::default(),
                quiet: false,
            });

        record.addr.unique = unique;
        record.status = PeerStatus::Connected;
        record.last_seen = Instant::now();

        debug!("peer {:?} connected", record.addr);
        self.notifier.send_event(ServiceEvent::ClientConnected(PeerInfo { addr: record.addr }));
    }

    /// Confirms a peer and marks its record quiet: no `Client*` lifecycle events, ever - used
    ///  by the client role for its server record, whose lifecycle is reported through
    ///  `ConnectedToServer` / `DisconnectedFromServer` instead.
    pub fn confirm_quietly(&mut self, socket_addr: SocketAddr, unique: u32) {
        self.on_socket_connected(socket_addr);
        let record = self.peers.get_mut(&socket_addr).expect("record was just ensured");
        record.addr.unique = unique;
        record.status = PeerStatus::Connected;
        record.last_seen = Instant::now();
        record.quiet = true;
    }

    /// Every inbound envelope refreshes liveness; traffic from a missing peer brings it back.
    pub fn on_envelope(&mut self, socket_addr: SocketAddr) {
        let Some(record) = self.peers.get_mut(&socket_addr) else {
            return;
        };

        record.last_seen = Instant::now();
        if record.status == PeerStatus::Missing {
            record.status = PeerStatus::Connected;
            debug!("peer {:?} reappeared", record.addr);
            if !record.quiet {
                self.notifier.send_event(ServiceEvent::ClientReappeared(PeerInfo { addr: record.addr }));
            }
        }
    }

    pub fn on_pong(&mut self, socket_addr: SocketAddr, pong: &PongData, now_micros: u64) {
        if let Some(record) = self.peers.get_mut(&socket_addr) {
            record.latency.on_pong(pong, now_micros);
        }
    }

    /// Clean disconnect, from either a protocol-level disconnect envelope or a socket close.
    ///  Removes the record; fires `ClientDisconnected` only for peers that ever confirmed.
    pub fn on_disconnect(&mut self, socket_addr: SocketAddr) {
        let Some(record) = self.peers.remove(&socket_addr) else {
            return;
        };

        match record.status {
            PeerStatus::Connecting => {
                debug!("unconfirmed peer {} disconnected", socket_addr);
            }
            PeerStatus::Connected | PeerStatus::Missing => {
                debug!("peer {:?} disconnected", record.addr);
                if !record.quiet {
                    self.notifier.send_event(ServiceEvent::ClientDisconnected(PeerInfo { addr: record.addr }));
                }
            }
        }
    }

    /// Periodic staleness check. Connected peers past the timeout go missing (once per
    ///  episode); unconfirmed peers past the timeout are failed connect attempts and are
    ///  dropped outright.
    pub fn sweep(&mut self, timeout: Duration) {
        let now = Instant::now();

        let mut failed_connects = Vec::new();
        for (socket_addr, record) in self.peers.iter_mut() {
            if now.duration_since(record.last_seen) < timeout {
                continue;
            }

            match record.status {
                PeerStatus::Connected => {
                    record.status = PeerStatus::Missing;
                    warn!("peer {:?} went missing: no traffic for {:?}", record.addr, timeout);
                    if !record.quiet {
                        self.notifier.send_event(ServiceEvent::ClientDisappeared(PeerInfo { addr: record.addr }));
                    }
                }
                PeerStatus::Connecting => {
                    debug!("peer {} never confirmed within {:?} - treating as failed connect", socket_addr, timeout);
                    failed_connects.push(*socket_addr);
                }
                PeerStatus::Missing => {
                    // stays missing until it reappears or disconnects
                }
            }
        }

        for socket_addr in failed_connects {
            self.peers.remove(&socket_addr);
        }
    }

    pub fn connected_addrs(&self) -> Vec<SocketAddr> {
        self.peers.iter()
            .filter(|(_, r)| r.status == PeerStatus::Connected)
            .map(|(addr, _)| *addr)
            .collect()
    }

    pub fn get(&self, socket_addr: &SocketAddr) -> Option<&PeerRecord> {
        self.peers.get(socket_addr)
    }

    pub fn peer_latency(&self, socket_addr: &SocketAddr) -> Option<Duration> {
        self.peers.get(socket_addr)
            .and_then(|r| r.latency.latency())
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
