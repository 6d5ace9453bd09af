pub mod buffer_pool;
pub mod tcp;
pub mod udp;

use std::net::SocketAddr;

use crate::messaging::envelope::Envelope;

/// What a transport reports upward to its owning service. Socket-level only - protocol-level
///  lifecycle (hello envelopes, liveness) is layered on top by the connection registry.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    PeerConnected { addr: SocketAddr },
    PeerDisconnected { addr: SocketAddr },
    Frame { from: SocketAddr, envelope: Envelope },
}
