use tokio::sync::broadcast;
use tracing::trace;

use crate::messaging::peer_addr::PeerAddr;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PeerInfo {
    pub addr: PeerAddr,
}

/// Lifecycle notifications a service raises toward its collaborators (rendering, tracking, UI).
///
/// `ClientDisappeared` / `ClientReappeared` bracket one episode of a peer going quiet without a
///  clean disconnect; exactly one of each fires per episode.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ServiceEvent {
    ClientConnected(PeerInfo),
    ClientDisconnected(PeerInfo),
    ClientDisappeared(PeerInfo),
    ClientReappeared(PeerInfo),
    ConnectedToServer,
    DisconnectedFromServer,
}

pub struct ServiceEventNotifier {
    sender: broadcast::Sender<ServiceEvent>,
}
impl ServiceEventNotifier {
    pub fn new() -> ServiceEventNotifier {
        let (sender, _) = broadcast::channel(128);

        ServiceEventNotifier {
            sender
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.sender.subscribe()
    }

    pub fn send_event(&self, event: ServiceEvent) {
        trace!("event: {:?}", event);
        let _ = self.sender.send(event);
    }
}

impl Default for ServiceEventNotifier {
    fn default() -> Self {
        ServiceEventNotifier::new()
    }
}
