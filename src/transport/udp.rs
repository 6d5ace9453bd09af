use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::messaging::envelope::Envelope;
use crate::transport::TransportEvent;

/// UDP preserves datagram boundaries, so one datagram is one complete envelope and the stream
///  reassembler is bypassed entirely on this path.
pub const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// Fire-and-forget sender for service announcements.
pub struct UdpAnnouncer {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpAnnouncer {
    pub async fn new(target: SocketAddr) -> anyhow::Result<UdpAnnouncer> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.set_broadcast(true)?;
        Ok(UdpAnnouncer {
            socket,
            target,
        })
    }

    /// Fire and forget: a lost announcement is repaired by the next periodic one, so send errors
    ///  are logged and swallowed.
    pub async fn announce(&self, envelope: &Envelope) {
        let frame = envelope.to_frame();
        trace!("announcing {} bytes to {}", frame.len(), self.target);
        if let Err(e) = self.socket.send_to(&frame, self.target).await {
            debug!("error sending announcement to {}: {}", self.target, e);
        }
    }
}


/// Receive loop for announcement datagrams; each one is decoded as a whole envelope and handed
///  upward as a [TransportEvent::Frame].
pub struct UdpDiscoveryListener {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl UdpDiscoveryListener {
    pub async fn bind(bind_addr: SocketAddr, events: mpsc::Sender<TransportEvent>) -> anyhow::Result<UdpDiscoveryListener> {
        let socket = UdpSocket::bind(bind_addr).await?;
        let local_addr = socket.local_addr()?;
        info!("listening for service announcements on {}", local_addr);

        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            loop {
                let (num_read, from) = match socket.recv_from(&mut buf).await {
                    Ok(x) => x,
                    Err(e) => {
                        warn!("announcement socket error: {}", e);
                        continue;
                    }
                };

                let mut datagram = &buf[..num_read];
                match Envelope::try_read(&mut datagram) {
                    Ok(envelope) => {
                        if events.send(TransportEvent::Frame { from, envelope }).await.is_err() {
                            debug!("event receiver gone, stopping announcement listener");
                            return;
                        }
                    }
                    Err(e) => {
                        warn!("received datagram without a valid envelope from {} - discarding: {}", from, e);
                    }
                }
            }
        });

        Ok(UdpDiscoveryListener {
            local_addr,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stop(&self) {
        debug!("stopping announcement listener on {}", self.local_addr);
        self.task.abort();
    }
}


#[cfg(test)]
mod test {
    use bytes::Bytes;
    use tokio::time::timeout;

    use crate::messaging::envelope::MessageKind;

    use super::*;

    #[tokio::test]
    async fn test_announce_and_receive() {
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let listener = UdpDiscoveryListener::bind("127.0.0.1:0".parse().unwrap(), events_tx).await.unwrap();

        let announcer = UdpAnnouncer::new(listener.local_addr()).await.unwrap();
        let sent = Envelope::new(MessageKind::ServiceAnnouncement, 3, Bytes::from_static(b"svc"));
        announcer.announce(&sent).await;

        match timeout(std::time::Duration::from_secs(5), events_rx.recv()).await.unwrap().unwrap() {
            TransportEvent::Frame { envelope, .. } => assert_eq!(envelope, sent),
            other => panic!("unexpected event {:?}", other),
        }

        listener.stop();
    }

    #[tokio::test]
    async fn test_malformed_datagram_is_discarded() {
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let listener = UdpDiscoveryListener::bind("127.0.0.1:0".parse().unwrap(), events_tx).await.unwrap();

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.send_to(b"not an envelope", listener.local_addr()).await.unwrap();

        let good = Envelope::new(MessageKind::ServiceAnnouncement, 1, Bytes::from_static(b"ok"));
        let announcer = UdpAnnouncer::new(listener.local_addr()).await.unwrap();
        announcer.announce(&good).await;

        // the malformed datagram must not surface; the next valid one must
        match timeout(std::time::Duration::from_secs(5), events_rx.recv()).await.unwrap().unwrap() {
            TransportEvent::Frame { envelope, .. } => assert_eq!(envelope, good),
            other => panic!("unexpected event {:?}", other),
        }

        listener.stop();
    }
}
