use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use bytes::Bytes;
use rustc_hash::FxHashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use crate::messaging::frame_reader::FrameReader;
use crate::service::config::NetConfig;
use crate::transport::buffer_pool::BufferPool;
use crate::transport::TransportEvent;

/// State shared between the socket tasks of one transport instance. The connection map is the
///  only cross-task mutable state; its lock is held for the map operation only, never across
///  an I/O call.
struct TcpShared {
    config: Arc<NetConfig>,
    buffer_pool: BufferPool,
    events: mpsc::Sender<TransportEvent>,
    connections: Mutex<FxHashMap<SocketAddr, ConnectionHandle>>,
}

struct ConnectionHandle {
    outbound: mpsc::Sender<Bytes>,
}

impl TcpShared {
    fn new(config: Arc<NetConfig>, events: mpsc::Sender<TransportEvent>) -> Arc<TcpShared> {
        Arc::new(TcpShared {
            buffer_pool: BufferPool::new(config.receive_buffer_size, config.buffer_pool_size),
            config,
            events,
            connections: Default::default(),
        })
    }

    /// Non-blocking enqueue of one finished frame. A full queue means the peer stopped
    ///  draining: the connection is dropped on the spot rather than making the caller wait on
    ///  a peer that may never read again.
    fn send_to(&self, to: SocketAddr, frame: Bytes) -> anyhow::Result<()> {
        let outbound = self.connections.lock().unwrap()
            .get(&to)
            .map(|c| c.outbound.clone());

        let Some(tx) = outbound else {
            return Err(anyhow!("no connection to {}", to));
        };

        match tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.kill_connection(to);
                Err(anyhow!("outbound queue to {} overflowed", to))
            }
            Err(TrySendError::Closed(_)) => Err(anyhow!("connection to {} is closing", to)),
        }
    }

    /// Drops one connection that stopped keeping up. The disconnect event is emitted from a
    ///  detached task: the caller may be the very loop that drains the event queue, and must
    ///  not wait on it.
    fn kill_connection(&self, peer: SocketAddr) {
        if self.connections.lock().unwrap().remove(&peer).is_none() {
            return;
        }
        warn!("peer {} is not draining its outbound queue - dropping the connection", peer);

        let events = self.events.clone();
        tokio::spawn(async move {
            let _ = events.send(TransportEvent::PeerDisconnected { addr: peer }).await;
        });
    }

    /// Dropping the queue senders lets every connection task run to its orderly end.
    fn drop_all_connections(&self) {
        self.connections.lock().unwrap().clear();
    }
}

/// Registers the connection and spawns its task. The task owns the socket: it interleaves
///  frame-reassembling reads with writes drained from the connection's bounded queue, so
///  concurrent senders can never interleave partial writes on one socket.
async fn register_connection(shared: &Arc<TcpShared>, stream: TcpStream, peer: SocketAddr) {
    let _ = stream.set_nodelay(true);

    let (outbound_tx, outbound_rx) = mpsc::channel(shared.config.send_queue_capacity);
    shared.connections.lock().unwrap()
        .insert(peer, ConnectionHandle { outbound: outbound_tx });

    if shared.events.send(TransportEvent::PeerConnected { addr: peer }).await.is_err() {
        debug!("event receiver gone, dropping fresh connection to {}", peer);
        shared.connections.lock().unwrap().remove(&peer);
        return;
    }

    let shared = shared.clone();
    tokio::spawn(run_connection(shared, stream, peer, outbound_rx));
}

async fn run_connection(
    shared: Arc<TcpShared>,
    stream: TcpStream,
    peer: SocketAddr,
    mut outbound_rx: mpsc::Receiver<Bytes>,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut frame_reader = FrameReader::new(shared.config.max_frame_size);

    let reason = loop {
        let mut read_buf = shared.buffer_pool.get_from_pool();
        read_buf.resize(shared.config.receive_buffer_size, 0);

        let exit = tokio::select! {
            read_res = read_half.read(&mut read_buf[..]) => {
                match read_res {
                    Ok(0) => Some("closed by peer"),
                    Ok(n) => {
                        trace!("received {} bytes from {}", n, peer);
                        let mut envelopes = Vec::new();
                        frame_reader.feed(&read_buf[..n], &mut envelopes);

                        let mut exit = None;
                        for envelope in envelopes {
                            if shared.events.send(TransportEvent::Frame { from: peer, envelope }).await.is_err() {
                                exit = Some("event receiver gone");
                                break;
                            }
                        }
                        exit
                    }
                    Err(e) => {
                        debug!("read error on connection to {}: {}", peer, e);
                        Some("read error")
                    }
                }
            }
            queued = outbound_rx.recv() => {
                match queued {
                    Some(frame) => {
                        trace!("sending {} bytes to {}", frame.len(), peer);
                        if let Err(e) = write_half.write_all(&frame).await {
                            debug!("write error on connection to {}: {}", peer, e);
                            Some("write error")
                        }
                        else {
                            None
                        }
                    }
                    None => Some("local shutdown"),
                }
            }
        };

        shared.buffer_pool.return_to_pool(read_buf);
        if let Some(reason) = exit {
            break reason;
        }
    };

    debug!("closing connection to {}: {}", peer, reason);
    let _ = write_half.shutdown().await;

    // on local shutdown the map was already cleared; no event in that case
    let removed = shared.connections.lock().unwrap().remove(&peer);
    if removed.is_some() {
        let _ = shared.events.send(TransportEvent::PeerDisconnected { addr: peer }).await;
    }
}


/// Listening side: accepts any number of peers, one owning task per accepted socket.
pub struct TcpServerTransport {
    shared: Arc<TcpShared>,
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl TcpServerTransport {
    pub async fn bind(bind_addr: SocketAddr, config: Arc<NetConfig>) -> anyhow::Result<(TcpServerTransport, mpsc::Receiver<TransportEvent>)> {
        let listener = TcpListener::bind(bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("listening for peers on {}", local_addr);

        let (events_tx, events_rx) = mpsc::channel(config.event_queue_capacity);
        let shared = TcpShared::new(config, events_tx);

        let accept_shared = shared.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!("accepted connection from {}", peer);
                        register_connection(&accept_shared, stream, peer).await;
                    }
                    Err(e) => {
                        error!("accept error: {}", e);
                    }
                }
            }
        });

        Ok((
            TcpServerTransport {
                shared,
                local_addr,
                accept_task,
            },
            events_rx,
        ))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Enqueues one finished frame for `to` without ever waiting. A connection whose queue
    ///  overflows is treated as dead and dropped.
    pub fn send_to(&self, to: SocketAddr, frame: Bytes) -> anyhow::Result<()> {
        self.shared.send_to(to, frame)
    }

    pub fn connected_addrs(&self) -> Vec<SocketAddr> {
        self.shared.connections.lock().unwrap().keys().cloned().collect()
    }

    /// Closes one connection without touching the others. The task notices its queue sender
    ///  being gone and runs to its orderly end; no disconnect event fires since removal from
    ///  the map happened here.
    pub fn drop_connection(&self, peer: SocketAddr) {
        if self.shared.connections.lock().unwrap().remove(&peer).is_some() {
            debug!("dropping connection to {} on request", peer);
        }
    }

    pub fn shutdown(&self) {
        info!("shutting down TCP transport on {}", self.local_addr);
        self.accept_task.abort();
        self.shared.drop_all_connections();
    }
}


/// Dialing side: exactly one connection, to the server. Reconnecting after a drop is a caller
///  decision (the service directory's), not automatic.
pub struct TcpClientTransport {
    shared: Arc<TcpShared>,
    server_addr: SocketAddr,
}

impl TcpClientTransport {
    pub async fn connect(server_addr: SocketAddr, config: Arc<NetConfig>) -> anyhow::Result<(TcpClientTransport, mpsc::Receiver<TransportEvent>)> {
        let (events_tx, events_rx) = mpsc::channel(config.event_queue_capacity);
        let shared = TcpShared::new(config, events_tx);

        let transport = TcpClientTransport {
            shared,
            server_addr,
        };
        transport.dial().await?;
        Ok((transport, events_rx))
    }

    async fn dial(&self) -> anyhow::Result<()> {
        let stream = timeout(self.shared.config.connect_timeout, TcpStream::connect(self.server_addr)).await
            .map_err(|_| anyhow!("connect to {} timed out", self.server_addr))??;
        info!("connected to server {}", self.server_addr);

        register_connection(&self.shared, stream, self.server_addr).await;
        Ok(())
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    pub fn is_connected(&self) -> bool {
        !self.shared.connections.lock().unwrap().is_empty()
    }

    /// No-op while the connection is up.
    pub async fn reconnect(&self) -> anyhow::Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.dial().await
    }

    pub fn send(&self, frame: Bytes) -> anyhow::Result<()> {
        self.shared.send_to(self.server_addr, frame)
    }

    pub fn shutdown(&self) {
        info!("shutting down TCP connection to {}", self.server_addr);
        self.shared.drop_all_connections();
    }
}
