use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use bytes::BytesMut;
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::messaging::envelope::{Envelope, MessageKind};
use crate::messaging::service_description::{ServiceDescription, ServiceKind};
use crate::service::config::NetConfig;
use crate::service::latency::WireClock;
use crate::service::service::Service;
use crate::transport::udp::{UdpAnnouncer, UdpDiscoveryListener};
use crate::transport::TransportEvent;

struct ProvidedService {
    description: ServiceDescription,
    service: Arc<Service>,
    announce_task: JoinHandle<()>,
}

struct DiscoveryState {
    listener: UdpDiscoveryListener,
    ingest_task: JoinHandle<()>,
}

#[derive(Default)]
struct DirectoryInner {
    /// everything heard in announcements, keyed by service id, last announcement wins
    known: FxHashMap<Uuid, ServiceDescription>,
    requested: FxHashMap<Uuid, Arc<Service>>,
    provided: FxHashMap<ServiceKind, ProvidedService>,
}

/// The per-process entry point: tracks which services exist on the network, which ones this
///  process provides, and which ones it is connected to as a client.
///
/// Reconnecting lives here and nowhere else: a maintenance loop periodically redials every
///  requested service whose connection dropped. The services themselves never reconnect.
pub struct ServiceDirectory {
    config: Arc<NetConfig>,
    clock: Arc<WireClock>,
    inner: Mutex<DirectoryInner>,
    discovery: std::sync::Mutex<Option<DiscoveryState>>,
    requested_latency_micros: AtomicU64,
    maintenance_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ServiceDirectory {
    pub fn new(config: Arc<NetConfig>, clock: Arc<WireClock>) -> Arc<ServiceDirectory> {
        let directory = Arc::new(ServiceDirectory {
            requested_latency_micros: AtomicU64::new(config.requested_latency.as_micros() as u64),
            config,
            clock,
            inner: Default::default(),
            discovery: std::sync::Mutex::new(None),
            maintenance_task: std::sync::Mutex::new(None),
        });

        let task = tokio::spawn(directory.clone().run_maintenance());
        *directory.maintenance_task.lock().unwrap() = Some(task);
        directory
    }

    /// Starts listening for announcement datagrams; idempotent.
    pub async fn start_discovery(self: &Arc<Self>) -> anyhow::Result<()> {
        if self.discovery.lock().unwrap().is_some() {
            return Ok(());
        }

        let bind_addr: SocketAddr = ([0, 0, 0, 0], self.config.announce_port).into();
        let (events_tx, events_rx) = mpsc::channel(self.config.event_queue_capacity);
        let listener = UdpDiscoveryListener::bind(bind_addr, events_tx).await?;

        let ingest_task = tokio::spawn(self.clone().run_ingest(events_rx));
        *self.discovery.lock().unwrap() = Some(DiscoveryState {
            listener,
            ingest_task,
        });
        Ok(())
    }

    pub fn stop_discovery(&self) {
        if let Some(state) = self.discovery.lock().unwrap().take() {
            state.listener.stop();
            state.ingest_task.abort();
        }
    }

    /// The address announcements are received on, once discovery is running.
    pub fn discovery_addr(&self) -> Option<SocketAddr> {
        self.discovery.lock().unwrap()
            .as_ref()
            .map(|s| s.listener.local_addr())
    }

    pub async fn get_available_services(&self, filter: impl Fn(&ServiceDescription) -> bool) -> Vec<ServiceDescription> {
        self.inner.lock().await
            .known.values()
            .filter(|d| filter(d))
            .cloned()
            .collect()
    }

    /// Provides a service of the given kind: binds a server on `description.address` (port 0
    ///  picks an ephemeral port) and announces the bound address periodically. At most one
    ///  provided service per kind.
    pub async fn start_server(self: &Arc<Self>, mut description: ServiceDescription) -> anyhow::Result<Arc<Service>> {
        if self.inner.lock().await.provided.contains_key(&description.kind) {
            bail!("already providing a {:?} service", description.kind);
        }

        // bind and announce outside the lock - the directory stays responsive meanwhile
        let service = Service::start_server(description.address, self.config.clone(), self.clock.clone()).await?;
        service.set_requested_latency(self.requested_latency());
        description.address = service.local_addr().expect("server role has a local address");
        info!("providing {:?}", description);

        let announcer = UdpAnnouncer::new(self.config.announce_target).await?;
        let announce_task = tokio::spawn(run_announce_loop(
            announcer,
            description.clone(),
            self.clock.clone(),
            self.config.announce_interval,
        ));

        let mut inner = self.inner.lock().await;
        if inner.provided.contains_key(&description.kind) {
            // a concurrent call won the race; back out
            announce_task.abort();
            drop(inner);
            service.stop().await;
            bail!("already providing a {:?} service", description.kind);
        }

        inner.provided.insert(description.kind, ProvidedService {
            description,
            service: service.clone(),
            announce_task,
        });
        Ok(service)
    }

    pub async fn stop_server(&self, kind: ServiceKind) {
        let provided = self.inner.lock().await.provided.remove(&kind);
        if let Some(provided) = provided {
            info!("no longer providing {:?}", provided.description);
            provided.announce_task.abort();
            provided.service.stop().await;
        }
    }

    /// Connects to a previously discovered service. Idempotent: a second call for the same id
    ///  returns the existing connection. Connecting to a service this process provides itself
    ///  is an error.
    pub async fn try_connect_to_service(&self, service_id: Uuid) -> anyhow::Result<Arc<Service>> {
        let description = {
            let inner = self.inner.lock().await;

            if let Some(existing) = inner.requested.get(&service_id) {
                trace!("already connected to service {}", service_id);
                return Ok(existing.clone());
            }
            if inner.provided.values().any(|p| p.description.service_id == service_id) {
                bail!("service {} is provided by this process", service_id);
            }

            let Some(description) = inner.known.get(&service_id).cloned() else {
                bail!("unknown service {}", service_id);
            };
            description
        };

        // dial with the lock released - a slow connect must not block announcement ingest or
        //  any other directory operation
        info!("connecting to {:?}", description);
        let service = Service::connect(description.address, self.config.clone(), self.clock.clone()).await?;
        service.set_requested_latency(self.requested_latency());

        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner.requested.get(&service_id).cloned() {
            // a concurrent call connected first; keep that one
            drop(inner);
            service.stop().await;
            return Ok(existing);
        }

        inner.requested.insert(service_id, service.clone());
        Ok(service)
    }

    pub async fn disconnect_from_service(&self, service_id: Uuid) {
        let service = self.inner.lock().await.requested.remove(&service_id);
        if let Some(service) = service {
            info!("disconnecting from service {}", service_id);
            service.stop().await;
        }
    }

    pub fn requested_latency(&self) -> Duration {
        Duration::from_micros(self.requested_latency_micros.load(Ordering::Relaxed))
    }

    /// Applies to every current and future service managed by this directory.
    pub async fn set_requested_latency(&self, latency: Duration) {
        self.requested_latency_micros.store(latency.as_micros() as u64, Ordering::Relaxed);

        let inner = self.inner.lock().await;
        for service in inner.requested.values() {
            service.set_requested_latency(latency);
        }
        for provided in inner.provided.values() {
            provided.service.set_requested_latency(latency);
        }
    }

    /// Stops discovery, all provided servers and all requested connections.
    pub async fn shutdown(&self) {
        info!("shutting down service directory");
        self.stop_discovery();
        if let Some(task) = self.maintenance_task.lock().unwrap().take() {
            task.abort();
        }

        let mut inner = self.inner.lock().await;
        for (_, provided) in inner.provided.drain() {
            provided.announce_task.abort();
            provided.service.stop().await;
        }
        for (_, service) in inner.requested.drain() {
            service.stop().await;
        }
    }

    async fn run_ingest(self: Arc<Self>, mut events: mpsc::Receiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            let TransportEvent::Frame { from, envelope } = event else {
                continue;
            };
            if envelope.kind != MessageKind::ServiceAnnouncement {
                trace!("ignoring {:?} datagram from {}", envelope.kind, from);
                continue;
            }

            match ServiceDescription::try_read(&mut &envelope.payload[..]) {
                Ok(description) => {
                    let mut inner = self.inner.lock().await;
                    if inner.provided.values().any(|p| p.description.service_id == description.service_id) {
                        continue; // our own announcement reflected back
                    }
                    if inner.known.insert(description.service_id, description.clone()).is_none() {
                        debug!("discovered {:?}", description);
                    }
                }
                Err(e) => {
                    warn!("malformed service announcement from {} - discarding: {}", from, e);
                }
            }
        }
    }

    async fn run_maintenance(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.reconnect_interval);
        loop {
            interval.tick().await;

            let requested: Vec<_> = self.inner.lock().await
                .requested.iter()
                .map(|(id, s)| (*id, s.clone()))
                .collect();

            for (service_id, service) in requested {
                if service.is_connected() {
                    continue;
                }
                info!("connection to service {} is down, redialing", service_id);
                if let Err(e) = service.reconnect().await {
                    debug!("redialing service {} failed, retrying later: {}", service_id, e);
                }
            }
        }
    }
}

async fn run_announce_loop(
    announcer: UdpAnnouncer,
    description: ServiceDescription,
    clock: Arc<WireClock>,
    announce_interval: Duration,
) {
    let mut payload = BytesMut::new();
    description.ser(&mut payload);
    let payload = payload.freeze();

    let mut interval = tokio::time::interval(announce_interval);
    loop {
        interval.tick().await;
        let envelope = Envelope::new(MessageKind::ServiceAnnouncement, clock.now_micros(), payload.clone());
        announcer.announce(&envelope).await;
    }
}
