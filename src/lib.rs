//! Point-to-point message transport for telepresence peers.
//!
//! The crate is organized in three layers:
//! * [messaging] - the binary envelope codec (`[length:u32][kind:u8][timestamp:u64]` + payload,
//!   little-endian), the incremental stream reassembler that turns arbitrary TCP deliveries back
//!   into whole envelopes, and the wire format for service announcements
//! * [transport] - pooled async sockets: TCP accept/receive/send machinery for servers, the
//!   single-socket client counterpart, and UDP broadcast for service announcement / discovery
//! * [service] - peer lifecycle tracking (connecting / connected / missing / disconnected with
//!   reappearance), per-kind message dispatch with optional filtering and synthetic latency,
//!   ping/pong round-trip estimation, and the service directory driving discovery and
//!   reconnection
//!
//! A process constructs one [service::config::NetConfig] at startup and passes it by `Arc` to everything
//! that needs it; there is no ambient global state.

pub mod messaging;
pub mod transport;
pub mod service;
pub mod util;


#[cfg(test)]
mod test {
    use tracing::Level;

    #[ctor::ctor]
    fn init_test_logging() {
        tracing_subscriber::fmt()
            .with_max_level(Level::TRACE)
            .try_init()
            .ok();
    }
}
