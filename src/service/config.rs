use std::net::SocketAddr;
use std::time::Duration;

/// All tuning knobs for transport and service behavior in one place.
///
/// One instance is constructed at process start and passed by `Arc` to every component that
///  needs it - the explicit replacement for the original system's ambient service locator.
#[derive(Debug)]
pub struct NetConfig {
    /// UDP port that service announcements are broadcast to and discovered on
    pub announce_port: u16,
    /// broadcast destination for announcements
    pub announce_target: SocketAddr,
    pub announce_interval: Duration,

    pub heartbeat_interval: Duration,
    /// how often connected peers are checked against `peer_timeout`
    pub sweep_interval: Duration,
    /// a connected peer that has not been heard from for this long goes missing
    pub peer_timeout: Duration,
    pub connect_timeout: Duration,
    /// how often the directory retries requested services that lost their connection
    pub reconnect_interval: Duration,

    /// payload lengths above this are treated as stream desynchronization (logged)
    pub max_frame_size: usize,
    pub receive_buffer_size: usize,
    pub buffer_pool_size: usize,
    /// per-connection outbound queue length; a peer whose queue overflows is not draining and
    ///  gets dropped
    pub send_queue_capacity: usize,
    pub event_queue_capacity: usize,

    /// minimum artificial one-way latency that handler dispatch is delayed to
    pub requested_latency: Duration,
}

impl NetConfig {
    pub fn new() -> NetConfig {
        NetConfig {
            announce_port: 17788,
            announce_target: "255.255.255.255:17788".parse().expect("valid broadcast address"),
            announce_interval: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(2),
            peer_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            reconnect_interval: Duration::from_secs(3),
            max_frame_size: 256 * 1024,
            receive_buffer_size: 64 * 1024,
            buffer_pool_size: 32,
            send_queue_capacity: 256,
            event_queue_capacity: 1024,
            requested_latency: Duration::ZERO,
        }
    }
}

impl Default for NetConfig {
    fn default() -> Self {
        NetConfig::new()
    }
}
