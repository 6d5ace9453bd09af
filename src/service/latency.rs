use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::time::Instant;
use tracing::warn;

use crate::util::buf_ext::BufExt;

/// Monotonic per-process clock for envelope timestamps: microseconds since a reference instant
///  taken at creation. Peers have unrelated references; the offset between two processes is what
///  [LatencyEstimator] estimates.
pub struct WireClock {
    reference: Instant,
}

impl WireClock {
    pub fn new() -> WireClock {
        WireClock {
            reference: Instant::now(),
        }
    }

    pub fn now_micros(&self) -> u64 {
        Instant::now().duration_since(self.reference).as_micros() as u64
    }
}

impl Default for WireClock {
    fn default() -> Self {
        WireClock::new()
    }
}


/// Payload of a pong: the echoed origin send time plus the responder's own receive and send
///  times, so the estimator can subtract the responder's turnaround from the round trip.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PongData {
    pub origin_send_micros: u64,
    pub peer_recv_micros: u64,
    pub peer_send_micros: u64,
}

impl PongData {
    pub fn ser_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(3 * size_of::<u64>());
        buf.put_u64_le(self.origin_send_micros);
        buf.put_u64_le(self.peer_recv_micros);
        buf.put_u64_le(self.peer_send_micros);
        buf.freeze()
    }

    pub fn try_read(mut payload: &[u8]) -> anyhow::Result<PongData> {
        Ok(PongData {
            origin_send_micros: payload.try_get_u64_le()?,
            peer_recv_micros: payload.try_get_u64_le()?,
            peer_send_micros: payload.try_get_u64_le()?,
        })
    }
}

pub fn ping_payload(now_micros: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(size_of::<u64>());
    buf.put_u64_le(now_micros);
    buf.freeze()
}

pub fn try_read_ping(mut payload: &[u8]) -> anyhow::Result<u64> {
    payload.try_get_u64_le()
}


/// Continuously overwritten latency / clock-offset estimate for one peer. Every pong replaces
///  the previous values outright - no smoothing or averaging across pings.
#[derive(Debug, Default)]
pub struct LatencyEstimator {
    latency: Option<Duration>,
    clock_offset_micros: i64,
}

impl LatencyEstimator {
    pub fn on_pong(&mut self, pong: &PongData, now_micros: u64) {
        let turnaround = pong.peer_send_micros.saturating_sub(pong.peer_recv_micros);
        let rtt = match now_micros.checked_sub(pong.origin_send_micros) {
            Some(rtt) => rtt,
            None => {
                warn!("pong claims to originate in the future - ignoring");
                return;
            }
        };
        let one_way = rtt.saturating_sub(turnaround) / 2;

        self.latency = Some(Duration::from_micros(one_way));
        self.clock_offset_micros = pong.peer_recv_micros as i64 - (pong.origin_send_micros + one_way) as i64;
    }

    /// Half the most recent round trip, net of the peer's turnaround time.
    pub fn latency(&self) -> Option<Duration> {
        self.latency
    }

    /// Estimated difference between the peer's wire clock and ours, in microseconds.
    pub fn clock_offset_micros(&self) -> i64 {
        self.clock_offset_micros
    }
}
