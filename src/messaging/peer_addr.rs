use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::net::{SocketAddr, SocketAddrV4, SocketAddrV6};

use anyhow::anyhow;
use bytes::{Buf, BufMut};

/// A remote peer's identity: its network endpoint plus a client-assigned logical id.
///
/// The logical id is distinct from the transport-level socket on purpose: a peer that drops its
///  TCP connection and dials in again (possibly from a different ephemeral port) keeps its id,
///  so lifecycle tracking survives reconnects.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub struct PeerAddr {
    pub unique: u32,
    pub socket_addr: SocketAddr,
}
impl Hash for PeerAddr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.unique.hash(state);
        match self.socket_addr {
            SocketAddr::V4(s) => s.ip().to_bits().hash(state),
            SocketAddr::V6(s) => s.ip().to_bits().hash(state),
        };
        self.socket_addr.port().hash(state);
    }
}

impl Debug for PeerAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}@{}]", self.socket_addr, self.unique)
    }
}

impl PeerAddr {
    pub fn new(unique: u32, socket_addr: SocketAddr) -> PeerAddr {
        PeerAddr {
            unique,
            socket_addr,
        }
    }

    #[cfg(test)]
    pub fn localhost(unique: u32) -> PeerAddr {
        let addr: SocketAddr = std::str::FromStr::from_str("127.0.0.1:16385").unwrap();

        PeerAddr {
            unique,
            socket_addr: addr,
        }
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.unique);
        match &self.socket_addr {
            SocketAddr::V4(data) => {
                buf.put_u8(4);
                buf.put_u32_le(data.ip().to_bits());
                buf.put_u16_le(data.port());
            }
            SocketAddr::V6(data) => {
                buf.put_u8(6);
                buf.put_u128_le(data.ip().to_bits());
                buf.put_u16_le(data.port());
            }
        }
    }

    pub fn try_deser(buf: &mut impl Buf) -> anyhow::Result<PeerAddr> {
        let unique = buf.try_get_u32_le()?;

        let addr = match buf.try_get_u8()? {
            4 => {
                let ip = buf.try_get_u32_le()?;
                let port = buf.try_get_u16_le()?;
                SocketAddr::V4(SocketAddrV4::new(ip.into(), port))
            }
            6 => {
                let ip = buf.try_get_u128_le()?;
                let port = buf.try_get_u16_le()?;
                SocketAddr::V6(SocketAddrV6::new(ip.into(), port, 0, 0))
            }
            n => {
                return Err(anyhow!("invalid socket address discriminator: {}", n));
            }
        };
        Ok(PeerAddr {
            unique,
            socket_addr: addr,
        })
    }
}
