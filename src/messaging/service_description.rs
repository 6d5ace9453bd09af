use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;

use anyhow::anyhow;
use bytes::{Buf, BufMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use uuid::Uuid;

use crate::util::buf_ext::{BufExt, BufMutExt};

/// The logical channels a process can provide or consume. One service carries one kind of data.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ServiceKind {
    AppState = 1,
    Audio = 2,
    BodyTracking = 3,
    PointCloud = 4,
}

/// Identity and dialing information for one announced service, as embedded in UDP announcement
///  envelopes.
///
/// Identity is the `service_id` alone: a service that reappears under a different address after
///  a reconnect is still the same service, so equality and hashing deliberately ignore every
///  other field.
#[derive(Clone)]
pub struct ServiceDescription {
    pub service_id: Uuid,
    pub session_id: Uuid,
    pub kind: ServiceKind,
    pub host_name: String,
    pub address: SocketAddr,
    pub payload: String,
    pub room_id: String,
}

impl PartialEq for ServiceDescription {
    fn eq(&self, other: &Self) -> bool {
        self.service_id == other.service_id
    }
}
impl Eq for ServiceDescription {}
impl Hash for ServiceDescription {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.service_id.hash(state);
    }
}

impl Debug for ServiceDescription {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ServiceDescription{{{:?} {} at {} (room {:?})}}", self.kind, self.service_id, self.address, self.room_id)
    }
}

impl ServiceDescription {
    pub fn new(kind: ServiceKind, host_name: impl Into<String>, address: SocketAddr, room_id: impl Into<String>) -> ServiceDescription {
        ServiceDescription {
            service_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            kind,
            host_name: host_name.into(),
            address,
            payload: String::new(),
            room_id: room_id.into(),
        }
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_slice(self.service_id.as_bytes());
        buf.put_slice(self.session_id.as_bytes());
        buf.put_u8(self.kind.into());
        buf.put_string(&self.host_name);
        buf.put_string(&self.address.to_string());
        buf.put_string(&self.payload);
        buf.put_string(&self.room_id);
    }

    pub fn try_read(buf: &mut impl Buf) -> anyhow::Result<ServiceDescription> {
        let service_id = Self::try_read_uuid(buf)?;
        let session_id = Self::try_read_uuid(buf)?;

        let kind_byte = buf.try_get_u8()?;
        let kind = ServiceKind::try_from_primitive(kind_byte)
            .map_err(|_| anyhow!("unknown service kind {}", kind_byte))?;

        let host_name = buf.try_get_string()?;
        let address = buf.try_get_string()?.parse::<SocketAddr>()?;
        let payload = buf.try_get_string()?;
        let room_id = buf.try_get_string()?;

        Ok(ServiceDescription {
            service_id,
            session_id,
            kind,
            host_name,
            address,
            payload,
            room_id,
        })
    }

    fn try_read_uuid(buf: &mut impl Buf) -> anyhow::Result<Uuid> {
        let raw = buf.try_get_u128_le()?;
        Ok(Uuid::from_u128_le(raw))
    }
}
