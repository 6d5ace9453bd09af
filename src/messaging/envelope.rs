use std::fmt::{Debug, Formatter};

use anyhow::anyhow;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// The closed set of message kinds that can travel inside an envelope. The discriminant is the
///  single kind byte on the wire.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MessageKind {
    ServiceAnnouncement = 1,
    ConnectToServer = 2,
    DisconnectFromServer = 3,
    Ping = 4,
    Pong = 5,
    StateUpdate = 6,
    BodyFrame = 7,
    PointCloud = 8,
    RoomUpdate = 9,
    UserUpdate = 10,
    AudioFrame = 11,
}

/// One framed protocol message: a fixed 13-byte header followed by an opaque payload.
///
/// Canonical header layout, all integers little-endian:
/// ```ascii
/// 0: payload length (u32) - payload bytes only, excluding this header
/// 4: kind (u8)
/// 5: timestamp (u64) - sender-side monotonic clock in microseconds at creation
/// ```
#[derive(Clone, Eq, PartialEq)]
pub struct Envelope {
    pub kind: MessageKind,
    pub timestamp_micros: u64,
    pub payload: Bytes,
}

impl Debug for Envelope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Envelope{{{:?}@{}, {} bytes}}", self.kind, self.timestamp_micros, self.payload.len())
    }
}

impl Envelope {
    pub const HEADER_SIZE: usize = size_of::<u32>() + size_of::<u8>() + size_of::<u64>();

    pub fn new(kind: MessageKind, timestamp_micros: u64, payload: Bytes) -> Envelope {
        Envelope {
            kind,
            timestamp_micros,
            payload,
        }
    }

    pub fn serialized_len(&self) -> usize {
        Self::HEADER_SIZE + self.payload.len()
    }

    /// Writes header and payload into `buf`, reserving the full frame size up front so the frame
    ///  ends up in one contiguous allocation.
    pub fn ser(&self, buf: &mut BytesMut) {
        buf.reserve(self.serialized_len());
        buf.put_u32_le(self.payload.len() as u32);
        buf.put_u8(self.kind.into());
        buf.put_u64_le(self.timestamp_micros);
        buf.put_slice(&self.payload);
    }

    /// Convenience for callers that want the frame as a single finished buffer.
    pub fn to_frame(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.serialized_len());
        self.ser(&mut buf);
        buf.freeze()
    }

    /// The inverse of [Envelope::ser], for places where a complete frame is already isolated -
    ///  UDP datagrams arrive whole, so the stream reassembler is bypassed there. TCP byte streams
    ///  must go through [crate::messaging::frame_reader::FrameReader] instead.
    pub fn try_read(buf: &mut impl Buf) -> anyhow::Result<Envelope> {
        let payload_len = buf.try_get_u32_le()? as usize;
        let kind_byte = buf.try_get_u8()?;
        let kind = MessageKind::try_from_primitive(kind_byte)
            .map_err(|_| anyhow!("unknown message kind {}", kind_byte))?;
        let timestamp_micros = buf.try_get_u64_le()?;

        if buf.remaining() < payload_len {
            return Err(anyhow!("frame truncated: declared {} payload bytes, {} available", payload_len, buf.remaining()));
        }
        let payload = buf.copy_to_bytes(payload_len);

        Ok(Envelope {
            kind,
            timestamp_micros,
            payload,
        })
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::announcement(MessageKind::ServiceAnnouncement)]
    #[case::connect(MessageKind::ConnectToServer)]
    #[case::disconnect(MessageKind::DisconnectFromServer)]
    #[case::ping(MessageKind::Ping)]
    #[case::pong(MessageKind::Pong)]
    #[case::state(MessageKind::StateUpdate)]
    #[case::body(MessageKind::BodyFrame)]
    #[case::point_cloud(MessageKind::PointCloud)]
    #[case::room(MessageKind::RoomUpdate)]
    #[case::user(MessageKind::UserUpdate)]
    #[case::audio(MessageKind::AudioFrame)]
    fn test_round_trip_all_kinds(#[case] kind: MessageKind) {
        let original = Envelope::new(kind, 0x1122334455667788, Bytes::from_static(b"payload bytes"));

        let mut buf = BytesMut::new();
        original.ser(&mut buf);
        assert_eq!(buf.len(), original.serialized_len());

        let mut read: &[u8] = &buf;
        let actual = Envelope::try_read(&mut read).unwrap();
        assert!(read.is_empty());
        assert_eq!(actual, original);
    }

    #[rstest]
    fn test_header_layout() {
        let envelope = Envelope::new(MessageKind::Ping, 2, Bytes::from_static(b"abc"));
        let frame = envelope.to_frame();

        assert_eq!(&frame[..], b"\x03\0\0\0\x04\x02\0\0\0\0\0\0\0abc");
        assert_eq!(frame.len(), Envelope::HEADER_SIZE + 3);
    }

    #[rstest]
    fn test_empty_payload() {
        let envelope = Envelope::new(MessageKind::StateUpdate, 7, Bytes::new());
        let frame = envelope.to_frame();
        assert_eq!(frame.len(), Envelope::HEADER_SIZE);

        let mut read: &[u8] = &frame;
        assert_eq!(Envelope::try_read(&mut read).unwrap(), envelope);
    }

    #[rstest]
    fn test_remainder_left_in_buffer() {
        let mut buf = BytesMut::new();
        Envelope::new(MessageKind::RoomUpdate, 1, Bytes::from_static(b"xy")).ser(&mut buf);
        buf.extend_from_slice(b"trailing");

        let mut read: &[u8] = &buf;
        Envelope::try_read(&mut read).unwrap();
        assert_eq!(read, b"trailing");
    }

    #[rstest]
    #[case::truncated_header(b"\x03\0\0\0\x04\x02\0\0\0".as_slice())]
    #[case::truncated_payload(b"\x05\0\0\0\x04\x02\0\0\0\0\0\0\0ab".as_slice())]
    #[case::unknown_kind(b"\x00\0\0\0\xfe\x02\0\0\0\0\0\0\0".as_slice())]
    fn test_invalid_input(#[case] mut buf: &[u8]) {
        assert!(Envelope::try_read(&mut buf).is_err());
    }
}
