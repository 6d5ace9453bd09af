use bytes::{BufMut, BytesMut};
use tracing::warn;

use crate::messaging::envelope::{Envelope, MessageKind};

/// Incremental per-peer reassembly of envelopes from a TCP byte stream.
///
/// The reader carries partial-header / partial-body state across calls, so it makes no
///  assumption about how socket reads align with frame boundaries: a single delivery may be as
///  small as one byte or may complete several envelopes at once.
///
/// There is no error state. A corrupt length field makes the reader wait for body bytes that
///  never complete - that connection stalls until the liveness sweep gives up on the peer. A
///  declared length above `max_frame_size` is logged once so the stall is at least observable.
pub struct FrameReader {
    max_frame_size: usize,
    phase: Phase,
    oversize_warned: bool,
}

enum Phase {
    Header {
        scratch: [u8; Envelope::HEADER_SIZE],
        filled: usize,
    },
    Body {
        kind_byte: u8,
        timestamp_micros: u64,
        target: usize,
        buf: BytesMut,
    },
}

impl FrameReader {
    pub fn new(max_frame_size: usize) -> FrameReader {
        FrameReader {
            max_frame_size,
            phase: Phase::Header {
                scratch: [0; Envelope::HEADER_SIZE],
                filled: 0,
            },
            oversize_warned: false,
        }
    }

    /// Consumes the complete delivery, appending every envelope it completes to `out`.
    pub fn feed(&mut self, mut chunk: &[u8], out: &mut Vec<Envelope>) {
        while !chunk.is_empty() {
            match &mut self.phase {
                Phase::Header { scratch, filled } => {
                    let take = (Envelope::HEADER_SIZE - *filled).min(chunk.len());
                    scratch[*filled..*filled + take].copy_from_slice(&chunk[..take]);
                    *filled += take;
                    chunk = &chunk[take..];

                    if *filled == Envelope::HEADER_SIZE {
                        let target = u32::from_le_bytes(scratch[0..4].try_into().expect("header scratch is fixed size")) as usize;
                        let kind_byte = scratch[4];
                        let timestamp_micros = u64::from_le_bytes(scratch[5..13].try_into().expect("header scratch is fixed size"));

                        if target > self.max_frame_size && !self.oversize_warned {
                            warn!("declared payload length {} exceeds max frame size {} - stream is likely desynchronized", target, self.max_frame_size);
                            self.oversize_warned = true;
                        }

                        if target == 0 {
                            // nothing left to wait for, emit right away
                            Self::emit(kind_byte, timestamp_micros, BytesMut::new(), out);
                            self.phase = Phase::Header {
                                scratch: [0; Envelope::HEADER_SIZE],
                                filled: 0,
                            };
                        }
                        else {
                            self.phase = Phase::Body {
                                kind_byte,
                                timestamp_micros,
                                target,
                                buf: BytesMut::with_capacity(target.min(self.max_frame_size)),
                            };
                        }
                    }
                }
                Phase::Body { kind_byte, timestamp_micros, target, buf } => {
                    let take = (*target - buf.len()).min(chunk.len());
                    buf.put_slice(&chunk[..take]);
                    chunk = &chunk[take..];

                    if buf.len() == *target {
                        Self::emit(*kind_byte, *timestamp_micros, buf.split(), out);
                        self.phase = Phase::Header {
                            scratch: [0; Envelope::HEADER_SIZE],
                            filled: 0,
                        };
                    }
                }
            }
        }
    }

    fn emit(kind_byte: u8, timestamp_micros: u64, buf: BytesMut, out: &mut Vec<Envelope>) {
        match MessageKind::try_from(kind_byte) {
            Ok(kind) => {
                out.push(Envelope::new(kind, timestamp_micros, buf.freeze()));
            }
            Err(_) => {
                warn!("skipping complete frame with unknown message kind {}", kind_byte);
            }
        }
    }

    /// True iff no partial frame is buffered, i.e. the stream is at a frame boundary.
    pub fn is_at_frame_boundary(&self) -> bool {
        matches!(self.phase, Phase::Header { filled: 0, .. })
    }
}

#[cfg(test)]
mod test {
    use bytes::Bytes;
    use rstest::rstest;

    use super::*;

    fn sample_envelopes() -> Vec<Envelope> {
        vec![
            Envelope::new(MessageKind::StateUpdate, 11, Bytes::from(vec![1u8; 170])),
            Envelope::new(MessageKind::BodyFrame, 22, Bytes::new()),
            Envelope::new(MessageKind::PointCloud, 33, Bytes::from(vec![7u8; 291])),
        ]
    }

    fn packed(envelopes: &[Envelope]) -> BytesMut {
        let mut buf = BytesMut::new();
        for e in envelopes {
            e.ser(&mut buf);
        }
        buf
    }

    #[rstest]
    #[case::single_bytes(1)]
    #[case::prime_chunks(7)]
    #[case::uneven(13)]
    #[case::large(4096)]
    fn test_chunked_delivery(#[case] chunk_size: usize) {
        let envelopes = sample_envelopes();
        let buf = packed(&envelopes);

        let mut reader = FrameReader::new(1024);
        let mut out = Vec::new();
        for chunk in buf.chunks(chunk_size) {
            reader.feed(chunk, &mut out);
        }

        assert_eq!(out, envelopes);
        assert!(reader.is_at_frame_boundary());
    }

    /// every chunk size must reproduce the original sequence exactly
    #[rstest]
    fn test_all_chunkings() {
        let envelopes = sample_envelopes();
        let buf = packed(&envelopes);

        for chunk_size in 1..=buf.len() {
            let mut reader = FrameReader::new(1024);
            let mut out = Vec::new();
            for chunk in buf.chunks(chunk_size) {
                reader.feed(chunk, &mut out);
            }
            assert_eq!(out, envelopes, "chunk size {}", chunk_size);
        }
    }

    #[rstest]
    fn test_single_delivery_completes_all() {
        let envelopes = sample_envelopes();
        let buf = packed(&envelopes);

        let mut reader = FrameReader::new(1024);
        let mut out = Vec::new();
        reader.feed(&buf, &mut out);

        assert_eq!(out, envelopes);
    }

    #[rstest]
    fn test_trailing_empty_frame_emitted_in_same_delivery() {
        let envelope = Envelope::new(MessageKind::Ping, 99, Bytes::new());
        let buf = packed(&[envelope.clone()]);

        let mut reader = FrameReader::new(1024);
        let mut out = Vec::new();
        reader.feed(&buf, &mut out);

        assert_eq!(out, vec![envelope]);
        assert!(reader.is_at_frame_boundary());
    }

    #[rstest]
    fn test_partial_header_emits_nothing() {
        let buf = packed(&sample_envelopes());

        let mut reader = FrameReader::new(1024);
        let mut out = Vec::new();
        reader.feed(&buf[..5], &mut out);

        assert!(out.is_empty());
        assert!(!reader.is_at_frame_boundary());
    }

    #[rstest]
    fn test_unknown_kind_drops_one_frame_and_stays_in_sync() {
        let good = Envelope::new(MessageKind::RoomUpdate, 5, Bytes::from_static(b"after"));

        let mut buf = BytesMut::new();
        // well-formed frame with a kind byte outside the closed enum
        buf.extend_from_slice(b"\x02\0\0\0\xff\0\0\0\0\0\0\0\0ab");
        good.ser(&mut buf);

        let mut reader = FrameReader::new(1024);
        let mut out = Vec::new();
        for chunk in buf.chunks(3) {
            reader.feed(chunk, &mut out);
        }

        assert_eq!(out, vec![good]);
    }

    #[rstest]
    fn test_oversize_length_stalls_without_emitting() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"\xff\xff\xff\xff\x06\0\0\0\0\0\0\0\0");
        buf.extend_from_slice(&[0u8; 256]);

        let mut reader = FrameReader::new(1024);
        let mut out = Vec::new();
        reader.feed(&buf, &mut out);

        assert!(out.is_empty());
        assert!(!reader.is_at_frame_boundary());
    }
}
