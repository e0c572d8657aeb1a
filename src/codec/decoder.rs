//! Byte-at-a-time MAVLink decoder
//!
//! The decoder is stateful and belongs to exactly one link. It only finds
//! frame boundaries: it hunts for a start marker, reads the length from the
//! header and collects the rest of the frame. Each complete frame is handed
//! to the `mavlink` crate, which checks the checksum and parses the message.
//! Frames it rejects (bad checksum, message outside the dialect) are counted
//! and dropped.

use std::io::Cursor;

use mavlink::common::MavMessage;
use mavlink::peek_reader::PeekReader;
use mavlink::{MavlinkVersion, MAV_STX, MAV_STX_V2};

use super::frame::{Frame, MAX_FRAME_LEN};

const HEADER_LEN_V1: usize = 6;
const HEADER_LEN_V2: usize = 10;
const CHECKSUM_LEN: usize = 2;
const SIGNATURE_LEN: usize = 13;
const IFLAG_SIGNED: u8 = 0x01;

/// Decoder counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Frames returned to the caller
    pub frames: u64,
    /// Complete frames the parser rejected
    pub parse_errors: u64,
    /// Bytes skipped while looking for a start marker
    pub discarded_bytes: u64,
}

/// Per-link MAVLink decoder
#[derive(Debug)]
pub struct MavlinkDecoder {
    buf: Vec<u8>,
    stats: DecoderStats,
}

impl MavlinkDecoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(MAX_FRAME_LEN),
            stats: DecoderStats::default(),
        }
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Feed one byte, returning a frame when it completes one
    pub fn push_byte(&mut self, byte: u8) -> Option<Frame> {
        if self.buf.is_empty() && byte != MAV_STX && byte != MAV_STX_V2 {
            self.stats.discarded_bytes += 1;
            return None;
        }

        self.buf.push(byte);
        match self.frame_len() {
            Some(total) if self.buf.len() >= total => {
                let frame = self.parse();
                self.reset();
                frame
            }
            _ => None,
        }
    }

    /// Feed a slice, collecting every completed frame
    pub fn push_slice(&mut self, bytes: &[u8]) -> Vec<Frame> {
        bytes.iter().filter_map(|&b| self.push_byte(b)).collect()
    }

    fn version(&self) -> MavlinkVersion {
        if self.buf[0] == MAV_STX {
            MavlinkVersion::V1
        } else {
            MavlinkVersion::V2
        }
    }

    /// Full frame length, once enough of the header has arrived
    fn frame_len(&self) -> Option<usize> {
        let payload_len = *self.buf.get(1)? as usize;
        match self.version() {
            MavlinkVersion::V1 => Some(HEADER_LEN_V1 + payload_len + CHECKSUM_LEN),
            MavlinkVersion::V2 => {
                let incompat = *self.buf.get(2)?;
                let signature = if incompat & IFLAG_SIGNED != 0 { SIGNATURE_LEN } else { 0 };
                Some(HEADER_LEN_V2 + payload_len + CHECKSUM_LEN + signature)
            }
        }
    }

    fn parse(&mut self) -> Option<Frame> {
        let version = self.version();
        let mut reader = PeekReader::new(Cursor::new(&self.buf[..]));
        let parsed = match version {
            MavlinkVersion::V1 => mavlink::read_v1_msg::<MavMessage, _>(&mut reader),
            MavlinkVersion::V2 => mavlink::read_v2_msg::<MavMessage, _>(&mut reader),
        };

        match parsed {
            Ok((header, message)) => {
                self.stats.frames += 1;
                Some(Frame {
                    version,
                    header,
                    message,
                })
            }
            Err(e) => {
                self.stats.parse_errors += 1;
                tracing::trace!(error = ?e, len = self.buf.len(), "Dropping unparsable frame");
                None
            }
        }
    }
}

impl Default for MavlinkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;
    use crate::codec::message::autopilot_heartbeat;
    use crate::codec::testing::heartbeat_wire;
    use mavlink::MavHeader;

    #[test]
    fn test_decode_encoded_heartbeat() {
        let mut decoder = MavlinkDecoder::new();
        let frames = decoder.push_slice(&heartbeat_wire(7));

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].sequence(), 7);
        assert_eq!(frames[0].system_id(), 255);
        assert!(frames[0].is_heartbeat());
        assert_eq!(decoder.stats().frames, 1);
    }

    #[test]
    fn test_skips_garbage_between_frames() {
        let mut stream = vec![0x00, 0x11, 0x22];
        stream.extend_from_slice(&heartbeat_wire(1));
        stream.push(0x33);
        stream.extend_from_slice(&heartbeat_wire(2));

        let mut decoder = MavlinkDecoder::new();
        let seqs: Vec<u8> = decoder.push_slice(&stream).iter().map(|f| f.sequence()).collect();
        assert_eq!(seqs, vec![1, 2]);
        assert_eq!(decoder.stats().discarded_bytes, 4);
    }

    #[test]
    fn test_frame_split_across_reads() {
        let wire = heartbeat_wire(4);
        let (head, tail) = wire.split_at(5);

        let mut decoder = MavlinkDecoder::new();
        assert!(decoder.push_slice(head).is_empty());
        assert_eq!(decoder.push_slice(tail).len(), 1);
    }

    #[test]
    fn test_bad_checksum_dropped() {
        let mut wire = heartbeat_wire(1);
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;

        let mut decoder = MavlinkDecoder::new();
        assert!(decoder.push_slice(&wire).is_empty());
        assert_eq!(decoder.stats().parse_errors, 1);

        // Decoder recovers for the next good frame
        assert_eq!(decoder.push_slice(&heartbeat_wire(2)).len(), 1);
    }

    #[test]
    fn test_v1_frame() {
        let header = MavHeader {
            system_id: 1,
            component_id: 1,
            sequence: 9,
        };
        let wire = encode(&Frame::v1(header, MavMessage::HEARTBEAT(autopilot_heartbeat(0)))).unwrap();

        let mut decoder = MavlinkDecoder::new();
        let frame = decoder.push_slice(&wire).remove(0);
        assert_eq!(frame.version, MavlinkVersion::V1);
        assert_eq!(frame.sequence(), 9);
        assert!(frame.is_heartbeat());
    }

    #[test]
    fn test_unknown_message_dropped() {
        // id 0x01_23_45 is outside the dialect
        let wire = [MAV_STX_V2, 1, 0, 0, 0, 1, 1, 0x45, 0x23, 0x01, 0xAA, 0x00, 0x00];
        let mut decoder = MavlinkDecoder::new();
        assert!(decoder.push_slice(&wire).is_empty());
        assert_eq!(decoder.stats().parse_errors, 1);
    }
}
