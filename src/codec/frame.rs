//! Decoded MAVLink frame

use std::io::{self, Cursor};

use bytes::Bytes;
use mavlink::common::{MavMessage, HEARTBEAT_DATA};
use mavlink::{MavHeader, MavlinkVersion, Message};

use super::message::MSG_ID_HEARTBEAT;

/// Largest frame on the wire (v2, signed, full payload)
pub const MAX_FRAME_LEN: usize = 280;

/// A single MAVLink message with the header it travelled under
#[derive(Debug, Clone)]
pub struct Frame {
    /// Protocol version the frame was (or will be) framed with
    pub version: MavlinkVersion,
    /// Sender ids and sequence number
    pub header: MavHeader,
    /// Parsed message
    pub message: MavMessage,
}

impl Frame {
    /// Frame a message as MAVLink 2
    pub fn v2(header: MavHeader, message: MavMessage) -> Self {
        Self {
            version: MavlinkVersion::V2,
            header,
            message,
        }
    }

    /// Frame a message as MAVLink 1
    pub fn v1(header: MavHeader, message: MavMessage) -> Self {
        Self {
            version: MavlinkVersion::V1,
            header,
            message,
        }
    }

    pub fn msg_id(&self) -> u32 {
        self.message.message_id()
    }

    pub fn system_id(&self) -> u8 {
        self.header.system_id
    }

    pub fn component_id(&self) -> u8 {
        self.header.component_id
    }

    pub fn sequence(&self) -> u8 {
        self.header.sequence
    }

    /// Whether this is the protocol's liveness message
    pub fn is_heartbeat(&self) -> bool {
        self.msg_id() == MSG_ID_HEARTBEAT
    }

    /// Heartbeat payload, if this is a heartbeat
    pub fn heartbeat(&self) -> Option<&HEARTBEAT_DATA> {
        match &self.message {
            MavMessage::HEARTBEAT(data) => Some(data),
            _ => None,
        }
    }
}

/// Pack a frame for the wire
///
/// Output frames are never signed.
pub fn encode(frame: &Frame) -> io::Result<Bytes> {
    let mut buf = Cursor::new(Vec::with_capacity(MAX_FRAME_LEN));
    let written = match frame.version {
        MavlinkVersion::V1 => mavlink::write_v1_msg(&mut buf, frame.header, &frame.message),
        MavlinkVersion::V2 => mavlink::write_v2_msg(&mut buf, frame.header, &frame.message),
    };
    written.map_err(|e| io::Error::other(format!("{e:?}")))?;
    Ok(Bytes::from(buf.into_inner()))
}
