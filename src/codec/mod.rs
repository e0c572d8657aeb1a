//! MAVLink framing
//!
//! Wire parsing and packing come from the `mavlink` crate (`common`
//! dialect). This module only adds what a byte-polling link needs on top:
//! a per-link decoder fed one byte at a time, and builders for the few
//! messages the hub emits itself. Message semantics belong to the
//! [`LinkHandler`](crate::link::LinkHandler).

pub mod decoder;
pub mod frame;
pub mod message;

pub use decoder::{DecoderStats, MavlinkDecoder};
pub use frame::{encode, Frame};
pub use mavlink::common::{MavMessage, MavSeverity, HEARTBEAT_DATA, STATUSTEXT_DATA};
pub use mavlink::{MavHeader, MavlinkVersion};
