//! Link lifecycle
//!
//! One link per physical connection. The link holds a channel from the pool
//! for as long as it runs, writes whatever fan-out puts in that channel and
//! feeds inbound bytes to the decoder.
//!
//! Liveness is driven by heartbeats. The [`ActiveLinkCounter`] tracks how
//! many links are past their first heartbeat and not yet timed out; the
//! failsafe reads it.

pub mod config;
pub mod connection;
pub mod counter;
pub mod handler;
pub mod liveness;
pub mod spawner;

pub use config::{LinkConfig, LinkPolicy};
pub use connection::{Connection, LinkExit, LinkState};
pub use counter::ActiveLinkCounter;
pub use handler::{LinkContext, LinkHandler, NullHandler};
pub use liveness::{Liveness, LivenessTracker, DEFAULT_HEARTBEAT_TIMEOUT};
pub use spawner::LinkSpawner;
