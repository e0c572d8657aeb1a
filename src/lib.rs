//! MAVLink ground-link hub
//!
//! Multiplexes any number of ground-station links (TCP clients, a UDP
//! socket, a serial radio) onto a fixed pool of channels, fans outbound
//! frames out to every live link and tracks link liveness through
//! heartbeats.
//!
//! # Example
//!
//! ```no_run
//! use mavlink_hub::{HubConfig, MavlinkHub, NullHandler};
//!
//! #[tokio::main]
//! async fn main() -> mavlink_hub::Result<()> {
//!     let hub = MavlinkHub::new(HubConfig::default(), NullHandler)?;
//!     let publisher = hub.publisher();
//!     publisher.send_status_text(mavlink_hub::MavSeverity::MAV_SEVERITY_INFO, "hub online");
//!
//!     hub.run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```

pub mod channel;
pub mod codec;
pub mod error;
pub mod failsafe;
pub mod hub;
pub mod link;
pub mod scheduler;
pub mod stats;
pub mod stream;
pub mod transport;

pub use channel::{ByteQueue, ChannelClaim, ChannelPool, Publisher};
pub use codec::{encode, Frame, MavMessage, MavSeverity, MavlinkDecoder, HEARTBEAT_DATA};
pub use error::{DispatchError, Error, Result};
pub use failsafe::{FailsafeAction, LinkFailsafe};
pub use hub::{HubConfig, MavlinkHub};
pub use link::{
    ActiveLinkCounter, LinkConfig, LinkContext, LinkExit, LinkHandler, LinkPolicy, LinkState, NullHandler,
};
pub use scheduler::{NoPriority, PriorityHint, RealtimePriority};
pub use stream::{TelemetryConfig, TelemetryStream};
pub use transport::{Endpoint, SerialConfig, TcpConfig, TransportKind, UdpConfig};

pub use mavlink;
