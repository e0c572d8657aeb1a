//! Channel pool and fan-out
//!
//! Every link owns one channel out of a fixed pool. Outgoing frames reach a
//! link only through its channel's byte queue.
//!
//! # Architecture
//!
//! ```text
//!        Publisher::send() / ChannelPool::publish()
//!                         │
//!         ┌───────────────┼───────────────┐
//!         ▼               ▼               ▼
//!   [ch 0 active]   [ch 1 inactive]  [ch 2 active]
//!    ByteQueue        (skipped)        ByteQueue
//!         │                               │
//!         ▼                               ▼
//!   Connection::drain()             Connection::drain()
//!         │                               │
//!         └──► TCP socket                 └──► serial port
//! ```
//!
//! Picking a free channel uses one pool-wide lock; occupancy, queue and
//! active flag use a lock per channel. No code path holds both.

pub mod fanout;
pub mod pool;
pub mod queue;

pub use fanout::Publisher;
pub use pool::{ChannelClaim, ChannelPool, ChannelStats, DEFAULT_CHANNELS};
pub use queue::{ByteQueue, DEFAULT_QUEUE_CAPACITY};
