//! Byte endpoints a link runs over
//!
//! Adapters open a socket or device, wrap it in an [`Endpoint`] and hand it
//! to a link together with a freshly occupied channel. The link never knows
//! which transport it is driving beyond the [`TransportKind`] tag it logs.
//!
//! Reads and writes never wait, so the poll loop keeps its liveness
//! bookkeeping going on a silent endpoint and on one that stopped reading.

use std::io;

pub mod config;
pub mod memory;
pub mod serial;
pub mod tcp;
pub mod udp;

pub use config::{SerialConfig, TcpConfig, UdpConfig};
pub use memory::{memory_pair, MemoryEndpoint, MemoryPeer};
pub use serial::SerialEndpoint;
pub use tcp::{TcpEndpoint, TcpHandle, TcpServer};
pub use udp::UdpEndpoint;

/// Transport a link runs over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Tcp,
    Udp,
    Serial,
    Memory,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransportKind::Tcp => "tcp",
            TransportKind::Udp => "udp",
            TransportKind::Serial => "serial",
            TransportKind::Memory => "memory",
        };
        f.write_str(name)
    }
}

/// Duplex byte endpoint owned by exactly one link
pub trait Endpoint: Send + 'static {
    /// Transport tag for logs and hooks
    fn kind(&self) -> TransportKind;

    /// Read whatever is available without waiting
    ///
    /// `Ok(0)` means nothing arrived this tick. A peer that closed the
    /// stream reports [`io::ErrorKind::UnexpectedEof`].
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write as much of `data` as fits without waiting
    ///
    /// `Ok(0)` means the endpoint cannot take anything this tick.
    fn try_write(&mut self, data: &[u8]) -> io::Result<usize>;
}

/// True for read errors that mean the peer is gone for good
pub fn is_closed(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
    )
}
