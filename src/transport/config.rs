//! Transport adapter configuration

use std::net::SocketAddr;
use std::path::PathBuf;

use super::serial::DEFAULT_BAUD;

/// TCP listener options
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Address to listen on
    pub bind_addr: SocketAddr,

    /// Enable TCP_NODELAY on accepted sockets
    pub nodelay: bool,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 1128)),
            nodelay: true,
        }
    }
}

impl TcpConfig {
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set TCP_NODELAY
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

/// UDP socket options
#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// Local address
    pub bind_addr: SocketAddr,

    /// Ground station address used until a datagram arrives
    pub peer_addr: SocketAddr,

    /// Reply to whoever sent the last datagram
    pub follow_sender: bool,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 14551)),
            peer_addr: SocketAddr::from(([192, 168, 0, 10], 14550)),
            follow_sender: true,
        }
    }
}

impl UdpConfig {
    /// Set the local address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the initial peer
    pub fn peer(mut self, addr: SocketAddr) -> Self {
        self.peer_addr = addr;
        self
    }

    /// Always send to the configured peer
    pub fn fixed_peer(mut self) -> Self {
        self.follow_sender = false;
        self
    }
}

/// Serial port options (8N1, raw mode)
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Device path
    pub device: PathBuf,

    /// Line speed in baud
    pub baud: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/ttyS0"),
            baud: DEFAULT_BAUD,
        }
    }
}

impl SerialConfig {
    pub fn with_device(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }

    /// Set the baud rate
    pub fn baud(mut self, baud: u32) -> Self {
        self.baud = baud;
        self
    }
}
