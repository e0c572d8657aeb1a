//! UDP socket
//!
//! One persistent link per socket. Outbound datagrams go to the configured
//! ground station until something else talks to us; with `follow_sender`
//! the link then replies to whoever sent the last datagram.

use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

use super::config::UdpConfig;
use super::{Endpoint, TransportKind};
use crate::error::Result;

/// Bound UDP socket with a current peer
#[derive(Debug)]
pub struct UdpEndpoint {
    socket: UdpSocket,
    peer: SocketAddr,
    follow_sender: bool,
}

impl UdpEndpoint {
    /// Bind according to `config`
    pub async fn bind(config: &UdpConfig) -> Result<Self> {
        let socket = UdpSocket::bind(config.bind_addr).await?;
        tracing::info!(
            addr = %socket.local_addr()?,
            peer = %config.peer_addr,
            "UDP socket bound"
        );
        Ok(Self::from_socket(socket, config))
    }

    pub fn from_socket(socket: UdpSocket, config: &UdpConfig) -> Self {
        Self {
            socket,
            peer: config.peer_addr,
            follow_sender: config.follow_sender,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Where outbound datagrams currently go
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl Endpoint for UdpEndpoint {
    fn kind(&self) -> TransportKind {
        TransportKind::Udp
    }

    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.socket.try_recv_from(buf) {
            Ok((n, from)) => {
                if self.follow_sender && from != self.peer {
                    tracing::info!(old = %self.peer, new = %from, "UDP peer changed");
                    self.peer = from;
                }
                Ok(n)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn try_write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self.socket.try_send_to(data, self.peer) {
            Ok(sent) if sent < data.len() => {
                Err(io::Error::new(io::ErrorKind::WriteZero, "datagram truncated"))
            }
            Ok(sent) => Ok(sent),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }
}
