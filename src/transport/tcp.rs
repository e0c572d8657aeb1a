//! TCP listener
//!
//! Every accepted client becomes its own link. Clients beyond the channel
//! pool are refused by closing the socket straight away.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use super::config::TcpConfig;
use super::{Endpoint, TransportKind};
use crate::error::Result;
use crate::link::{LinkHandler, LinkPolicy, LinkSpawner};

/// Accepted TCP client
#[derive(Debug)]
pub struct TcpEndpoint {
    stream: TcpStream,
    peer: SocketAddr,
    _client: Option<ClientGuard>,
}

impl TcpEndpoint {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            _client: None,
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl Endpoint for TcpEndpoint {
    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stream.try_read(buf) {
            Ok(0) => Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn try_write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self.stream.try_write(data) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }
}

/// Counts a connected client until dropped
#[derive(Debug)]
struct ClientGuard(Arc<AtomicUsize>);

impl ClientGuard {
    fn new(clients: &Arc<AtomicUsize>) -> Self {
        clients.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(clients))
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Accept loop spawning one link per client
pub struct TcpServer<H: LinkHandler> {
    config: TcpConfig,
    policy: LinkPolicy,
    spawner: LinkSpawner<H>,
    clients: Arc<AtomicUsize>,
}

impl<H: LinkHandler> TcpServer<H> {
    pub fn new(config: TcpConfig, spawner: LinkSpawner<H>) -> Self {
        Self {
            config,
            policy: LinkPolicy::tcp(),
            spawner,
            clients: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Override the per-client policy
    pub fn policy(mut self, policy: LinkPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Clients currently holding a link
    pub fn clients(&self) -> usize {
        self.clients.load(Ordering::Acquire)
    }

    /// Shared handle to the client count
    pub fn client_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.clients)
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "TCP server listening");
        Ok(listener)
    }

    /// Bind and accept forever
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accept on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => self.handle_connection(socket, peer_addr),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Run the accept loop on its own task
    pub fn spawn(self, listener: TcpListener) -> io::Result<TcpHandle> {
        let local_addr = listener.local_addr()?;
        let clients = self.client_counter();
        let task = tokio::spawn(async move { self.serve(listener).await });
        Ok(TcpHandle {
            local_addr,
            clients,
            task,
        })
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        tracing::debug!(peer = %peer_addr, "New connection");

        if self.config.nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::warn!(peer = %peer_addr, error = %e, "Failed to set TCP_NODELAY");
            }
        }

        let mut endpoint = TcpEndpoint::new(socket, peer_addr);
        endpoint._client = Some(ClientGuard::new(&self.clients));

        // On refusal the endpoint is dropped, closing the socket
        if self
            .spawner
            .spawn(format!("tcp {}", peer_addr), endpoint, self.policy)
            .is_ok()
        {
            tracing::info!(peer = %peer_addr, clients = self.clients(), "Client connected");
        }
    }
}

/// Running accept loop
#[derive(Debug)]
pub struct TcpHandle {
    local_addr: SocketAddr,
    clients: Arc<AtomicUsize>,
    task: JoinHandle<Result<()>>,
}

impl TcpHandle {
    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Clients currently holding a link
    pub fn clients(&self) -> usize {
        self.clients.load(Ordering::Acquire)
    }

    /// Stop accepting; running client links are not affected
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn abort_handle(&self) -> tokio::task::AbortHandle {
        self.task.abort_handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::io::AsyncReadExt;

    use crate::channel::ChannelPool;
    use crate::link::{ActiveLinkCounter, LinkConfig, NullHandler};
    use crate::scheduler::NoPriority;

    fn spawner(channels: usize) -> LinkSpawner<NullHandler> {
        LinkSpawner::new(
            Arc::new(ChannelPool::with_capacity(channels, 256)),
            Arc::new(ActiveLinkCounter::new()),
            Arc::new(NullHandler),
            Arc::new(NoPriority),
            LinkConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_endpoint_reports_eof() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (socket, peer) = listener.accept().await.unwrap();
        let mut endpoint = TcpEndpoint::new(socket, peer);

        let mut buf = [0u8; 16];
        assert_eq!(endpoint.try_read(&mut buf).unwrap(), 0);

        drop(client);
        let mut eof = None;
        for _ in 0..100 {
            match endpoint.try_read(&mut buf) {
                Ok(_) => tokio::time::sleep(Duration::from_millis(5)).await,
                Err(e) => {
                    eof = Some(e.kind());
                    break;
                }
            }
        }
        assert_eq!(eof, Some(io::ErrorKind::UnexpectedEof));
    }

    #[tokio::test]
    async fn test_write_never_waits_on_full_window() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();
        let (socket, peer) = listener.accept().await.unwrap();
        let mut endpoint = TcpEndpoint::new(socket, peer);
        endpoint.stream.writable().await.unwrap();
        assert!(endpoint.try_write(b"first").unwrap() > 0);

        // The client never reads, so the socket buffers fill up
        let chunk = vec![0x55u8; 64 * 1024];
        let mut full = false;
        for _ in 0..10_000 {
            if endpoint.try_write(&chunk).unwrap() == 0 {
                full = true;
                break;
            }
        }
        assert!(full);
    }

    #[tokio::test]
    async fn test_server_refuses_beyond_pool() {
        let server = TcpServer::new(TcpConfig::with_addr("127.0.0.1:0".parse().unwrap()), spawner(1));
        let listener = server.bind().await.unwrap();
        let handle = server.spawn(listener).unwrap();

        let _first = TcpStream::connect(handle.local_addr()).await.unwrap();
        for _ in 0..100 {
            if handle.clients() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(handle.clients(), 1);

        // Second client is accepted by the OS, then closed by the server
        let mut second = TcpStream::connect(handle.local_addr()).await.unwrap();
        let mut buf = [0u8; 1];
        let n = tokio::time::timeout(Duration::from_secs(2), second.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);
        assert_eq!(handle.clients(), 1);

        handle.abort();
    }
}
