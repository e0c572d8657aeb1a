//! In-process endpoint
//!
//! A [`MemoryEndpoint`] behaves like a connected socket whose other end is a
//! [`MemoryPeer`]. Useful for driving a link without any OS resources.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use tokio::sync::mpsc::{self, error::TryRecvError};

use super::{Endpoint, TransportKind};

/// Link side of an in-memory pipe
#[derive(Debug)]
pub struct MemoryEndpoint {
    inbound: mpsc::UnboundedReceiver<Bytes>,
    outbound: mpsc::UnboundedSender<Bytes>,
    pending: BytesMut,
    fail_writes: Arc<AtomicBool>,
    write_limit: Arc<AtomicUsize>,
}

/// Test side of an in-memory pipe
#[derive(Debug)]
pub struct MemoryPeer {
    inbound: mpsc::UnboundedSender<Bytes>,
    outbound: mpsc::UnboundedReceiver<Bytes>,
    fail_writes: Arc<AtomicBool>,
    write_limit: Arc<AtomicUsize>,
}

/// Create a connected endpoint/peer pair
pub fn memory_pair() -> (MemoryEndpoint, MemoryPeer) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let fail_writes = Arc::new(AtomicBool::new(false));
    let write_limit = Arc::new(AtomicUsize::new(usize::MAX));

    let endpoint = MemoryEndpoint {
        inbound: in_rx,
        outbound: out_tx,
        pending: BytesMut::new(),
        fail_writes: Arc::clone(&fail_writes),
        write_limit: Arc::clone(&write_limit),
    };
    let peer = MemoryPeer {
        inbound: in_tx,
        outbound: out_rx,
        fail_writes,
        write_limit,
    };
    (endpoint, peer)
}

impl Endpoint for MemoryEndpoint {
    fn kind(&self) -> TransportKind {
        TransportKind::Memory
    }

    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut disconnected = false;
        while self.pending.len() < buf.len() {
            match self.inbound.try_recv() {
                Ok(chunk) => self.pending.extend_from_slice(&chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }

        if self.pending.is_empty() {
            return if disconnected {
                Err(io::ErrorKind::UnexpectedEof.into())
            } else {
                Ok(0)
            };
        }

        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }

    fn try_write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.fail_writes.load(Ordering::Acquire) {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        let n = data.len().min(self.write_limit.load(Ordering::Acquire));
        if n == 0 {
            return Ok(0);
        }
        self.outbound
            .send(Bytes::copy_from_slice(&data[..n]))
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
        Ok(n)
    }
}

impl MemoryPeer {
    /// Deliver bytes to the endpoint
    pub fn send(&self, data: impl Into<Bytes>) -> bool {
        self.inbound.send(data.into()).is_ok()
    }

    /// Everything the endpoint has written so far
    pub fn take_written(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while let Ok(chunk) = self.outbound.try_recv() {
            out.extend_from_slice(&chunk);
        }
        out
    }

    /// Wait for the next write from the endpoint
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.outbound.recv().await
    }

    /// Make every following endpoint write fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Release);
    }

    /// Accept at most `limit` bytes per endpoint write; `0` stops writes
    /// the way a peer that no longer reads does
    pub fn limit_writes(&self, limit: usize) {
        self.write_limit.store(limit, Ordering::Release);
    }
}
