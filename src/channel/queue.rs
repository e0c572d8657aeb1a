//! Fixed-capacity byte ring buffer
//!
//! One slot is kept as a sentinel so that `head == tail` always means empty:
//! a queue of capacity `C` holds at most `C - 1` bytes.

/// Default queue capacity in bytes
pub const DEFAULT_QUEUE_CAPACITY: usize = 2048;

/// Ring buffer holding one channel's pending outbound bytes
#[derive(Debug)]
pub struct ByteQueue {
    buf: Box<[u8]>,
    head: usize,
    tail: usize,
}

impl ByteQueue {
    /// Create a queue with the given capacity (usable space is `capacity - 1`)
    ///
    /// # Panics
    ///
    /// Panics if `capacity < 2`.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity >= 2, "ByteQueue capacity must be at least 2");
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
        }
    }

    /// Total capacity including the sentinel slot
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of bytes currently queued
    pub fn len(&self) -> usize {
        (self.tail + self.buf.len() - self.head) % self.buf.len()
    }

    /// Bytes that can still be pushed before the queue is full
    pub fn free(&self) -> usize {
        self.buf.len() - 1 - self.len()
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn is_full(&self) -> bool {
        (self.tail + 1) % self.buf.len() == self.head
    }

    /// Append as many bytes from `data` as fit
    ///
    /// Returns the number written. Bytes past the free space are dropped;
    /// data already queued is never overwritten.
    pub fn push(&mut self, data: &[u8]) -> usize {
        let mut written = 0;
        for &byte in data {
            if self.is_full() {
                break;
            }
            self.buf[self.tail] = byte;
            self.tail = (self.tail + 1) % self.buf.len();
            written += 1;
        }
        written
    }

    /// Move up to `out.len()` bytes into `out`, returning the count
    pub fn pop(&mut self, out: &mut [u8]) -> usize {
        let mut read = 0;
        for slot in out.iter_mut() {
            if self.is_empty() {
                break;
            }
            *slot = self.buf[self.head];
            self.head = (self.head + 1) % self.buf.len();
            read += 1;
        }
        read
    }

    /// Discard all queued bytes
    pub fn reset(&mut self) {
        self.head = 0;
        self.tail = 0;
    }
}

impl Default for ByteQueue {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }
}
