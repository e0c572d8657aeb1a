//! Publish/subscribe fan-out
//!
//! Publishing appends a frame to the queue of every active channel. There
//! is no subscriber list: a channel is subscribed for as long as it is
//! occupied and active.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use mavlink::common::{MavMessage, MavSeverity, HEARTBEAT_DATA};
use mavlink::MavHeader;

use super::pool::{lock, ChannelPool};
use crate::codec::message::{status_text, MAX_STATUS_TEXT};
use crate::codec::{encode, Frame};

impl ChannelPool {
    /// Append `frame` to every active channel's queue
    ///
    /// Returns the number of channels the frame was offered to. A full
    /// queue keeps what fits and drops the rest without affecting other
    /// channels.
    pub fn publish(&self, frame: &[u8]) -> usize {
        let mut delivered = 0;

        for (index, slot) in self.slots.iter().enumerate() {
            let mut slot = lock(slot);
            if !slot.active {
                continue;
            }

            let written = slot.queue.push(frame);
            slot.enqueued_bytes += written as u64;
            if written < frame.len() {
                let dropped = frame.len() - written;
                slot.dropped_bytes += dropped as u64;
                tracing::warn!(
                    channel = index,
                    written = written,
                    dropped = dropped,
                    "Channel queue full, frame truncated"
                );
            }
            delivered += 1;
        }

        delivered
    }
}

/// Producer handle that packs frames and fans them out
///
/// Cheap to clone; every clone shares the pool and the sequence counter.
#[derive(Debug, Clone)]
pub struct Publisher {
    pool: Arc<ChannelPool>,
    system_id: u8,
    component_id: u8,
    seq: Arc<AtomicU8>,
}

impl Publisher {
    /// Create a publisher sending as `system_id`/`component_id`
    pub fn new(pool: Arc<ChannelPool>, system_id: u8, component_id: u8) -> Self {
        Self {
            pool,
            system_id,
            component_id,
            seq: Arc::new(AtomicU8::new(0)),
        }
    }

    /// The pool this publisher writes into
    pub fn pool(&self) -> &Arc<ChannelPool> {
        &self.pool
    }

    /// Fan out already-encoded bytes
    pub fn publish(&self, bytes: &[u8]) -> usize {
        self.pool.publish(bytes)
    }

    /// Pack and fan out a frame as-is (its own header is kept)
    pub fn send_frame(&self, frame: &Frame) -> usize {
        match encode(frame) {
            Ok(bytes) => self.pool.publish(&bytes),
            Err(e) => {
                tracing::warn!(msg_id = frame.msg_id(), error = %e, "Cannot encode frame, not published");
                0
            }
        }
    }

    /// Send a message as `component_id` with the next sequence number
    pub fn send(&self, component_id: u8, message: MavMessage) -> usize {
        let header = MavHeader {
            system_id: self.system_id,
            component_id,
            sequence: self.seq.fetch_add(1, Ordering::Relaxed),
        };
        self.send_frame(&Frame::v2(header, message))
    }

    /// Fan out a heartbeat from `component_id`
    pub fn send_heartbeat(&self, component_id: u8, heartbeat: HEARTBEAT_DATA) -> usize {
        self.send(component_id, MavMessage::HEARTBEAT(heartbeat))
    }

    /// Fan out a STATUSTEXT; text longer than 50 bytes is refused
    pub fn send_status_text(&self, severity: MavSeverity, text: &str) -> usize {
        match status_text(severity, text) {
            Some(st) => self.send(self.component_id, MavMessage::STATUSTEXT(st)),
            None => {
                tracing::warn!(len = text.len(), max = MAX_STATUS_TEXT, "Status text too long, not published");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::message::{autopilot_heartbeat, camera_heartbeat};
    use crate::codec::MavlinkDecoder;

    fn pool_with_active(channels: usize, active: &[usize]) -> ChannelPool {
        let pool = ChannelPool::with_capacity(channels, 64);
        for _ in 0..channels {
            pool.occupy();
        }
        for &index in active {
            pool.set_active(index, true);
        }
        pool
    }

    fn drain_all(pool: &ChannelPool, index: usize) -> Vec<u8> {
        let mut out = vec![0u8; 256];
        let n = pool.drain(index, &mut out);
        out.truncate(n);
        out
    }

    #[test]
    fn test_publish_reaches_only_active_channels() {
        let pool = pool_with_active(3, &[0, 2]);

        assert_eq!(pool.publish(b"frame"), 2);

        assert_eq!(drain_all(&pool, 0), b"frame");
        assert!(drain_all(&pool, 1).is_empty());
        assert_eq!(drain_all(&pool, 2), b"frame");
    }

    #[test]
    fn test_publish_preserves_order_within_channel() {
        let pool = pool_with_active(1, &[0]);

        pool.publish(b"first-");
        pool.publish(b"second");

        assert_eq!(drain_all(&pool, 0), b"first-second");
    }

    #[test]
    fn test_full_queue_counts_drops() {
        let pool = ChannelPool::with_capacity(2, 8);
        pool.occupy();
        pool.occupy();
        pool.set_active(0, true);
        pool.set_active(1, true);

        pool.publish(b"12345");
        // Channel 1 drains and has room again; channel 0 stays backed up
        drain_all(&pool, 1);
        assert_eq!(pool.publish(b"67890"), 2);

        let slow = pool.stats(0).unwrap();
        assert_eq!(slow.queued_bytes, 7);
        assert_eq!(slow.dropped_bytes, 3);

        let fast = pool.stats(1).unwrap();
        assert_eq!(fast.dropped_bytes, 0);
        assert_eq!(drain_all(&pool, 1), b"67890");
    }

    #[test]
    fn test_publish_with_no_active_channels() {
        let pool = ChannelPool::with_capacity(4, 64);
        assert_eq!(pool.publish(b"lost"), 0);
    }

    #[test]
    fn test_publisher_sequences_frames() {
        let pool = Arc::new(pool_with_active(1, &[0]));
        let publisher = Publisher::new(Arc::clone(&pool), 1, 1);

        publisher.send_heartbeat(1, autopilot_heartbeat(0));
        publisher.send_heartbeat(100, camera_heartbeat());

        let mut decoder = MavlinkDecoder::new();
        let frames = decoder.push_slice(&drain_all(&pool, 0));
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].sequence(), 0);
        assert_eq!(frames[1].sequence(), 1);
        assert_eq!(frames[1].component_id(), 100);
    }

    #[test]
    fn test_status_text_too_long() {
        let pool = Arc::new(pool_with_active(1, &[0]));
        let publisher = Publisher::new(Arc::clone(&pool), 1, 1);

        assert_eq!(publisher.send_status_text(MavSeverity::MAV_SEVERITY_INFO, &"x".repeat(60)), 0);
        assert_eq!(publisher.send_status_text(MavSeverity::MAV_SEVERITY_INFO, "armed"), 1);
    }
}
