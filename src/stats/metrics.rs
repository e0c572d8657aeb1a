//! Statistics for links and the hub

use std::time::Duration;

use tokio::time::Instant;

/// Per-link statistics
#[derive(Debug, Clone)]
pub struct LinkStats {
    /// When the link started
    pub started_at: Instant,
    /// Bytes read from the endpoint
    pub bytes_in: u64,
    /// Bytes written to the endpoint
    pub bytes_out: u64,
    /// Frames decoded
    pub frames_in: u64,
    /// Heartbeats seen
    pub heartbeats: u64,
    /// Frames the handler did not accept
    pub dispatch_failures: u64,
    /// Failed writes
    pub write_errors: u64,
    /// Failed reads other than "nothing available"
    pub read_errors: u64,
    /// Frames the decoder could not parse
    pub parse_errors: u64,
}

impl LinkStats {
    pub fn new(started_at: Instant) -> Self {
        Self {
            started_at,
            bytes_in: 0,
            bytes_out: 0,
            frames_in: 0,
            heartbeats: 0,
            dispatch_failures: 0,
            write_errors: 0,
            read_errors: 0,
            parse_errors: 0,
        }
    }

    /// Time since the link started
    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Average inbound rate in bytes per second over `elapsed`
    pub fn rx_rate(&self, elapsed: Duration) -> u64 {
        let secs = elapsed.as_secs();
        if secs > 0 {
            self.bytes_in / secs
        } else {
            0
        }
    }
}

/// Hub-wide snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Links started since the hub was created
    pub links_started: u64,
    /// Links refused because the pool was full
    pub links_refused: u64,
    /// Links past their first heartbeat right now
    pub active_links: usize,
    /// Occupied channels right now
    pub occupied_channels: usize,
    /// Total pool size
    pub channels: usize,
    /// Bytes dropped by full queues, summed over occupied channels
    pub dropped_bytes: u64,
}
