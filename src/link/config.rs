//! Link loop configuration

use std::time::Duration;

use super::liveness::DEFAULT_HEARTBEAT_TIMEOUT;

/// Timing and buffer sizes shared by every link
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Delay between loop iterations
    pub poll_interval: Duration,

    /// Time without a heartbeat before a link goes idle
    pub heartbeat_timeout: Duration,

    /// Maximum bytes taken from the channel queue per write
    pub write_chunk: usize,

    /// Size of the buffer handed to each non-blocking read
    pub read_buffer: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            write_chunk: 256,
            read_buffer: 256,
        }
    }
}

impl LinkConfig {
    /// Set the poll interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the heartbeat timeout
    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Set the write chunk size
    pub fn write_chunk(mut self, size: usize) -> Self {
        self.write_chunk = size;
        self
    }

    /// Set the read buffer size
    pub fn read_buffer(mut self, size: usize) -> Self {
        self.read_buffer = size;
        self
    }
}

/// How a link reacts to write errors and liveness loss
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkPolicy {
    /// Terminate on the first write error (otherwise log and keep polling)
    pub exit_on_error: bool,

    /// Terminate when the heartbeat times out (otherwise stay idle)
    pub exit_on_idle: bool,

    /// Receive fan-out only after the first heartbeat
    pub wait_for_heartbeat: bool,
}

impl Default for LinkPolicy {
    fn default() -> Self {
        Self {
            exit_on_error: false,
            exit_on_idle: false,
            wait_for_heartbeat: true,
        }
    }
}

impl LinkPolicy {
    /// Accepted TCP client: gone once the socket fails
    pub fn tcp() -> Self {
        Self {
            exit_on_error: true,
            ..Self::default()
        }
    }

    /// Persistent UDP socket
    pub fn udp() -> Self {
        Self::default()
    }

    /// Persistent serial port
    pub fn serial() -> Self {
        Self::default()
    }

    pub fn exit_on_error(mut self, exit: bool) -> Self {
        self.exit_on_error = exit;
        self
    }

    pub fn exit_on_idle(mut self, exit: bool) -> Self {
        self.exit_on_idle = exit;
        self
    }

    pub fn wait_for_heartbeat(mut self, wait: bool) -> Self {
        self.wait_for_heartbeat = wait;
        self
    }
}
