//! Hub configuration

use crate::channel::{DEFAULT_CHANNELS, DEFAULT_QUEUE_CAPACITY};
use crate::error::{Error, Result};
use crate::link::LinkConfig;
use crate::stream::TelemetryConfig;
use crate::transport::{SerialConfig, TcpConfig, UdpConfig};

/// Hub configuration options
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Number of channels (maximum concurrent links)
    pub channels: usize,

    /// Per-channel queue size in bytes (one byte is kept free)
    pub queue_capacity: usize,

    /// System id of outbound frames
    pub system_id: u8,

    /// Component id of outbound frames
    pub component_id: u8,

    /// Poll loop settings shared by every link
    pub link: LinkConfig,

    /// TCP listener, if any
    pub tcp: Option<TcpConfig>,

    /// UDP socket, if any
    pub udp: Option<UdpConfig>,

    /// Serial port, if any
    pub serial: Option<SerialConfig>,

    /// Outbound heartbeats, if any
    pub telemetry: Option<TelemetryConfig>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            channels: DEFAULT_CHANNELS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            system_id: 1,
            component_id: 1,
            link: LinkConfig::default(),
            tcp: Some(TcpConfig::default()),
            udp: None,
            serial: None,
            telemetry: Some(TelemetryConfig::default()),
        }
    }
}

impl HubConfig {
    /// Set the number of channels
    pub fn channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    /// Set the per-channel queue size
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the outbound system and component ids
    pub fn ids(mut self, system_id: u8, component_id: u8) -> Self {
        self.system_id = system_id;
        self.component_id = component_id;
        self
    }

    /// Set the link loop settings
    pub fn link(mut self, link: LinkConfig) -> Self {
        self.link = link;
        self
    }

    /// Enable the TCP listener
    pub fn tcp(mut self, tcp: TcpConfig) -> Self {
        self.tcp = Some(tcp);
        self
    }

    /// Enable the UDP socket
    pub fn udp(mut self, udp: UdpConfig) -> Self {
        self.udp = Some(udp);
        self
    }

    /// Enable the serial port
    pub fn serial(mut self, serial: SerialConfig) -> Self {
        self.serial = Some(serial);
        self
    }

    /// Set the telemetry stream
    pub fn telemetry(mut self, telemetry: TelemetryConfig) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Disable the TCP listener
    pub fn without_tcp(mut self) -> Self {
        self.tcp = None;
        self
    }

    /// Disable outbound heartbeats
    pub fn without_telemetry(mut self) -> Self {
        self.telemetry = None;
        self
    }

    /// Reject settings the hub cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 {
            return Err(Error::InvalidConfig("channel count must be at least 1".into()));
        }
        if self.queue_capacity < 2 {
            return Err(Error::InvalidConfig(format!(
                "queue capacity {} is below the minimum of 2",
                self.queue_capacity
            )));
        }
        if self.link.poll_interval.is_zero() {
            return Err(Error::InvalidConfig("poll interval must be non-zero".into()));
        }
        if self.link.write_chunk == 0 || self.link.read_buffer == 0 {
            return Err(Error::InvalidConfig("write chunk and read buffer must be non-zero".into()));
        }
        if let Some(telemetry) = &self.telemetry {
            if telemetry.interval.is_zero() {
                return Err(Error::InvalidConfig("telemetry interval must be non-zero".into()));
            }
        }
        Ok(())
    }
}
