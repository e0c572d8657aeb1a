//! Outbound telemetry
//!
//! Announces the vehicle on every active link: an autopilot HEARTBEAT at a
//! fixed rate plus, optionally, a camera component heartbeat. The stream
//! only publishes through fan-out; it never sees individual links.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::channel::Publisher;
use crate::codec::message::{autopilot_heartbeat, camera_heartbeat, MAV_COMP_ID_AUTOPILOT1, MAV_COMP_ID_CAMERA};
use crate::codec::HEARTBEAT_DATA;

/// Telemetry stream options
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Heartbeat period
    pub interval: Duration,

    /// Also announce a camera component
    pub camera: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            camera: true,
        }
    }
}

impl TelemetryConfig {
    /// Set the heartbeat period
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Disable the camera heartbeat
    pub fn without_camera(mut self) -> Self {
        self.camera = false;
        self
    }
}

/// Periodic heartbeat producer
pub struct TelemetryStream {
    publisher: Publisher,
    config: TelemetryConfig,
    heartbeat: watch::Receiver<HEARTBEAT_DATA>,
}

impl TelemetryStream {
    /// Create a stream and the sender used to update the advertised heartbeat
    pub fn new(publisher: Publisher, config: TelemetryConfig) -> (Self, watch::Sender<HEARTBEAT_DATA>) {
        let (tx, rx) = watch::channel(autopilot_heartbeat(0));
        let stream = Self {
            publisher,
            config,
            heartbeat: rx,
        };
        (stream, tx)
    }

    /// Publish one round of heartbeats, returning the channels reached
    pub fn tick(&self) -> usize {
        let heartbeat = self.heartbeat.borrow().clone();
        let reached = self.publisher.send_heartbeat(MAV_COMP_ID_AUTOPILOT1, heartbeat);
        if self.config.camera {
            self.publisher.send_heartbeat(MAV_COMP_ID_CAMERA, camera_heartbeat());
        }
        reached
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_ms = self.config.interval.as_millis() as u64, "Telemetry stream started");
        loop {
            ticker.tick().await;
            let reached = self.tick();
            tracing::trace!(channels = reached, "Heartbeat published");
        }
    }

    /// Run on its own task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
