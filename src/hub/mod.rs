//! Composition root
//!
//! [`MavlinkHub`] owns the channel pool, the active link counter and the
//! handler, and starts the configured transport adapters.
//!
//! ```text
//!   TcpServer ──accept──┐
//!   UdpEndpoint ────────┼──► LinkSpawner ──occupy──► Connection task (per link)
//!   SerialEndpoint ─────┘                               │        ▲
//!                                                       ▼        │ drain
//!                                               LinkHandler   ChannelPool ◄── Publisher
//!                                                                            (telemetry, app)
//! ```

pub mod config;

pub use config::HubConfig;

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};

use crate::channel::{ChannelPool, Publisher};
use crate::codec::HEARTBEAT_DATA;
use crate::error::Result;
use crate::failsafe::LinkFailsafe;
use crate::link::{ActiveLinkCounter, LinkExit, LinkHandler, LinkPolicy, LinkSpawner};
use crate::scheduler::{NoPriority, PriorityHint};
use crate::stats::HubStats;
use crate::stream::{TelemetryConfig, TelemetryStream};
use crate::transport::{
    Endpoint, SerialConfig, SerialEndpoint, TcpConfig, TcpHandle, TcpServer, UdpConfig, UdpEndpoint,
};

/// MAVLink link hub
pub struct MavlinkHub<H: LinkHandler> {
    config: HubConfig,
    pool: Arc<ChannelPool>,
    counter: Arc<ActiveLinkCounter>,
    spawner: LinkSpawner<H>,
    publisher: Publisher,
}

impl<H: LinkHandler> MavlinkHub<H> {
    /// Create a hub that leaves thread priorities alone
    pub fn new(config: HubConfig, handler: H) -> Result<Self> {
        Self::with_priority(config, handler, NoPriority)
    }

    /// Create a hub with a priority policy for active links
    pub fn with_priority(config: HubConfig, handler: H, priority: impl PriorityHint) -> Result<Self> {
        config.validate()?;

        let pool = Arc::new(ChannelPool::with_capacity(config.channels, config.queue_capacity));
        let counter = Arc::new(ActiveLinkCounter::new());
        let spawner = LinkSpawner::new(
            Arc::clone(&pool),
            Arc::clone(&counter),
            Arc::new(handler),
            Arc::new(priority),
            config.link.clone(),
        );
        let publisher = Publisher::new(Arc::clone(&pool), config.system_id, config.component_id);

        Ok(Self {
            config,
            pool,
            counter,
            spawner,
            publisher,
        })
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// The shared channel pool
    pub fn pool(&self) -> &Arc<ChannelPool> {
        &self.pool
    }

    /// The shared active link counter
    pub fn counter(&self) -> &Arc<ActiveLinkCounter> {
        &self.counter
    }

    /// Producer handle for outbound frames
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    /// Links currently past their first heartbeat
    pub fn active_links(&self) -> usize {
        self.counter.get()
    }

    /// Failsafe reader bound to this hub's counter
    pub fn failsafe(&self) -> LinkFailsafe {
        LinkFailsafe::new(Arc::clone(&self.counter))
    }

    /// Snapshot of hub counters
    pub fn stats(&self) -> HubStats {
        let dropped_bytes = (0..self.pool.capacity())
            .filter_map(|index| self.pool.stats(index))
            .map(|stats| stats.dropped_bytes)
            .sum();

        HubStats {
            links_started: self.spawner.started(),
            links_refused: self.spawner.refused(),
            active_links: self.counter.get(),
            occupied_channels: self.pool.occupied_count(),
            channels: self.pool.capacity(),
            dropped_bytes,
        }
    }

    /// Start a link over any endpoint
    pub fn spawn_link<E: Endpoint>(
        &self,
        name: impl Into<String>,
        endpoint: E,
        policy: LinkPolicy,
    ) -> Result<JoinHandle<LinkExit>> {
        self.spawner.spawn(name, endpoint, policy)
    }

    /// Bind a TCP listener and accept clients on a background task
    pub async fn serve_tcp(&self, config: TcpConfig) -> Result<TcpHandle> {
        let server = TcpServer::new(config, self.spawner.clone());
        let listener = server.bind().await?;
        Ok(server.spawn(listener)?)
    }

    /// Bind the UDP socket and start its link
    pub async fn open_udp(&self, config: &UdpConfig) -> Result<JoinHandle<LinkExit>> {
        let endpoint = UdpEndpoint::bind(config).await?;
        let name = format!("udp {}", endpoint.local_addr()?);
        self.spawn_link(name, endpoint, LinkPolicy::udp())
    }

    /// Open the serial port and start its link
    pub fn open_serial(&self, config: &SerialConfig) -> Result<JoinHandle<LinkExit>> {
        let endpoint = SerialEndpoint::open(config)?;
        let name = format!("serial {}", endpoint.device());
        self.spawn_link(name, endpoint, LinkPolicy::serial())
    }

    /// Start the heartbeat stream
    ///
    /// The returned sender updates the advertised autopilot heartbeat.
    pub fn start_telemetry(&self, config: TelemetryConfig) -> (JoinHandle<()>, watch::Sender<HEARTBEAT_DATA>) {
        let (stream, heartbeat) = TelemetryStream::new(self.publisher(), config);
        (stream.spawn(), heartbeat)
    }

    /// Start every configured adapter and run until `shutdown` resolves
    ///
    /// The accept loop, the UDP and serial links and the telemetry stream
    /// are aborted at shutdown. Aborted links release their channels.
    /// Accepted TCP clients run until they disconnect.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut tasks: Vec<AbortHandle> = Vec::new();
        let started = self.start_adapters(&mut tasks).await;

        let result = match started {
            Ok(()) => {
                shutdown.await;
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            Err(e) => Err(e),
        };

        for task in &tasks {
            task.abort();
        }
        result
    }

    async fn start_adapters(&self, tasks: &mut Vec<AbortHandle>) -> Result<()> {
        if let Some(tcp) = &self.config.tcp {
            let handle = self.serve_tcp(tcp.clone()).await?;
            tasks.push(handle.abort_handle());
        }
        if let Some(udp) = &self.config.udp {
            tasks.push(self.open_udp(udp).await?.abort_handle());
        }
        if let Some(serial) = &self.config.serial {
            tasks.push(self.open_serial(serial)?.abort_handle());
        }
        if let Some(telemetry) = &self.config.telemetry {
            let (task, _heartbeat) = self.start_telemetry(telemetry.clone());
            tasks.push(task.abort_handle());
        }
        Ok(())
    }
}
