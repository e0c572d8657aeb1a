//! MAVLink hub daemon
//!
//! Run with: mavlink-hub [TCP_BIND_ADDR] [SERIAL_DEVICE]
//!
//! Examples:
//!   mavlink-hub                               # TCP on 0.0.0.0:1128
//!   mavlink-hub localhost:5760                # TCP on 127.0.0.1:5760
//!   mavlink-hub 0.0.0.0:1128 /dev/ttyUSB0     # TCP plus a serial radio
//!
//! Connect a ground station (QGroundControl, MAVProxy) to the TCP port. The
//! hub announces itself with 1 Hz heartbeats and logs every frame it gets.
//! Set `RUST_LOG=mavlink_hub=debug` for per-frame output.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mavlink_hub::codec::message::{MSG_ID_HEARTBEAT, MSG_ID_MANUAL_CONTROL};
use mavlink_hub::{
    DispatchError, Frame, HubConfig, LinkContext, LinkHandler, MavlinkHub, SerialConfig,
    TcpConfig,
};

/// Handler that logs link events and counts frames
struct LoggingHandler {
    frames: AtomicU64,
}

impl LoggingHandler {
    fn new() -> Self {
        Self {
            frames: AtomicU64::new(0),
        }
    }
}

impl LinkHandler for LoggingHandler {
    async fn on_link_begin(&self, ctx: &LinkContext) {
        tracing::info!(link = %ctx.name, channel = ctx.channel, "Ground link opened");
    }

    async fn on_frame(&self, ctx: &LinkContext, frame: &Frame) -> Result<(), DispatchError> {
        self.frames.fetch_add(1, Ordering::Relaxed);

        match frame.msg_id() {
            MSG_ID_HEARTBEAT => {
                if let Some(hb) = frame.heartbeat() {
                    tracing::trace!(
                        link = %ctx.name,
                        system_id = frame.system_id(),
                        mav_type = ?hb.mavtype,
                        "Heartbeat"
                    );
                }
                Ok(())
            }
            MSG_ID_MANUAL_CONTROL => Ok(()),
            other => Err(DispatchError::Unsupported(other)),
        }
    }

    async fn on_link_end(&self, ctx: &LinkContext) {
        tracing::info!(
            link = %ctx.name,
            total_frames = self.frames.load(Ordering::Relaxed),
            "Ground link closed"
        );
    }
}

/// Parse bind address from command line argument.
///
/// Accepts `IP:PORT`, `IP` (port 1128) and `localhost[:PORT]`.
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    const DEFAULT_PORT: u16 = 1128;

    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: mavlink-hub [TCP_BIND_ADDR] [SERIAL_DEVICE]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  TCP_BIND_ADDR    Address to listen on (default: 0.0.0.0:1128)");
    eprintln!("  SERIAL_DEVICE    Serial radio at 57600 baud (default: none)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let tcp = match args.get(1) {
        Some(addr) => match parse_bind_addr(addr) {
            Ok(addr) => TcpConfig::with_addr(addr),
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => TcpConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut config = HubConfig::default().tcp(tcp);
    if let Some(device) = args.get(2) {
        config = config.serial(SerialConfig::with_device(device));
    }

    let hub = Arc::new(MavlinkHub::new(config, LoggingHandler::new())?);

    let stats_hub = Arc::clone(&hub);
    let stats_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(5));
        loop {
            ticker.tick().await;
            let stats = stats_hub.stats();
            tracing::info!(
                active = stats.active_links,
                occupied = stats.occupied_channels,
                channels = stats.channels,
                refused = stats.links_refused,
                dropped_bytes = stats.dropped_bytes,
                "Hub stats"
            );
        }
    });

    let result = hub
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    stats_task.abort();

    if let Err(e) = result {
        eprintln!("Hub error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}
