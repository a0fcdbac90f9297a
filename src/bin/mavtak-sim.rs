//! Synthetic MAVLink source: flies a vehicle around a circle and streams
//! HEARTBEAT, GLOBAL_POSITION_INT, ATTITUDE and VFR_HUD over UDP.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use mavtak_mavlink::sim::{heartbeat, CircularTrack};
use mavtak_mavlink::{MavMessage, MavlinkVersion};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::signal;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const COMPONENT_ID: u8 = 1;

/// Highest telemetry rate; keeps the send period at or above 1ms
const MAX_RATE_HZ: f64 = 1000.0;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Wire {
    V1,
    V2,
}

impl From<Wire> for MavlinkVersion {
    fn from(wire: Wire) -> Self {
        match wire {
            Wire::V1 => MavlinkVersion::V1,
            Wire::V2 => MavlinkVersion::V2,
        }
    }
}

/// mavtak-sim - MAVLink test peer flying a closed circular track
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host receiving the MAVLink stream
    #[arg(long, default_value = "127.0.0.1")]
    target: String,

    /// UDP port receiving the MAVLink stream
    #[arg(short, long, default_value_t = 14550)]
    port: u16,

    /// Telemetry messages per second
    #[arg(short, long, default_value_t = 10.0)]
    rate: f64,

    /// MAVLink wire version
    #[arg(long, value_enum, default_value = "v2")]
    wire: Wire,

    /// MAVLink system id of the simulated vehicle
    #[arg(long, default_value_t = 1)]
    system_id: u8,

    /// Track centre latitude
    #[arg(long, default_value_t = 37.7749, allow_hyphen_values = true)]
    center_lat: f64,

    /// Track centre longitude
    #[arg(long, default_value_t = -122.4194, allow_hyphen_values = true)]
    center_lon: f64,

    /// Track radius in meters
    #[arg(long, default_value_t = 100.0)]
    radius: f64,

    /// Seconds per lap
    #[arg(long, default_value_t = 60.0)]
    period: f64,

    /// Mean altitude in meters MSL
    #[arg(long, default_value_t = 100.0)]
    altitude: f64,

    /// Altitude swing in meters
    #[arg(long, default_value_t = 10.0)]
    amplitude: f64,

    /// Stop after this many seconds (runs until Ctrl+C when unset)
    #[arg(long)]
    duration: Option<f64>,
}

impl Args {
    fn telemetry_period(&self) -> Result<Duration> {
        anyhow::ensure!(
            self.rate > 0.0 && self.rate <= MAX_RATE_HZ,
            "Rate must be in (0, {MAX_RATE_HZ}] Hz, got {}",
            self.rate
        );
        Ok(Duration::from_secs_f64(1.0 / self.rate))
    }

    fn track(&self) -> Result<CircularTrack> {
        let period = Duration::try_from_secs_f64(self.period)
            .with_context(|| format!("Invalid period: {}", self.period))?;

        Ok(CircularTrack {
            center_lat: self.center_lat,
            center_lon: self.center_lon,
            radius_m: self.radius,
            period,
            base_alt_m: self.altitude,
            alt_amplitude_m: self.amplitude,
        })
    }
}

struct Sender {
    socket: UdpSocket,
    target: SocketAddr,
    version: MavlinkVersion,
    system_id: u8,
    sequence: u8,
}

impl Sender {
    async fn send(&mut self, message: &MavMessage) -> Result<()> {
        let frame = message
            .to_frame(self.version, self.sequence, self.system_id, COMPONENT_ID)
            .with_context(|| format!("Failed to encode {}", message.name()))?;
        self.sequence = self.sequence.wrapping_add(1);

        if let Err(e) = self.socket.send_to(&frame, self.target).await {
            warn!(error = %e, target = %self.target, "Send failed");
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let period = args.telemetry_period()?;
    let track = args.track()?;

    let target: SocketAddr = tokio::net::lookup_host((args.target.as_str(), args.port))
        .await
        .with_context(|| format!("Failed to resolve {}", args.target))?
        .next()
        .with_context(|| format!("No address for {}", args.target))?;

    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .context("Failed to bind UDP socket")?;

    let mut sender = Sender {
        socket,
        target,
        version: args.wire.into(),
        system_id: args.system_id,
        sequence: 0,
    };

    info!(
        target = %target,
        rate = args.rate,
        wire = ?args.wire,
        system_id = args.system_id,
        "Simulating vehicle"
    );

    let mut telemetry = interval(period);
    telemetry.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut heartbeats = interval(Duration::from_secs(1));
    heartbeats.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let started = Instant::now();
    let deadline = args
        .duration
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .map(|d| started + d);

    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            info!("Duration elapsed");
            break;
        }

        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, stopping");
                break;
            }
            _ = heartbeats.tick() => {
                sender.send(&heartbeat()).await?;
            }
            _ = telemetry.tick() => {
                let elapsed = started.elapsed();
                for message in track.telemetry_at(elapsed) {
                    sender.send(&message).await?;
                }
                let p = track.point_at(elapsed);
                debug!(
                    lat = p.lat,
                    lon = p.lon,
                    alt = p.alt_m,
                    heading = p.heading_deg,
                    "Position sent"
                );
            }
        }
    }

    Ok(())
}
