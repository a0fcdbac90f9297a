use anyhow::{Context, Result};
use clap::Parser;
use mavtak_api::ApiState;
use mavtak_bridge::BridgeController;
use mavtak_core::config::{LogFormat, LoggingConfig};
use mavtak_core::AppConfig;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// mavtak - MAVLink telemetry to Cursor-on-Target bridge
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "MAVTAK_CONFIG")]
    config: Option<PathBuf>,

    /// UDP port to receive MAVLink on
    #[arg(long, env = "MAVTAK_MAVLINK_PORT")]
    mavlink_port: Option<u16>,

    /// Aircraft name used for the CoT uid and callsign
    #[arg(long, env = "MAVTAK_AIRCRAFT_NAME")]
    aircraft_name: Option<String>,

    /// CoT destination address (unicast host or multicast group)
    #[arg(long, env = "MAVTAK_COT_IP")]
    cot_ip: Option<String>,

    /// CoT destination port
    #[arg(long, env = "MAVTAK_COT_PORT")]
    cot_port: Option<u16>,

    /// Send CoT to a multicast group instead of a unicast host
    #[arg(long, env = "MAVTAK_USE_MULTICAST")]
    use_multicast: Option<bool>,

    /// Multicast TTL
    #[arg(long, env = "MAVTAK_MULTICAST_TTL")]
    multicast_ttl: Option<u32>,

    /// Status API bind host
    #[arg(long)]
    api_host: Option<String>,

    /// Status API port
    #[arg(long)]
    api_port: Option<u16>,

    /// Disable the status API
    #[arg(long)]
    no_api: bool,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        let bridge = &mut config.bridge;
        if let Some(port) = self.mavlink_port {
            bridge.mavlink_port = port;
        }
        if let Some(name) = &self.aircraft_name {
            bridge.aircraft_name = name.clone();
        }
        if let Some(ip) = &self.cot_ip {
            bridge.cot_ip = ip.clone();
        }
        if let Some(port) = self.cot_port {
            bridge.cot_port = port;
        }
        if let Some(multicast) = self.use_multicast {
            bridge.use_multicast = multicast;
        }
        if let Some(ttl) = self.multicast_ttl {
            bridge.multicast_ttl = ttl;
        }

        if let Some(host) = &self.api_host {
            config.api.host = host.clone();
        }
        if let Some(port) = self.api_port {
            config.api.port = port;
        }
        if self.no_api {
            config.api.enabled = false;
        }
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    logging.parse_level().context("Invalid logging configuration")?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(logging.file_line)
        .with_line_number(logging.file_line);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration: file, then MAVTAK__* environment, then flags
    let mut config = AppConfig::load(args.config.as_deref()).with_context(|| {
        format!(
            "Failed to load configuration from {}",
            args.config
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "defaults".to_string())
        )
    })?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    init_tracing(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        mavlink_port = config.bridge.mavlink_port,
        aircraft = %config.bridge.aircraft_name,
        "Starting mavtak"
    );

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    // A bind failure ends the process here with a non-zero exit
    let bridge = Arc::new(
        BridgeController::start(config.bridge.clone()).context("Failed to start bridge")?,
    );

    let (api_shutdown_tx, mut api_shutdown_rx) = watch::channel(false);
    let api_state = ApiState::new(Arc::clone(bridge.context()), config.clone())
        .with_controller(Arc::clone(&bridge))
        .with_prometheus(prometheus);
    let stop_requested = Arc::clone(&api_state.stop);

    let api_task = if config.api.enabled {
        let bind_addr = config.api.bind_address();
        Some(tokio::spawn(async move {
            let shutdown = async move {
                let _ = api_shutdown_rx.changed().await;
            };
            if let Err(e) = mavtak_api::serve(&bind_addr, api_state, shutdown).await {
                error!(error = %e, "Status API failed");
            }
        }))
    } else {
        info!("Status API disabled");
        None
    };

    tokio::select! {
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for Ctrl+C");
            }
            info!("Received Ctrl+C, shutting down");
        }
        _ = stop_requested.notified() => {
            info!("Stop requested through API, shutting down");
        }
    }

    bridge.shutdown().await;

    let _ = api_shutdown_tx.send(true);
    if let Some(task) = api_task {
        if let Err(e) = task.await {
            error!(error = %e, "Status API task failed");
        }
    }

    info!("mavtak stopped");
    Ok(())
}
