//! Configuration management for the mavtak bridge.
//!
//! This module provides:
//! - Loading from YAML files
//! - Environment variable overrides (`MAVTAK__BRIDGE__COT_PORT=8087`)
//! - Validation of all settings
//!
//! The six fields the presentation layer reads and edits
//! (`mavlink_port`, `aircraft_name`, `cot_ip`, `cot_port`, `use_multicast`,
//! `multicast_ttl`) live flat in [`BridgeSettings`].

use crate::error::{ConfigError, Result};
use crate::types::{DestinationConfig, DestinationMode, VehicleId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Main application configuration.
///
/// # Examples
///
/// ```no_run
/// use mavtak_core::config::AppConfig;
///
/// let config = AppConfig::from_file("mavtak.yaml").unwrap();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Telemetry intake and CoT output settings
    #[serde(default)]
    pub bridge: BridgeSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Status API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

impl AppConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path.display().to_string()).into());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_yaml(&contents)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Loads configuration using the `config` crate: an optional YAML file,
    /// then `MAVTAK__*` environment variables on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        let origin = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::file_not_found(path.display().to_string()).into());
                }
                builder = builder.add_source(config::File::from(path).required(true));
                path.display().to_string()
            }
            None => "<environment>".to_string(),
        };

        let config = builder
            .add_source(
                config::Environment::with_prefix("MAVTAK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::LoadFailed {
                path: origin,
                reason: e.to_string(),
            })?;

        config.try_deserialize().map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Validates the configuration.
    ///
    /// Checks ports, TTL range, timing values, the CoT type string, and
    /// every destination (including duplicate names).
    pub fn validate(&self) -> Result<()> {
        self.bridge.validate()?;
        self.logging.parse_level()?;
        self.api.validate()?;
        Ok(())
    }
}

/// Per-vehicle callsign override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallsignOverride {
    /// MAVLink system id
    pub vehicle_id: VehicleId,
    /// Callsign shown by CoT clients
    pub callsign: String,
}

/// Bridge settings: MAVLink intake, CoT synthesis and output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// UDP port the MAVLink listener binds (0 = ephemeral)
    #[serde(default = "default_mavlink_port")]
    pub mavlink_port: u16,

    /// Local address the MAVLink listener binds
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Aircraft name, used for the CoT uid and default callsign
    #[serde(default = "default_aircraft_name")]
    pub aircraft_name: String,

    /// Primary CoT destination address (unicast host or multicast group)
    #[serde(default = "default_cot_ip")]
    pub cot_ip: String,

    /// Primary CoT destination port
    #[serde(default = "default_cot_port")]
    pub cot_port: u16,

    /// Whether the primary destination is a multicast group
    #[serde(default = "default_true")]
    pub use_multicast: bool,

    /// Multicast TTL for the primary destination
    #[serde(default = "default_multicast_ttl")]
    pub multicast_ttl: u32,

    /// CoT type code for emitted events
    #[serde(default = "default_cot_type")]
    pub cot_type: String,

    /// Seconds between event time and stale time
    #[serde(default = "default_stale_secs")]
    pub stale_secs: u64,

    /// Emission interval in milliseconds
    #[serde(default = "default_emit_interval_ms")]
    pub emit_interval_ms: u64,

    /// Vehicles without updates for this long are not emitted (None disables)
    #[serde(default = "default_vehicle_expiry_secs")]
    pub vehicle_expiry_secs: Option<u64>,

    /// Listener receive timeout in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Per-destination send timeout in milliseconds
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Grace period for in-flight work at shutdown
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Callsign overrides by vehicle id
    #[serde(default)]
    pub callsigns: Vec<CallsignOverride>,

    /// Destinations in addition to the primary one
    #[serde(default)]
    pub extra_destinations: Vec<DestinationConfig>,
}

fn default_mavlink_port() -> u16 {
    14550
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_aircraft_name() -> String {
    "DEFAULT_UAV".to_string()
}

fn default_cot_ip() -> String {
    "239.2.3.1".to_string()
}

fn default_cot_port() -> u16 {
    6969
}

fn default_true() -> bool {
    true
}

fn default_multicast_ttl() -> u32 {
    1
}

fn default_cot_type() -> String {
    "a-f-A-M-F-Q".to_string()
}

fn default_stale_secs() -> u64 {
    60
}

fn default_emit_interval_ms() -> u64 {
    1000
}

fn default_vehicle_expiry_secs() -> Option<u64> {
    Some(30)
}

fn default_read_timeout_ms() -> u64 {
    1000
}

fn default_send_timeout_ms() -> u64 {
    500
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            mavlink_port: default_mavlink_port(),
            bind_address: default_bind_address(),
            aircraft_name: default_aircraft_name(),
            cot_ip: default_cot_ip(),
            cot_port: default_cot_port(),
            use_multicast: true,
            multicast_ttl: default_multicast_ttl(),
            cot_type: default_cot_type(),
            stale_secs: default_stale_secs(),
            emit_interval_ms: default_emit_interval_ms(),
            vehicle_expiry_secs: default_vehicle_expiry_secs(),
            read_timeout_ms: default_read_timeout_ms(),
            send_timeout_ms: default_send_timeout_ms(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            callsigns: Vec::new(),
            extra_destinations: Vec::new(),
        }
    }
}

impl BridgeSettings {
    /// The destination described by `cot_ip`/`cot_port`/`use_multicast`.
    pub fn primary_destination(&self) -> DestinationConfig {
        let mode = if self.use_multicast {
            DestinationMode::Multicast
        } else {
            DestinationMode::Unicast
        };

        DestinationConfig {
            name: "primary".to_string(),
            mode,
            address: self.cot_ip.clone(),
            port: self.cot_port,
            ttl: self.multicast_ttl,
        }
    }

    /// All active destinations, primary first.
    pub fn destinations(&self) -> Vec<DestinationConfig> {
        let mut all = Vec::with_capacity(1 + self.extra_destinations.len());
        all.push(self.primary_destination());
        all.extend(self.extra_destinations.iter().cloned());
        all
    }

    /// Listener bind address as `host:port`.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.mavlink_port)
    }

    /// Callsign override for a vehicle, if configured.
    pub fn callsign_for(&self, vehicle_id: VehicleId) -> Option<&str> {
        self.callsigns
            .iter()
            .find(|c| c.vehicle_id == vehicle_id)
            .map(|c| c.callsign.as_str())
    }

    pub fn emit_interval(&self) -> Duration {
        Duration::from_millis(self.emit_interval_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_secs)
    }

    pub fn vehicle_expiry(&self) -> Option<Duration> {
        self.vehicle_expiry_secs.map(Duration::from_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Validates the bridge settings.
    pub fn validate(&self) -> Result<()> {
        if self.bind_address.parse::<IpAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "bridge.bind_address",
                format!("not an IP address: {}", self.bind_address),
            )
            .into());
        }

        if self.aircraft_name.trim().is_empty() {
            return Err(
                ConfigError::invalid_value("bridge.aircraft_name", "cannot be empty").into(),
            );
        }

        // CoT types are dash separated atoms, e.g. "a-f-A"
        if self.cot_type.split('-').filter(|p| !p.is_empty()).count() < 2 {
            return Err(ConfigError::invalid_value(
                "bridge.cot_type",
                format!("malformed CoT type: {}", self.cot_type),
            )
            .into());
        }

        if self.stale_secs == 0 {
            return Err(ConfigError::invalid_value("bridge.stale_secs", "must be > 0").into());
        }

        if self.emit_interval_ms == 0 {
            return Err(
                ConfigError::invalid_value("bridge.emit_interval_ms", "must be > 0").into(),
            );
        }

        if self.read_timeout_ms == 0 {
            return Err(
                ConfigError::invalid_value("bridge.read_timeout_ms", "must be > 0").into(),
            );
        }

        if self.send_timeout_ms == 0 {
            return Err(
                ConfigError::invalid_value("bridge.send_timeout_ms", "must be > 0").into(),
            );
        }

        if self.vehicle_expiry_secs == Some(0) {
            return Err(ConfigError::invalid_value(
                "bridge.vehicle_expiry_secs",
                "must be > 0 (use null to disable)",
            )
            .into());
        }

        let mut seen_names = HashSet::new();
        for dest in self.destinations() {
            if !seen_names.insert(dest.name.clone()) {
                return Err(ConfigError::DuplicateDestination { name: dest.name }.into());
            }

            dest.validate()
                .map_err(|reason| ConfigError::InvalidDestination {
                    destination: dest.name.clone(),
                    reason,
                })?;
        }

        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (overridden by RUST_LOG when set)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// Whether to include file/line info
    #[serde(default)]
    pub file_line: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
            file_line: false,
        }
    }
}

impl LoggingConfig {
    /// Parses the log level string to a tracing Level.
    pub fn parse_level(&self) -> Result<Level> {
        self.level.parse().map_err(|_| {
            ConfigError::InvalidValue {
                field: "logging.level".to_string(),
                reason: format!("Invalid log level: {}", self.level),
            }
            .into()
        })
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON format for structured logging
    Json,
}

/// Status API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Whether the status API is served
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// API bind host
    #[serde(default = "default_api_host")]
    pub host: String,

    /// API port
    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}

impl ApiConfig {
    /// Validates the API configuration.
    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "api.port".to_string(),
                reason: "Port cannot be 0".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Returns the API server bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
