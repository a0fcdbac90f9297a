//! JSON bodies served by the status API

use chrono::{DateTime, Utc};
use mavtak_bridge::{Counters, FixState, LogEntry, VehiclePosition, VehicleState};
use mavtak_core::BridgeSettings;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub running: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Bridge is accepting and emitting
    pub running: bool,

    /// Crate version
    pub version: String,

    pub started_at: DateTime<Utc>,
    pub uptime_seconds: u64,

    /// Vehicles known to the tracker, in any state
    pub tracked_vehicles: usize,

    pub counters: Counters,

    /// Most recent error text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_at: Option<DateTime<Utc>>,

    /// Latest valid position per vehicle
    pub positions: Vec<VehiclePosition>,

    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleInfo {
    pub uid: String,
    pub callsign: String,
    pub fix_state: FixState,
    #[serde(flatten)]
    pub state: VehicleState,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VehicleList {
    pub vehicles: Vec<VehicleInfo>,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessagesResponse {
    /// Debug log entries, oldest first; reading clears the log
    pub messages: Vec<LogEntry>,
}

/// Body of `PUT /api/v1/config`; omitted fields keep their current value
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigUpdate {
    pub mavlink_port: Option<u16>,
    pub aircraft_name: Option<String>,
    pub cot_ip: Option<String>,
    pub cot_port: Option<u16>,
    pub use_multicast: Option<bool>,
    pub multicast_ttl: Option<u32>,
}

impl ConfigUpdate {
    pub fn apply(&self, settings: &mut BridgeSettings) {
        if let Some(port) = self.mavlink_port {
            settings.mavlink_port = port;
        }
        if let Some(name) = &self.aircraft_name {
            settings.aircraft_name = name.clone();
        }
        if let Some(ip) = &self.cot_ip {
            settings.cot_ip = ip.clone();
        }
        if let Some(port) = self.cot_port {
            settings.cot_port = port;
        }
        if let Some(multicast) = self.use_multicast {
            settings.use_multicast = multicast;
        }
        if let Some(ttl) = self.multicast_ttl {
            settings.multicast_ttl = ttl;
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigUpdateResponse {
    pub restarted: bool,
    /// Listener address after the restart
    pub listen: String,
    pub bridge: BridgeSettings,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopResponse {
    pub stopping: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code
    pub error: String,

    /// Human-readable error message
    pub message: String,

    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}
