//! Per-vehicle state accumulation
//!
//! Fields arrive in separate MAVLink messages; the tracker merges them into
//! one [`VehicleState`] per system id. Values are never interpolated.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mavtak_core::VehicleId;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Altitude sanity window in meters
pub const MIN_ALTITUDE_M: f64 = -1000.0;
pub const MAX_ALTITUDE_M: f64 = 60000.0;

/// One normalized telemetry field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum TelemetryField {
    /// Latitude/longitude in degrees
    Position { lat: f64, lon: f64 },
    /// Altitude MSL in meters
    Altitude { alt: f64 },
    /// Heading in degrees [0, 360]
    Heading { heading: f64 },
    /// Ground speed in m/s
    Speed { speed: f64 },
    /// Liveness only
    Heartbeat,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidFix {
    #[error("latitude {0} outside [-90, 90]")]
    Latitude(f64),
    #[error("longitude {0} outside [-180, 180]")]
    Longitude(f64),
    #[error("altitude {0} m outside [-1000, 60000]")]
    Altitude(f64),
    #[error("heading {0} outside [0, 360]")]
    Heading(f64),
    #[error("speed {0} m/s is negative or not finite")]
    Speed(f64),
}

impl TelemetryField {
    /// Rejects values outside physically plausible ranges
    pub fn check_range(&self) -> Result<(), InvalidFix> {
        match *self {
            TelemetryField::Position { lat, lon } => {
                if !(-90.0..=90.0).contains(&lat) {
                    return Err(InvalidFix::Latitude(lat));
                }
                if !(-180.0..=180.0).contains(&lon) {
                    return Err(InvalidFix::Longitude(lon));
                }
            }
            TelemetryField::Altitude { alt } => {
                if !(MIN_ALTITUDE_M..=MAX_ALTITUDE_M).contains(&alt) {
                    return Err(InvalidFix::Altitude(alt));
                }
            }
            TelemetryField::Heading { heading } => {
                if !(0.0..=360.0).contains(&heading) {
                    return Err(InvalidFix::Heading(heading));
                }
            }
            TelemetryField::Speed { speed } => {
                if !speed.is_finite() || speed < 0.0 {
                    return Err(InvalidFix::Speed(speed));
                }
            }
            TelemetryField::Heartbeat => {}
        }
        Ok(())
    }
}

/// A field update attributed to a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryUpdate {
    pub vehicle_id: VehicleId,
    pub field: TelemetryField,
    pub received_at: DateTime<Utc>,
}

impl TelemetryUpdate {
    pub fn new(vehicle_id: VehicleId, field: TelemetryField, received_at: DateTime<Utc>) -> Self {
        Self {
            vehicle_id,
            field,
            received_at,
        }
    }
}

/// Lifecycle of a tracked vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixState {
    /// Known id, position or altitude still missing
    PartialFix,
    /// Position and altitude known and fresh
    ActiveFix,
    /// No field update within the expiry window
    Stale,
}

/// Latest known state of one vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub vehicle_id: VehicleId,
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
    pub heading: f64,
    pub speed: f64,
    pub have_position: bool,
    pub have_altitude: bool,
    pub have_heading: bool,
    pub have_speed: bool,
    pub last_update_time: Option<DateTime<Utc>>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub updates: u64,
}

impl VehicleState {
    pub fn new(vehicle_id: VehicleId) -> Self {
        Self {
            vehicle_id,
            lat: 0.0,
            lon: 0.0,
            alt: 0.0,
            heading: 0.0,
            speed: 0.0,
            have_position: false,
            have_altitude: false,
            have_heading: false,
            have_speed: false,
            last_update_time: None,
            last_heartbeat: None,
            updates: 0,
        }
    }

    /// Lat/lon and altitude have both been received
    pub fn position_ready(&self) -> bool {
        self.have_position && self.have_altitude
    }

    pub fn fix_state(&self, now: DateTime<Utc>, expiry: Option<Duration>) -> FixState {
        if !self.position_ready() {
            return FixState::PartialFix;
        }

        match (expiry, self.last_update_time) {
            (Some(expiry), Some(last)) => {
                let age = now.signed_duration_since(last);
                match chrono::Duration::from_std(expiry) {
                    Ok(window) if age > window => FixState::Stale,
                    _ => FixState::ActiveFix,
                }
            }
            _ => FixState::ActiveFix,
        }
    }

    fn apply(&mut self, update: &TelemetryUpdate) {
        match update.field {
            TelemetryField::Heartbeat => {
                self.last_heartbeat = Some(update.received_at);
                return;
            }
            TelemetryField::Position { lat, lon } => {
                self.lat = lat;
                self.lon = lon;
                self.have_position = true;
            }
            TelemetryField::Altitude { alt } => {
                self.alt = alt;
                self.have_altitude = true;
            }
            TelemetryField::Heading { heading } => {
                // 360 and 0 are the same bearing
                self.heading = if heading >= 360.0 { 0.0 } else { heading };
                self.have_heading = true;
            }
            TelemetryField::Speed { speed } => {
                self.speed = speed;
                self.have_speed = true;
            }
        }

        self.last_update_time = Some(update.received_at);
        self.updates += 1;
    }
}

/// Concurrent map of vehicle states keyed by system id
#[derive(Debug, Default)]
pub struct StateTracker {
    vehicles: DashMap<VehicleId, VehicleState>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one update, creating the vehicle on first sight.
    ///
    /// Out-of-range values are rejected and leave the state untouched.
    pub fn apply(&self, update: &TelemetryUpdate) -> Result<(), InvalidFix> {
        update.field.check_range()?;

        self.vehicles
            .entry(update.vehicle_id)
            .or_insert_with(|| VehicleState::new(update.vehicle_id))
            .apply(update);

        Ok(())
    }

    pub fn get(&self, vehicle_id: VehicleId) -> Option<VehicleState> {
        self.vehicles.get(&vehicle_id).map(|v| v.clone())
    }

    /// Owned copies of every vehicle, sorted by id
    pub fn snapshot(&self) -> Vec<VehicleState> {
        let mut all: Vec<VehicleState> = self.vehicles.iter().map(|v| v.value().clone()).collect();
        all.sort_by_key(|v| v.vehicle_id);
        all
    }

    /// Vehicles in `ActiveFix`, sorted by id
    pub fn emittable(&self, now: DateTime<Utc>, expiry: Option<Duration>) -> Vec<VehicleState> {
        self.snapshot()
            .into_iter()
            .filter(|v| v.fix_state(now, expiry) == FixState::ActiveFix)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }
}
