//! Synthetic flight track for exercising the bridge without an autopilot

use crate::message::{
    normalize_heading, Attitude, GlobalPositionInt, Heartbeat, MavMessage, VfrHud,
};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::time::Duration;

const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// MAV_TYPE_FIXED_WING
const MAV_TYPE_FIXED_WING: u8 = 1;
/// MAV_AUTOPILOT_GENERIC
const MAV_AUTOPILOT_GENERIC: u8 = 0;
/// MAV_STATE_ACTIVE
const MAV_STATE_ACTIVE: u8 = 4;

/// A closed circle flown at constant speed, clockwise seen from above.
///
/// Altitude oscillates once per lap around `base_alt_m`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircularTrack {
    pub center_lat: f64,
    pub center_lon: f64,
    pub radius_m: f64,
    pub period: Duration,
    pub base_alt_m: f64,
    pub alt_amplitude_m: f64,
}

impl Default for CircularTrack {
    fn default() -> Self {
        Self {
            center_lat: 37.7749,
            center_lon: -122.4194,
            radius_m: 100.0,
            period: Duration::from_secs(60),
            base_alt_m: 100.0,
            alt_amplitude_m: 10.0,
        }
    }
}

/// Vehicle kinematics at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    pub alt_m: f64,
    /// Course over ground, degrees [0, 360)
    pub heading_deg: f64,
    /// North velocity, m/s
    pub vn: f64,
    /// East velocity, m/s
    pub ve: f64,
    /// Vertical velocity (up), m/s
    pub climb: f64,
}

impl TrackPoint {
    pub fn ground_speed(&self) -> f64 {
        self.vn.hypot(self.ve)
    }
}

impl CircularTrack {
    fn angular_rate(&self) -> f64 {
        let period = self.period.as_secs_f64();
        if period > 0.0 {
            TAU / period
        } else {
            0.0
        }
    }

    /// Position after `elapsed` time on the track
    pub fn point_at(&self, elapsed: Duration) -> TrackPoint {
        let omega = self.angular_rate();
        let theta = omega * elapsed.as_secs_f64();

        let north = self.radius_m * theta.cos();
        let east = self.radius_m * theta.sin();
        let meters_per_degree_lon = METERS_PER_DEGREE_LAT * self.center_lat.to_radians().cos();

        let vn = -self.radius_m * omega * theta.sin();
        let ve = self.radius_m * omega * theta.cos();

        TrackPoint {
            lat: self.center_lat + north / METERS_PER_DEGREE_LAT,
            lon: self.center_lon + east / meters_per_degree_lon,
            alt_m: self.base_alt_m + self.alt_amplitude_m * theta.sin(),
            heading_deg: normalize_heading(ve.atan2(vn).to_degrees()),
            vn,
            ve,
            climb: self.alt_amplitude_m * omega * theta.cos(),
        }
    }

    /// GLOBAL_POSITION_INT, ATTITUDE and VFR_HUD describing `elapsed`
    pub fn telemetry_at(&self, elapsed: Duration) -> [MavMessage; 3] {
        let p = self.point_at(elapsed);
        let time_boot_ms = elapsed.as_millis().min(u32::MAX as u128) as u32;

        let position = GlobalPositionInt {
            time_boot_ms,
            lat: (p.lat * 1e7).round() as i32,
            lon: (p.lon * 1e7).round() as i32,
            alt: (p.alt_m * 1000.0).round() as i32,
            relative_alt: ((p.alt_m - self.base_alt_m + self.alt_amplitude_m) * 1000.0).round()
                as i32,
            vx: (p.vn * 100.0).round() as i16,
            vy: (p.ve * 100.0).round() as i16,
            vz: (-p.climb * 100.0).round() as i16,
            hdg: ((p.heading_deg * 100.0).round() as u16) % 36000,
        };

        let yaw = if p.heading_deg > 180.0 {
            p.heading_deg - 360.0
        } else {
            p.heading_deg
        };
        let attitude = Attitude {
            time_boot_ms,
            yaw: yaw.to_radians() as f32,
            yawspeed: self.angular_rate() as f32,
            ..Default::default()
        };

        let hud = VfrHud {
            airspeed: p.ground_speed() as f32,
            groundspeed: p.ground_speed() as f32,
            alt: p.alt_m as f32,
            climb: p.climb as f32,
            heading: p.heading_deg.round() as i16 % 360,
            throttle: 50,
        };

        [
            MavMessage::GlobalPositionInt(position),
            MavMessage::Attitude(attitude),
            MavMessage::VfrHud(hud),
        ]
    }
}

/// HEARTBEAT of an active fixed-wing vehicle
pub fn heartbeat() -> MavMessage {
    MavMessage::Heartbeat(Heartbeat {
        custom_mode: 0,
        mav_type: MAV_TYPE_FIXED_WING,
        autopilot: MAV_AUTOPILOT_GENERIC,
        base_mode: 0,
        system_status: MAV_STATE_ACTIVE,
        mavlink_version: 3,
    })
}
