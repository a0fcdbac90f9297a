//! Vehicle snapshot to CoT event

use crate::tracker::VehicleState;
use chrono::{DateTime, Utc};
use mavtak_core::{BridgeSettings, VehicleId};
use mavtak_cot::event::HOW_MACHINE_GPS;
use mavtak_cot::{
    validate_event, Contact, Detail, Event, Point, PrecisionLocation, Track, ValidationError,
};
use std::collections::HashMap;
use thiserror::Error;

const COT_VERSION: &str = "2.0";
const CIRCULAR_ERROR_M: f64 = 10.0;
const LINEAR_ERROR_M: f64 = 3.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodeError {
    #[error("vehicle {vehicle_id} has no position fix yet")]
    NotReady { vehicle_id: VehicleId },

    #[error("vehicle {vehicle_id} has a non-finite {field}")]
    NonFinite {
        vehicle_id: VehicleId,
        field: &'static str,
    },

    #[error("vehicle {vehicle_id} produced an invalid event: {source}")]
    Invalid {
        vehicle_id: VehicleId,
        source: ValidationError,
    },
}

/// Builds CoT events from vehicle snapshots.
///
/// Pure: the same state and instant always yield the same event.
#[derive(Debug, Clone)]
pub struct CotEncoder {
    uid_prefix: String,
    aircraft_name: String,
    cot_type: String,
    stale_after: chrono::Duration,
    callsigns: HashMap<VehicleId, String>,
}

impl CotEncoder {
    pub fn new(settings: &BridgeSettings) -> Self {
        let stale_after = chrono::Duration::from_std(settings.stale_after())
            .unwrap_or_else(|_| chrono::Duration::seconds(60));

        Self {
            uid_prefix: uid_prefix(&settings.aircraft_name),
            aircraft_name: settings.aircraft_name.clone(),
            cot_type: settings.cot_type.clone(),
            stale_after,
            callsigns: settings
                .callsigns
                .iter()
                .map(|c| (c.vehicle_id, c.callsign.clone()))
                .collect(),
        }
    }

    /// Stable uid for a vehicle
    pub fn uid_for(&self, vehicle_id: VehicleId) -> String {
        format!("{}-{}", self.uid_prefix, vehicle_id)
    }

    pub fn callsign_for(&self, vehicle_id: VehicleId) -> &str {
        self.callsigns
            .get(&vehicle_id)
            .map(String::as_str)
            .unwrap_or(&self.aircraft_name)
    }

    /// Like [`try_encode`](Self::try_encode), discarding the reason
    pub fn encode(&self, state: &VehicleState, now: DateTime<Utc>) -> Option<Event> {
        self.try_encode(state, now).ok()
    }

    pub fn try_encode(
        &self,
        state: &VehicleState,
        now: DateTime<Utc>,
    ) -> Result<Event, EncodeError> {
        let vehicle_id = state.vehicle_id;
        if !state.position_ready() {
            return Err(EncodeError::NotReady { vehicle_id });
        }

        let event = Event {
            version: COT_VERSION.to_string(),
            uid: self.uid_for(vehicle_id),
            event_type: self.cot_type.clone(),
            time: now,
            start: now,
            stale: now + self.stale_after,
            how: HOW_MACHINE_GPS.to_string(),
            point: Point::with_accuracy(
                state.lat,
                state.lon,
                state.alt,
                CIRCULAR_ERROR_M,
                LINEAR_ERROR_M,
            ),
            detail: Some(Detail {
                contact: Some(Contact {
                    callsign: self.callsign_for(vehicle_id).to_string(),
                }),
                track: Some(Track {
                    course: state.heading,
                    speed: state.speed,
                }),
                precision_location: Some(PrecisionLocation::gps()),
                dir: Some(state.heading),
                remarks: Some(format!(
                    "{} - Altitude: {:.1}m, Heading: {:.1}°",
                    self.callsign_for(vehicle_id),
                    state.alt,
                    state.heading
                )),
            }),
        };

        validate_event(&event).map_err(|source| match source {
            ValidationError::NonFinite(field) => EncodeError::NonFinite { vehicle_id, field },
            source => EncodeError::Invalid { vehicle_id, source },
        })?;

        Ok(event)
    }
}

/// Aircraft name with whitespace runs collapsed to `-`
fn uid_prefix(aircraft_name: &str) -> String {
    aircraft_name.split_whitespace().collect::<Vec<_>>().join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mavtak_core::config::CallsignOverride;
    use mavtak_cot::{parse_cot, serialize_event};

    fn ready_state(id: VehicleId) -> VehicleState {
        let mut state = VehicleState::new(id);
        state.lat = 47.3977418;
        state.lon = 8.5455938;
        state.alt = 500.0;
        state.have_position = true;
        state.have_altitude = true;
        state
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_reference_scenario() {
        let encoder = CotEncoder::new(&BridgeSettings::default());
        let event = encoder.encode(&ready_state(1), now()).unwrap();

        assert_eq!(event.uid, "DEFAULT_UAV-1");
        assert_eq!(event.event_type, "a-f-A-M-F-Q");
        assert_eq!(event.how, "m-g");
        assert_eq!(event.callsign(), Some("DEFAULT_UAV"));
        assert_eq!(event.stale - event.time, chrono::Duration::seconds(60));

        let xml = serialize_event(&event);
        let parsed = parse_cot(&xml).unwrap();
        assert!((parsed.point.lat - 47.3977418).abs() <= 1e-6);
        assert!((parsed.point.lon - 8.5455938).abs() <= 1e-6);
        assert!((parsed.point.hae - 500.0).abs() <= 0.01);
    }

    #[test]
    fn test_not_ready() {
        let encoder = CotEncoder::new(&BridgeSettings::default());
        let mut state = ready_state(3);
        state.have_altitude = false;

        assert_eq!(
            encoder.try_encode(&state, now()),
            Err(EncodeError::NotReady { vehicle_id: 3 })
        );
        assert!(encoder.encode(&VehicleState::new(3), now()).is_none());
    }

    #[test]
    fn test_non_finite_state() {
        let encoder = CotEncoder::new(&BridgeSettings::default());
        let mut state = ready_state(1);
        state.speed = f64::INFINITY;

        assert_eq!(
            encoder.try_encode(&state, now()),
            Err(EncodeError::NonFinite {
                vehicle_id: 1,
                field: "track.speed"
            })
        );
    }

    #[test]
    fn test_uid_and_callsign_overrides() {
        let settings = BridgeSettings {
            aircraft_name: "Scout  Team 1".to_string(),
            callsigns: vec![CallsignOverride {
                vehicle_id: 2,
                callsign: "WINGMAN".to_string(),
            }],
            ..Default::default()
        };
        let encoder = CotEncoder::new(&settings);

        assert_eq!(encoder.uid_for(1), "Scout-Team-1-1");
        assert_eq!(encoder.callsign_for(1), "Scout  Team 1");
        assert_eq!(encoder.callsign_for(2), "WINGMAN");

        let event = encoder.encode(&ready_state(2), now()).unwrap();
        assert_eq!(event.uid, "Scout-Team-1-2");
        assert_eq!(event.callsign(), Some("WINGMAN"));
    }

    #[test]
    fn test_encoding_is_idempotent() {
        let encoder = CotEncoder::new(&BridgeSettings::default());
        let state = ready_state(1);
        let first = serialize_event(&encoder.encode(&state, now()).unwrap());
        let second = serialize_event(&encoder.encode(&state, now()).unwrap());
        assert_eq!(first, second);

        let later = encoder
            .encode(&state, now() + chrono::Duration::seconds(1))
            .unwrap();
        let earlier = encoder.encode(&state, now()).unwrap();
        assert_eq!(later.uid, earlier.uid);
        assert_eq!(later.point, earlier.point);
    }

    #[test]
    fn test_heading_and_speed_in_track() {
        let encoder = CotEncoder::new(&BridgeSettings::default());
        let mut state = ready_state(1);
        state.heading = 123.4;
        state.speed = 17.25;
        state.have_heading = true;
        state.have_speed = true;

        let event = encoder.encode(&state, now()).unwrap();
        assert_eq!(event.course(), Some(123.4));
        assert_eq!(event.speed(), Some(17.25));
        assert_eq!(event.dir(), Some(123.4));
        assert!(serialize_event(&event).contains("<__dir>123.4</__dir>"));
        assert_eq!(
            event.remarks(),
            Some("DEFAULT_UAV - Altitude: 500.0m, Heading: 123.4°")
        );
    }
}
