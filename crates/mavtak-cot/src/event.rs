//! CoT event structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Machine-generated GPS derived position (`how` attribute).
pub const HOW_MACHINE_GPS: &str = "m-g";

/// CoT Event represents a Cursor on Target message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// CoT version (always "2.0" for emitted events)
    pub version: String,
    /// Unique identifier, stable across emissions for one vehicle
    pub uid: String,
    /// CoT type (e.g., "a-f-A-M-F-Q" for friendly UAV)
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event timestamp
    pub time: DateTime<Utc>,
    /// Event start time
    pub start: DateTime<Utc>,
    /// Event stale time (when the event becomes invalid)
    pub stale: DateTime<Utc>,
    /// How the event was generated (e.g., "m-g" for machine GPS)
    pub how: String,
    /// Geographic location and accuracy
    pub point: Point,
    /// Optional structured detail section
    pub detail: Option<Detail>,
}

/// Geographic point with accuracy metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Latitude in decimal degrees (-90 to 90)
    pub lat: f64,
    /// Longitude in decimal degrees (-180 to 180)
    pub lon: f64,
    /// Height above ellipsoid in meters
    pub hae: f64,
    /// Circular error in meters
    pub ce: f64,
    /// Linear error in meters
    pub le: f64,
}

/// Detail section with the elements the bridge emits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Detail {
    /// Contact information
    pub contact: Option<Contact>,
    /// Track information
    pub track: Option<Track>,
    /// Precision location source
    pub precision_location: Option<PrecisionLocation>,
    /// Icon orientation in degrees (`<__dir>`)
    pub dir: Option<f64>,
    /// Free text remarks
    pub remarks: Option<String>,
}

/// Contact information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Callsign for display
    pub callsign: String,
}

/// Track information for moving entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Course in degrees (0-360)
    pub course: f64,
    /// Speed in meters per second
    pub speed: f64,
}

/// Precision location source information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecisionLocation {
    /// Geopoint source (e.g., "GPS", "USER")
    pub geopointsrc: String,
    /// Altitude source (e.g., "GPS", "DTED")
    pub altsrc: String,
}

impl PrecisionLocation {
    /// Both position and altitude from GPS.
    pub fn gps() -> Self {
        Self {
            geopointsrc: "GPS".to_string(),
            altsrc: "GPS".to_string(),
        }
    }
}

impl Event {
    /// Get the callsign from the contact detail, if present
    pub fn callsign(&self) -> Option<&str> {
        self.detail
            .as_ref()
            .and_then(|d| d.contact.as_ref())
            .map(|c| c.callsign.as_str())
    }

    /// Get the speed from the track detail, if present
    pub fn speed(&self) -> Option<f64> {
        self.detail
            .as_ref()
            .and_then(|d| d.track.as_ref())
            .map(|t| t.speed)
    }

    /// Get the course from the track detail, if present
    pub fn course(&self) -> Option<f64> {
        self.detail
            .as_ref()
            .and_then(|d| d.track.as_ref())
            .map(|t| t.course)
    }

    /// Get the icon orientation, if present
    pub fn dir(&self) -> Option<f64> {
        self.detail.as_ref().and_then(|d| d.dir)
    }

    /// Get the remarks text, if present
    pub fn remarks(&self) -> Option<&str> {
        self.detail.as_ref().and_then(|d| d.remarks.as_deref())
    }
}

impl Point {
    /// Create a new Point with specified accuracy
    pub fn with_accuracy(lat: f64, lon: f64, hae: f64, ce: f64, le: f64) -> Self {
        Self {
            lat,
            lon,
            hae,
            ce,
            le,
        }
    }
}
