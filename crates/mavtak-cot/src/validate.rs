//! Validation for CoT events

use crate::event::{Event, Point};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid latitude: {0} (must be between -90 and 90)")]
    InvalidLatitude(f64),

    #[error("Invalid longitude: {0} (must be between -180 and 180)")]
    InvalidLongitude(f64),

    #[error("Invalid circular error: {0} (must be positive)")]
    InvalidCircularError(f64),

    #[error("Invalid linear error: {0} (must be positive)")]
    InvalidLinearError(f64),

    #[error("Non-finite value in {0}")]
    NonFinite(&'static str),

    #[error("Invalid timestamp order: stale ({0}) must be after start ({1})")]
    InvalidTimestampOrder(String, String),

    #[error("Invalid CoT type format: {0}")]
    InvalidCotType(String),

    #[error("Empty UID")]
    EmptyUid,

    #[error("Empty version")]
    EmptyVersion,
}

/// Validates a CoT Event
pub fn validate_event(event: &Event) -> Result<(), ValidationError> {
    if event.version.is_empty() {
        return Err(ValidationError::EmptyVersion);
    }

    if event.uid.is_empty() {
        return Err(ValidationError::EmptyUid);
    }

    // dash-separated atoms, e.g. "a-f-A"
    if !event.event_type.contains('-') {
        return Err(ValidationError::InvalidCotType(event.event_type.clone()));
    }

    if event.stale <= event.start {
        return Err(ValidationError::InvalidTimestampOrder(
            event.stale.to_rfc3339(),
            event.start.to_rfc3339(),
        ));
    }

    validate_point(&event.point)?;

    if let Some(track) = event.detail.as_ref().and_then(|d| d.track.as_ref()) {
        if !track.course.is_finite() {
            return Err(ValidationError::NonFinite("track.course"));
        }
        if !track.speed.is_finite() {
            return Err(ValidationError::NonFinite("track.speed"));
        }
    }

    if let Some(dir) = event.detail.as_ref().and_then(|d| d.dir) {
        if !dir.is_finite() {
            return Err(ValidationError::NonFinite("__dir"));
        }
    }

    Ok(())
}

/// Validates a Point
pub fn validate_point(point: &Point) -> Result<(), ValidationError> {
    for (name, value) in [
        ("point.lat", point.lat),
        ("point.lon", point.lon),
        ("point.hae", point.hae),
        ("point.ce", point.ce),
        ("point.le", point.le),
    ] {
        if !value.is_finite() {
            return Err(ValidationError::NonFinite(name));
        }
    }

    if !(-90.0..=90.0).contains(&point.lat) {
        return Err(ValidationError::InvalidLatitude(point.lat));
    }

    if !(-180.0..=180.0).contains(&point.lon) {
        return Err(ValidationError::InvalidLongitude(point.lon));
    }

    if point.ce < 0.0 {
        return Err(ValidationError::InvalidCircularError(point.ce));
    }

    if point.le < 0.0 {
        return Err(ValidationError::InvalidLinearError(point.le));
    }

    Ok(())
}
