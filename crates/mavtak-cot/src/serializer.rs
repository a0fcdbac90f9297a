//! XML serialization for CoT messages
//!
//! Numbers are written with fixed precision (lat/lon 7 decimals, hae 2,
//! ce/le 1, course 1, speed 2) and timestamps as `YYYY-MM-DDTHH:MM:SS.mmmZ`,
//! so the same state always produces byte-identical output.

use crate::event::{Contact, Detail, Event, PrecisionLocation, Track};
use chrono::{DateTime, Utc};
use quick_xml::escape::escape;
use std::fmt::{self, Write};

/// CoT timestamp format (UTC, millisecond precision).
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Format a timestamp the way emitted events carry it.
pub fn format_time(time: &DateTime<Utc>) -> String {
    time.format(TIME_FORMAT).to_string()
}

/// Serialize an Event to an XML string
pub fn serialize_event(event: &Event) -> String {
    let mut xml = String::with_capacity(512);
    // fmt::Write for String never returns an error
    let _ = write_event(&mut xml, event);
    xml
}

/// Serialize an Event to the bytes placed in a datagram
pub fn serialize_event_bytes(event: &Event) -> Vec<u8> {
    serialize_event(event).into_bytes()
}

fn write_event(xml: &mut String, event: &Event) -> fmt::Result {
    write!(xml, r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#)?;

    write!(
        xml,
        r#"<event version="{}" uid="{}" type="{}" time="{}" start="{}" stale="{}" how="{}">"#,
        escape(event.version.as_str()),
        escape(event.uid.as_str()),
        escape(event.event_type.as_str()),
        format_time(&event.time),
        format_time(&event.start),
        format_time(&event.stale),
        escape(event.how.as_str()),
    )?;

    write!(
        xml,
        r#"<point lat="{:.7}" lon="{:.7}" hae="{:.2}" ce="{:.1}" le="{:.1}"/>"#,
        event.point.lat, event.point.lon, event.point.hae, event.point.ce, event.point.le
    )?;

    if let Some(ref detail) = event.detail {
        write!(xml, "<detail>")?;
        write_detail(xml, detail)?;
        write!(xml, "</detail>")?;
    }

    write!(xml, "</event>")
}

fn write_detail(xml: &mut String, detail: &Detail) -> fmt::Result {
    if let Some(ref contact) = detail.contact {
        write_contact(xml, contact)?;
    }

    if let Some(ref track) = detail.track {
        write_track(xml, track)?;
    }

    if let Some(ref precision_location) = detail.precision_location {
        write_precision_location(xml, precision_location)?;
    }

    if let Some(dir) = detail.dir {
        write!(xml, "<__dir>{:.1}</__dir>", dir)?;
    }

    if let Some(ref remarks) = detail.remarks {
        write!(xml, "<remarks>{}</remarks>", escape(remarks.as_str()))?;
    }

    Ok(())
}

fn write_contact(xml: &mut String, contact: &Contact) -> fmt::Result {
    write!(
        xml,
        r#"<contact callsign="{}"/>"#,
        escape(contact.callsign.as_str())
    )
}

fn write_track(xml: &mut String, track: &Track) -> fmt::Result {
    write!(
        xml,
        r#"<track course="{:.1}" speed="{:.2}"/>"#,
        track.course, track.speed
    )
}

fn write_precision_location(xml: &mut String, pl: &PrecisionLocation) -> fmt::Result {
    write!(
        xml,
        r#"<precisionlocation geopointsrc="{}" altsrc="{}"/>"#,
        escape(pl.geopointsrc.as_str()),
        escape(pl.altsrc.as_str())
    )
}
