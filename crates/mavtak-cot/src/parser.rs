//! Parser for CoT XML messages

use crate::event::{Contact, Detail, Event, Point, PrecisionLocation, Track};
use chrono::{DateTime, Utc};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::Reader;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("XML parsing error: {0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid datetime format: {0}")]
    InvalidDateTime(String),

    #[error("Invalid number format: {0}")]
    InvalidNumber(String),

    #[error("Invalid event structure: {0}")]
    InvalidStructure(String),
}

/// Parse a CoT message from XML string
pub fn parse_cot(xml: &str) -> Result<Event, ParseError> {
    parse_cot_bytes(xml.as_bytes())
}

/// Parse a CoT message from XML bytes
pub fn parse_cot_bytes(xml: &[u8]) -> Result<Event, ParseError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();

    let mut seen_event = false;
    let mut version = None;
    let mut uid = None;
    let mut event_type = None;
    let mut time = None;
    let mut start = None;
    let mut stale = None;
    let mut how = None;
    let mut point = None;
    let mut detail = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(e)) if e.name().as_ref() == b"remarks" => {
                let text = reader.read_text(e.name())?;
                let text = quick_xml::escape::unescape(&text)
                    .map_err(|e| ParseError::XmlError(quick_xml::Error::Escape(e)))?;
                detail.get_or_insert_with(Detail::default).remarks = Some(text.into_owned());
            }
            Ok(XmlEvent::Start(e)) if e.name().as_ref() == b"__dir" => {
                let text = reader.read_text(e.name())?;
                detail.get_or_insert_with(Detail::default).dir = Some(parse_f64(text.trim())?);
            }
            Ok(XmlEvent::Start(e)) | Ok(XmlEvent::Empty(e)) => match e.name().as_ref() {
                b"event" => {
                    seen_event = true;
                    for attr in e.attributes() {
                        let attr = attr.map_err(|e| {
                            ParseError::XmlError(quick_xml::Error::InvalidAttr(e))
                        })?;
                        match attr.key.as_ref() {
                            b"version" => version = Some(attr_string(&attr)?),
                            b"uid" => uid = Some(attr_string(&attr)?),
                            b"type" => event_type = Some(attr_string(&attr)?),
                            b"time" => time = Some(parse_datetime(&attr_string(&attr)?)?),
                            b"start" => start = Some(parse_datetime(&attr_string(&attr)?)?),
                            b"stale" => stale = Some(parse_datetime(&attr_string(&attr)?)?),
                            b"how" => how = Some(attr_string(&attr)?),
                            _ => {}
                        }
                    }
                }
                b"point" => {
                    if !seen_event {
                        return Err(ParseError::InvalidStructure(
                            "point outside of event".to_string(),
                        ));
                    }
                    point = Some(parse_point(&e)?);
                }
                b"detail" => {
                    detail.get_or_insert_with(Detail::default);
                }
                b"contact" => {
                    detail.get_or_insert_with(Detail::default).contact = Some(parse_contact(&e)?);
                }
                b"track" => {
                    detail.get_or_insert_with(Detail::default).track = Some(parse_track(&e)?);
                }
                b"precisionlocation" => {
                    detail.get_or_insert_with(Detail::default).precision_location =
                        Some(parse_precision_location(&e)?);
                }
                b"remarks" => {
                    detail.get_or_insert_with(Detail::default).remarks = Some(String::new());
                }
                _ => {}
            },
            Ok(XmlEvent::Eof) => break,
            Err(e) => return Err(ParseError::XmlError(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(Event {
        version: version.ok_or_else(|| ParseError::MissingField("version".into()))?,
        uid: uid.ok_or_else(|| ParseError::MissingField("uid".into()))?,
        event_type: event_type.ok_or_else(|| ParseError::MissingField("type".into()))?,
        time: time.ok_or_else(|| ParseError::MissingField("time".into()))?,
        start: start.ok_or_else(|| ParseError::MissingField("start".into()))?,
        stale: stale.ok_or_else(|| ParseError::MissingField("stale".into()))?,
        how: how.ok_or_else(|| ParseError::MissingField("how".into()))?,
        point: point.ok_or_else(|| ParseError::MissingField("point".into()))?,
        detail,
    })
}

fn attr_string(attr: &Attribute<'_>) -> Result<String, ParseError> {
    Ok(attr.unescape_value()?.into_owned())
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, ParseError> {
    s.parse::<DateTime<Utc>>()
        .map_err(|_| ParseError::InvalidDateTime(s.to_string()))
}

fn parse_f64(s: &str) -> Result<f64, ParseError> {
    s.parse::<f64>()
        .map_err(|_| ParseError::InvalidNumber(s.to_string()))
}

fn parse_point(element: &BytesStart<'_>) -> Result<Point, ParseError> {
    let mut lat = None;
    let mut lon = None;
    let mut hae = None;
    let mut ce = None;
    let mut le = None;

    for attr in element.attributes() {
        let attr = attr.map_err(|e| ParseError::XmlError(quick_xml::Error::InvalidAttr(e)))?;
        match attr.key.as_ref() {
            b"lat" => lat = Some(parse_f64(&attr_string(&attr)?)?),
            b"lon" => lon = Some(parse_f64(&attr_string(&attr)?)?),
            b"hae" => hae = Some(parse_f64(&attr_string(&attr)?)?),
            b"ce" => ce = Some(parse_f64(&attr_string(&attr)?)?),
            b"le" => le = Some(parse_f64(&attr_string(&attr)?)?),
            _ => {}
        }
    }

    Ok(Point {
        lat: lat.ok_or_else(|| ParseError::MissingField("lat".into()))?,
        lon: lon.ok_or_else(|| ParseError::MissingField("lon".into()))?,
        hae: hae.unwrap_or(0.0),
        ce: ce.unwrap_or(9999999.0),
        le: le.unwrap_or(9999999.0),
    })
}

fn parse_contact(element: &BytesStart<'_>) -> Result<Contact, ParseError> {
    let mut callsign = None;

    for attr in element.attributes() {
        let attr = attr.map_err(|e| ParseError::XmlError(quick_xml::Error::InvalidAttr(e)))?;
        if attr.key.as_ref() == b"callsign" {
            callsign = Some(attr_string(&attr)?);
        }
    }

    Ok(Contact {
        callsign: callsign.ok_or_else(|| ParseError::MissingField("callsign".into()))?,
    })
}

fn parse_track(element: &BytesStart<'_>) -> Result<Track, ParseError> {
    let mut course = None;
    let mut speed = None;

    for attr in element.attributes() {
        let attr = attr.map_err(|e| ParseError::XmlError(quick_xml::Error::InvalidAttr(e)))?;
        match attr.key.as_ref() {
            b"course" => course = Some(parse_f64(&attr_string(&attr)?)?),
            b"speed" => speed = Some(parse_f64(&attr_string(&attr)?)?),
            _ => {}
        }
    }

    Ok(Track {
        course: course.ok_or_else(|| ParseError::MissingField("track course".into()))?,
        speed: speed.ok_or_else(|| ParseError::MissingField("track speed".into()))?,
    })
}

fn parse_precision_location(element: &BytesStart<'_>) -> Result<PrecisionLocation, ParseError> {
    let mut geopointsrc = None;
    let mut altsrc = None;

    for attr in element.attributes() {
        let attr = attr.map_err(|e| ParseError::XmlError(quick_xml::Error::InvalidAttr(e)))?;
        match attr.key.as_ref() {
            b"geopointsrc" => geopointsrc = Some(attr_string(&attr)?),
            b"altsrc" => altsrc = Some(attr_string(&attr)?),
            _ => {}
        }
    }

    Ok(PrecisionLocation {
        geopointsrc: geopointsrc.ok_or_else(|| ParseError::MissingField("geopointsrc".into()))?,
        altsrc: altsrc.ok_or_else(|| ParseError::MissingField("altsrc".into()))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE_COT: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<event version="2.0" uid="DEFAULT_UAV-1" type="a-f-A-M-F-Q" time="2024-01-15T10:30:00.000Z" start="2024-01-15T10:30:00.000Z" stale="2024-01-15T10:31:00.000Z" how="m-g">
    <point lat="47.3977418" lon="8.5455938" hae="500.00" ce="10.0" le="10.0"/>
    <detail>
        <contact callsign="DEFAULT_UAV"/>
        <track course="90.0" speed="12.50"/>
        <precisionlocation geopointsrc="GPS" altsrc="GPS"/>
        <__dir>90.0</__dir>
        <remarks>Alt: 500.0m &amp; climbing</remarks>
    </detail>
</event>"#;

    #[test]
    fn test_parse_cot() {
        let event = parse_cot(EXAMPLE_COT).expect("Failed to parse CoT");

        assert_eq!(event.version, "2.0");
        assert_eq!(event.uid, "DEFAULT_UAV-1");
        assert_eq!(event.event_type, "a-f-A-M-F-Q");
        assert_eq!(event.how, "m-g");
        assert_eq!(event.point.lat, 47.3977418);
        assert_eq!(event.point.lon, 8.5455938);
        assert_eq!(event.point.hae, 500.0);
        assert_eq!(event.point.ce, 10.0);
        assert!(event.stale > event.start);
    }

    #[test]
    fn test_parse_detail() {
        let event = parse_cot(EXAMPLE_COT).expect("Failed to parse CoT");

        assert_eq!(event.callsign(), Some("DEFAULT_UAV"));
        assert_eq!(event.course(), Some(90.0));
        assert_eq!(event.speed(), Some(12.5));
        assert_eq!(event.dir(), Some(90.0));
        assert_eq!(event.remarks(), Some("Alt: 500.0m & climbing"));

        let detail = event.detail.unwrap();
        assert_eq!(detail.precision_location, Some(PrecisionLocation::gps()));
    }

    #[test]
    fn test_parse_minimal_cot() {
        let minimal_cot = r#"<event version="2.0" uid="test-1" type="a-f-G" time="2024-01-15T10:30:00Z" start="2024-01-15T10:30:00Z" stale="2024-01-15T10:35:00Z" how="m-g">
    <point lat="0.0" lon="0.0" hae="0.0"/>
</event>"#;

        let event = parse_cot(minimal_cot).expect("Failed to parse minimal CoT");
        assert_eq!(event.uid, "test-1");
        assert_eq!(event.point.ce, 9999999.0);
        assert!(event.detail.is_none());
    }

    #[test]
    fn test_parse_escaped_callsign() {
        let xml = r#"<event version="2.0" uid="u&amp;1" type="a-f-A" time="2024-01-15T10:30:00Z" start="2024-01-15T10:30:00Z" stale="2024-01-15T10:35:00Z" how="m-g">
    <point lat="1.0" lon="2.0" hae="3.0"/>
    <detail><contact callsign="A &lt;B&gt;"/></detail>
</event>"#;

        let event = parse_cot(xml).unwrap();
        assert_eq!(event.uid, "u&1");
        assert_eq!(event.callsign(), Some("A <B>"));
    }

    #[test]
    fn test_parse_malformed_cot() {
        let malformed = r#"<event version="2.0">invalid</event>"#;
        assert!(parse_cot(malformed).is_err());

        let bad_number = r#"<event version="2.0" uid="x" type="a-f-A" time="2024-01-15T10:30:00Z" start="2024-01-15T10:30:00Z" stale="2024-01-15T10:35:00Z" how="m-g"><point lat="north" lon="2.0"/></event>"#;
        assert!(matches!(
            parse_cot(bad_number),
            Err(ParseError::InvalidNumber(_))
        ));
    }
}
