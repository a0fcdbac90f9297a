//! Cursor on Target (CoT) event model, serializer and parser.
//!
//! The serializer writes events with fixed numeric precision so repeated
//! emissions of an unchanged vehicle are byte-identical; the parser reads
//! them back for verification and tooling.
//!
//! # Example
//!
//! ```rust
//! use mavtak_cot::{parse_cot, serialize_event, Event, Point};
//! use chrono::{Duration, Utc};
//!
//! let now = Utc::now();
//! let event = Event {
//!     version: "2.0".to_string(),
//!     uid: "DEFAULT_UAV-1".to_string(),
//!     event_type: "a-f-A-M-F-Q".to_string(),
//!     time: now,
//!     start: now,
//!     stale: now + Duration::seconds(60),
//!     how: "m-g".to_string(),
//!     point: Point::with_accuracy(47.3977418, 8.5455938, 500.0, 10.0, 10.0),
//!     detail: None,
//! };
//!
//! let xml = serialize_event(&event);
//! let parsed = parse_cot(&xml).expect("round trip");
//! assert_eq!(parsed.uid, "DEFAULT_UAV-1");
//! assert!((parsed.point.lat - 47.3977418).abs() < 1e-6);
//! ```

pub mod event;
pub mod parser;
pub mod serializer;
pub mod validate;

pub use event::{Contact, Detail, Event, Point, PrecisionLocation, Track};
pub use parser::{parse_cot, parse_cot_bytes, ParseError};
pub use serializer::{format_time, serialize_event, serialize_event_bytes};
pub use validate::{validate_event, validate_point, ValidationError};
