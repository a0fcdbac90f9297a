//! Minimal MAVLink codec: v1/v2 framing, X.25 checksums, and the handful of
//! messages needed to derive a 3-D position, heading and ground speed.
//!
//! # Example
//!
//! ```rust
//! use mavtak_mavlink::{decode_datagram, MavMessage, MavlinkVersion};
//! use mavtak_mavlink::message::GlobalPositionInt;
//!
//! let fix = GlobalPositionInt {
//!     lat: 473977418,
//!     lon: 85455938,
//!     alt: 500_000,
//!     hdg: u16::MAX,
//!     ..Default::default()
//! };
//! let frame = MavMessage::GlobalPositionInt(fix)
//!     .to_frame(MavlinkVersion::V2, 0, 1, 1)
//!     .unwrap();
//!
//! let decoded = decode_datagram(&frame);
//! assert_eq!(decoded.messages.len(), 1);
//! assert_eq!(decoded.messages[0].header.system_id, 1);
//! ```

pub mod frame;
pub mod message;
pub mod sim;

pub use frame::{FrameError, FrameHeader, MavlinkVersion};
pub use message::{decode_datagram, DatagramDecode, DecodedMessage, MavMessage};
