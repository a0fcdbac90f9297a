//! The MAVLink messages needed to derive position, heading and speed
//!
//! Fields are listed in wire order (MAVLink sorts them by type size), all
//! little-endian.

use crate::frame::{encode_frame, parse_frame, FrameError, FrameHeader, MavlinkVersion, RawFrame};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// `hdg` value meaning "heading unknown"
pub const HEADING_UNKNOWN: u16 = u16::MAX;

/// Payload codec for one message type
pub trait MessageData: Sized {
    const ID: u32;
    const NAME: &'static str;
    const CRC_EXTRA: u8;
    const ENCODED_LEN: usize;

    /// Reads a payload of exactly `ENCODED_LEN` bytes
    fn read(buf: &mut &[u8]) -> Self;

    fn write(&self, buf: &mut BytesMut);

    /// Decodes a payload, zero-extending truncated MAVLink 2 payloads.
    /// Bytes past `ENCODED_LEN` belong to extension fields and are ignored.
    fn decode(payload: &[u8]) -> Self {
        let mut padded = [0u8; 255];
        let n = payload.len().min(Self::ENCODED_LEN);
        padded[..n].copy_from_slice(&payload[..n]);
        let mut slice = &padded[..Self::ENCODED_LEN];
        Self::read(&mut slice)
    }

    fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::ENCODED_LEN);
        self.write(&mut buf);
        buf.freeze()
    }
}

/// HEARTBEAT (#0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Heartbeat {
    pub custom_mode: u32,
    pub mav_type: u8,
    pub autopilot: u8,
    pub base_mode: u8,
    pub system_status: u8,
    pub mavlink_version: u8,
}

impl MessageData for Heartbeat {
    const ID: u32 = 0;
    const NAME: &'static str = "HEARTBEAT";
    const CRC_EXTRA: u8 = 50;
    const ENCODED_LEN: usize = 9;

    fn read(buf: &mut &[u8]) -> Self {
        Self {
            custom_mode: buf.get_u32_le(),
            mav_type: buf.get_u8(),
            autopilot: buf.get_u8(),
            base_mode: buf.get_u8(),
            system_status: buf.get_u8(),
            mavlink_version: buf.get_u8(),
        }
    }

    fn write(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.custom_mode);
        buf.put_u8(self.mav_type);
        buf.put_u8(self.autopilot);
        buf.put_u8(self.base_mode);
        buf.put_u8(self.system_status);
        buf.put_u8(self.mavlink_version);
    }
}

/// ATTITUDE (#30). Angles in radians, rates in rad/s.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Attitude {
    pub time_boot_ms: u32,
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub rollspeed: f32,
    pub pitchspeed: f32,
    pub yawspeed: f32,
}

impl Attitude {
    /// Yaw as a compass heading in [0, 360)
    pub fn heading_deg(&self) -> f64 {
        normalize_heading((self.yaw as f64).to_degrees())
    }
}

impl MessageData for Attitude {
    const ID: u32 = 30;
    const NAME: &'static str = "ATTITUDE";
    const CRC_EXTRA: u8 = 39;
    const ENCODED_LEN: usize = 28;

    fn read(buf: &mut &[u8]) -> Self {
        Self {
            time_boot_ms: buf.get_u32_le(),
            roll: buf.get_f32_le(),
            pitch: buf.get_f32_le(),
            yaw: buf.get_f32_le(),
            rollspeed: buf.get_f32_le(),
            pitchspeed: buf.get_f32_le(),
            yawspeed: buf.get_f32_le(),
        }
    }

    fn write(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.time_boot_ms);
        buf.put_f32_le(self.roll);
        buf.put_f32_le(self.pitch);
        buf.put_f32_le(self.yaw);
        buf.put_f32_le(self.rollspeed);
        buf.put_f32_le(self.pitchspeed);
        buf.put_f32_le(self.yawspeed);
    }
}

/// GLOBAL_POSITION_INT (#33)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GlobalPositionInt {
    pub time_boot_ms: u32,
    /// Latitude, degrees * 1e7
    pub lat: i32,
    /// Longitude, degrees * 1e7
    pub lon: i32,
    /// Altitude MSL, millimeters
    pub alt: i32,
    /// Altitude above home, millimeters
    pub relative_alt: i32,
    /// Ground X speed (north), cm/s
    pub vx: i16,
    /// Ground Y speed (east), cm/s
    pub vy: i16,
    /// Ground Z speed (down), cm/s
    pub vz: i16,
    /// Heading, centidegrees; 65535 when unknown
    pub hdg: u16,
}

impl GlobalPositionInt {
    pub fn lat_deg(&self) -> f64 {
        self.lat as f64 / 1e7
    }

    pub fn lon_deg(&self) -> f64 {
        self.lon as f64 / 1e7
    }

    pub fn alt_m(&self) -> f64 {
        self.alt as f64 / 1000.0
    }

    pub fn heading_deg(&self) -> Option<f64> {
        (self.hdg != HEADING_UNKNOWN).then(|| self.hdg as f64 / 100.0)
    }

    /// Horizontal ground speed in m/s
    pub fn ground_speed(&self) -> f64 {
        let vx = self.vx as f64;
        let vy = self.vy as f64;
        vx.hypot(vy) / 100.0
    }
}

impl MessageData for GlobalPositionInt {
    const ID: u32 = 33;
    const NAME: &'static str = "GLOBAL_POSITION_INT";
    const CRC_EXTRA: u8 = 104;
    const ENCODED_LEN: usize = 28;

    fn read(buf: &mut &[u8]) -> Self {
        Self {
            time_boot_ms: buf.get_u32_le(),
            lat: buf.get_i32_le(),
            lon: buf.get_i32_le(),
            alt: buf.get_i32_le(),
            relative_alt: buf.get_i32_le(),
            vx: buf.get_i16_le(),
            vy: buf.get_i16_le(),
            vz: buf.get_i16_le(),
            hdg: buf.get_u16_le(),
        }
    }

    fn write(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.time_boot_ms);
        buf.put_i32_le(self.lat);
        buf.put_i32_le(self.lon);
        buf.put_i32_le(self.alt);
        buf.put_i32_le(self.relative_alt);
        buf.put_i16_le(self.vx);
        buf.put_i16_le(self.vy);
        buf.put_i16_le(self.vz);
        buf.put_u16_le(self.hdg);
    }
}

/// VFR_HUD (#74)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VfrHud {
    pub airspeed: f32,
    /// m/s
    pub groundspeed: f32,
    pub alt: f32,
    pub climb: f32,
    /// Compass heading, degrees
    pub heading: i16,
    /// Percent
    pub throttle: u16,
}

impl MessageData for VfrHud {
    const ID: u32 = 74;
    const NAME: &'static str = "VFR_HUD";
    const CRC_EXTRA: u8 = 20;
    const ENCODED_LEN: usize = 20;

    fn read(buf: &mut &[u8]) -> Self {
        Self {
            airspeed: buf.get_f32_le(),
            groundspeed: buf.get_f32_le(),
            alt: buf.get_f32_le(),
            climb: buf.get_f32_le(),
            heading: buf.get_i16_le(),
            throttle: buf.get_u16_le(),
        }
    }

    fn write(&self, buf: &mut BytesMut) {
        buf.put_f32_le(self.airspeed);
        buf.put_f32_le(self.groundspeed);
        buf.put_f32_le(self.alt);
        buf.put_f32_le(self.climb);
        buf.put_i16_le(self.heading);
        buf.put_u16_le(self.throttle);
    }
}

/// A decoded message of the supported subset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message", content = "fields")]
pub enum MavMessage {
    Heartbeat(Heartbeat),
    Attitude(Attitude),
    GlobalPositionInt(GlobalPositionInt),
    VfrHud(VfrHud),
}

impl MavMessage {
    /// CRC_EXTRA for a supported message id
    pub fn crc_extra(message_id: u32) -> Option<u8> {
        match message_id {
            Heartbeat::ID => Some(Heartbeat::CRC_EXTRA),
            Attitude::ID => Some(Attitude::CRC_EXTRA),
            GlobalPositionInt::ID => Some(GlobalPositionInt::CRC_EXTRA),
            VfrHud::ID => Some(VfrHud::CRC_EXTRA),
            _ => None,
        }
    }

    fn encoded_len(message_id: u32) -> Option<usize> {
        match message_id {
            Heartbeat::ID => Some(Heartbeat::ENCODED_LEN),
            Attitude::ID => Some(Attitude::ENCODED_LEN),
            GlobalPositionInt::ID => Some(GlobalPositionInt::ENCODED_LEN),
            VfrHud::ID => Some(VfrHud::ENCODED_LEN),
            _ => None,
        }
    }

    pub fn message_id(&self) -> u32 {
        match self {
            MavMessage::Heartbeat(_) => Heartbeat::ID,
            MavMessage::Attitude(_) => Attitude::ID,
            MavMessage::GlobalPositionInt(_) => GlobalPositionInt::ID,
            MavMessage::VfrHud(_) => VfrHud::ID,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MavMessage::Heartbeat(_) => Heartbeat::NAME,
            MavMessage::Attitude(_) => Attitude::NAME,
            MavMessage::GlobalPositionInt(_) => GlobalPositionInt::NAME,
            MavMessage::VfrHud(_) => VfrHud::NAME,
        }
    }

    /// Decodes and checks a frame.
    ///
    /// `Ok(None)` means the message id is outside the supported subset.
    pub fn from_frame(frame: &RawFrame) -> Result<Option<Self>, FrameError> {
        let id = frame.header.message_id;
        let (Some(crc_extra), Some(expected_len)) = (Self::crc_extra(id), Self::encoded_len(id))
        else {
            return Ok(None);
        };

        frame.verify(crc_extra)?;

        // v1 has no truncation: the payload length is fixed per message
        if frame.header.version == MavlinkVersion::V1 && frame.payload.len() != expected_len {
            return Err(FrameError::PayloadLength {
                message_id: id,
                expected: expected_len,
                actual: frame.payload.len(),
            });
        }

        let payload = &frame.payload[..];
        let message = match id {
            Heartbeat::ID => MavMessage::Heartbeat(Heartbeat::decode(payload)),
            Attitude::ID => MavMessage::Attitude(Attitude::decode(payload)),
            GlobalPositionInt::ID => {
                MavMessage::GlobalPositionInt(GlobalPositionInt::decode(payload))
            }
            VfrHud::ID => MavMessage::VfrHud(VfrHud::decode(payload)),
            _ => return Ok(None),
        };

        Ok(Some(message))
    }

    pub fn payload(&self) -> Bytes {
        match self {
            MavMessage::Heartbeat(m) => m.encode(),
            MavMessage::Attitude(m) => m.encode(),
            MavMessage::GlobalPositionInt(m) => m.encode(),
            MavMessage::VfrHud(m) => m.encode(),
        }
    }

    /// Serializes the message into a complete frame
    pub fn to_frame(
        &self,
        version: MavlinkVersion,
        sequence: u8,
        system_id: u8,
        component_id: u8,
    ) -> Result<Bytes, FrameError> {
        let message_id = self.message_id();
        let header = FrameHeader {
            version,
            sequence,
            system_id,
            component_id,
            message_id,
            incompat_flags: 0,
            compat_flags: 0,
        };
        // crc_extra is always known for our own variants
        let crc_extra = Self::crc_extra(message_id).unwrap_or_default();
        encode_frame(&header, &self.payload(), crc_extra)
    }
}

/// A message together with the header it arrived in
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    pub header: FrameHeader,
    pub message: MavMessage,
}

/// Result of decoding one datagram
#[derive(Debug, Default)]
pub struct DatagramDecode {
    /// Supported messages, in datagram order
    pub messages: Vec<DecodedMessage>,
    /// Valid frames carrying unsupported message ids
    pub ignored: usize,
    /// Set when a malformed frame ended decoding; later bytes were dropped
    pub error: Option<FrameError>,
}

/// Decodes every frame packed into a datagram.
///
/// Decoding stops at the first malformed frame; messages decoded before it
/// are kept.
pub fn decode_datagram(datagram: &[u8]) -> DatagramDecode {
    let mut result = DatagramDecode::default();
    let mut rest = datagram;

    while !rest.is_empty() {
        let (frame, consumed) = match parse_frame(rest) {
            Ok(parsed) => parsed,
            Err(e) => {
                result.error = Some(e);
                break;
            }
        };

        match MavMessage::from_frame(&frame) {
            Ok(Some(message)) => result.messages.push(DecodedMessage {
                header: frame.header,
                message,
            }),
            Ok(None) => result.ignored += 1,
            Err(e) => {
                result.error = Some(e);
                break;
            }
        }

        rest = &rest[consumed..];
    }

    result
}

/// Normalizes an angle in degrees to [0, 360)
pub fn normalize_heading(degrees: f64) -> f64 {
    let h = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if h >= 360.0 {
        0.0
    } else {
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position() -> GlobalPositionInt {
        GlobalPositionInt {
            time_boot_ms: 1000,
            lat: 473977418,
            lon: 85455938,
            alt: 500000,
            relative_alt: 50000,
            vx: 300,
            vy: 400,
            vz: 0,
            hdg: 9000,
        }
    }

    #[test]
    fn test_position_scaling() {
        let p = position();
        assert!((p.lat_deg() - 47.3977418).abs() < 1e-9);
        assert!((p.lon_deg() - 8.5455938).abs() < 1e-9);
        assert!((p.alt_m() - 500.0).abs() < 1e-9);
        assert_eq!(p.heading_deg(), Some(90.0));
        assert!((p.ground_speed() - 5.0).abs() < 1e-9);

        let unknown = GlobalPositionInt {
            hdg: HEADING_UNKNOWN,
            ..p
        };
        assert_eq!(unknown.heading_deg(), None);
    }

    #[test]
    fn test_reference_position_frame() {
        // GLOBAL_POSITION_INT v1, seq 7, sys 1, comp 1
        let bytes: [u8; 36] = [
            0xFE, 0x1C, 0x07, 0x01, 0x01, 0x21, 0xE8, 0x03, 0x00, 0x00, 0x4A, 0x52, 0x40, 0x1C,
            0x42, 0xF4, 0x17, 0x05, 0x20, 0xA1, 0x07, 0x00, 0x50, 0xC3, 0x00, 0x00, 0x2C, 0x01,
            0x90, 0x01, 0x00, 0x00, 0x28, 0x23, 0x68, 0x72,
        ];

        let decoded = decode_datagram(&bytes);
        assert!(decoded.error.is_none());
        assert_eq!(decoded.messages.len(), 1);
        assert_eq!(decoded.messages[0].header.sequence, 7);
        assert_eq!(
            decoded.messages[0].message,
            MavMessage::GlobalPositionInt(position())
        );

        let encoded = MavMessage::GlobalPositionInt(position())
            .to_frame(MavlinkVersion::V1, 7, 1, 1)
            .unwrap();
        assert_eq!(&encoded[..], &bytes[..]);
    }

    #[test]
    fn test_v2_truncated_payload_is_zero_extended() {
        let hb = Heartbeat {
            custom_mode: 0,
            mav_type: 1,
            autopilot: 0,
            base_mode: 0,
            system_status: 0,
            mavlink_version: 0,
        };
        let frame = MavMessage::Heartbeat(hb)
            .to_frame(MavlinkVersion::V2, 0, 3, 1)
            .unwrap();
        // only the first five bytes survive truncation
        assert_eq!(frame[1], 5);

        let decoded = decode_datagram(&frame);
        assert_eq!(decoded.messages.len(), 1);
        assert_eq!(decoded.messages[0].header.system_id, 3);
        assert_eq!(decoded.messages[0].message, MavMessage::Heartbeat(hb));
    }

    #[test]
    fn test_multiple_frames_in_one_datagram() {
        let mut datagram = Vec::new();
        datagram.extend_from_slice(
            &MavMessage::Heartbeat(Heartbeat::default())
                .to_frame(MavlinkVersion::V1, 0, 1, 1)
                .unwrap(),
        );
        datagram.extend_from_slice(
            &MavMessage::GlobalPositionInt(position())
                .to_frame(MavlinkVersion::V2, 1, 1, 1)
                .unwrap(),
        );
        datagram.extend_from_slice(
            &MavMessage::VfrHud(VfrHud {
                groundspeed: 12.5,
                heading: 270,
                ..Default::default()
            })
            .to_frame(MavlinkVersion::V2, 2, 1, 1)
            .unwrap(),
        );

        let decoded = decode_datagram(&datagram);
        assert!(decoded.error.is_none());
        let names: Vec<_> = decoded.messages.iter().map(|m| m.message.name()).collect();
        assert_eq!(names, ["HEARTBEAT", "GLOBAL_POSITION_INT", "VFR_HUD"]);
    }

    #[test]
    fn test_unknown_message_is_ignored() {
        let header = FrameHeader {
            version: MavlinkVersion::V2,
            sequence: 0,
            system_id: 1,
            component_id: 1,
            message_id: 24, // GPS_RAW_INT
            incompat_flags: 0,
            compat_flags: 0,
        };
        let unknown = encode_frame(&header, &[1u8; 30], 24).unwrap();

        let decoded = decode_datagram(&unknown);
        assert!(decoded.messages.is_empty());
        assert_eq!(decoded.ignored, 1);
        assert!(decoded.error.is_none());
    }

    #[test]
    fn test_malformed_frame_stops_datagram() {
        let mut datagram = MavMessage::Heartbeat(Heartbeat::default())
            .to_frame(MavlinkVersion::V1, 0, 1, 1)
            .unwrap()
            .to_vec();
        let mut second = MavMessage::GlobalPositionInt(position())
            .to_frame(MavlinkVersion::V1, 1, 1, 1)
            .unwrap()
            .to_vec();
        let last = second.len() - 1;
        second[last] ^= 0x01;
        datagram.extend_from_slice(&second);
        datagram.extend_from_slice(
            &MavMessage::Heartbeat(Heartbeat::default())
                .to_frame(MavlinkVersion::V1, 2, 1, 1)
                .unwrap(),
        );

        let decoded = decode_datagram(&datagram);
        assert_eq!(decoded.messages.len(), 1);
        assert!(matches!(
            decoded.error,
            Some(FrameError::ChecksumMismatch { message_id: 33, .. })
        ));
    }

    #[test]
    fn test_v1_wrong_payload_length() {
        let header = FrameHeader {
            version: MavlinkVersion::V1,
            sequence: 0,
            system_id: 1,
            component_id: 1,
            message_id: Heartbeat::ID,
            incompat_flags: 0,
            compat_flags: 0,
        };
        let short = encode_frame(&header, &[0u8; 5], Heartbeat::CRC_EXTRA).unwrap();
        let decoded = decode_datagram(&short);
        assert!(matches!(
            decoded.error,
            Some(FrameError::PayloadLength { expected: 9, actual: 5, .. })
        ));
    }

    #[test]
    fn test_attitude_heading() {
        let att = Attitude {
            yaw: -std::f32::consts::FRAC_PI_2,
            ..Default::default()
        };
        assert!((att.heading_deg() - 270.0).abs() < 1e-4);
        assert_eq!(normalize_heading(360.0), 0.0);
        assert_eq!(normalize_heading(-0.0), 0.0);
    }
}
