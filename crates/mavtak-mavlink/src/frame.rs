//! MAVLink v1/v2 frame codec
//!
//! Wire layouts:
//!
//! ```text
//! v1: [0xFE][len][seq][sysid][compid][msgid][payload][crc lo][crc hi]
//! v2: [0xFD][len][incompat][compat][seq][sysid][compid][msgid x3 LE][payload][crc lo][crc hi][signature x13]?
//! ```
//!
//! The checksum is CRC-16/MCRF4XX (MAVLink's "X.25") over every byte after
//! the start marker up to the end of the payload, followed by the message's
//! CRC_EXTRA seed byte.

use bytes::{BufMut, Bytes, BytesMut};
use crc::{Crc, CRC_16_MCRF4XX};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Start marker of a MAVLink 1 frame
pub const MAVLINK_V1_STX: u8 = 0xFE;
/// Start marker of a MAVLink 2 frame
pub const MAVLINK_V2_STX: u8 = 0xFD;
/// v2 incompatibility flag: frame carries a 13-byte signature
pub const INCOMPAT_FLAG_SIGNED: u8 = 0x01;

const V1_HEADER_LEN: usize = 6;
const V2_HEADER_LEN: usize = 10;
const CHECKSUM_LEN: usize = 2;
const SIGNATURE_LEN: usize = 13;

const X25: Crc<u16> = Crc::<u16>::new(&CRC_16_MCRF4XX);

/// Protocol version of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MavlinkVersion {
    V1,
    V2,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Invalid start marker 0x{0:02X}")]
    InvalidStartMarker(u8),

    #[error("Truncated frame: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Unsupported incompatibility flags 0x{0:02X}")]
    UnsupportedIncompatFlags(u8),

    #[error("Checksum mismatch for message {message_id}: expected 0x{expected:04X}, got 0x{actual:04X}")]
    ChecksumMismatch {
        message_id: u32,
        expected: u16,
        actual: u16,
    },

    #[error("Payload length {actual} invalid for message {message_id} (expected {expected})")]
    PayloadLength {
        message_id: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Message id {0} cannot be sent as MAVLink 1")]
    MessageIdOutOfRange(u32),
}

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    pub version: MavlinkVersion,
    pub sequence: u8,
    pub system_id: u8,
    pub component_id: u8,
    pub message_id: u32,
    pub incompat_flags: u8,
    pub compat_flags: u8,
}

impl FrameHeader {
    /// Whether the frame carries a signature block
    pub fn is_signed(&self) -> bool {
        self.incompat_flags & INCOMPAT_FLAG_SIGNED != 0
    }
}

/// A structurally valid frame whose checksum has not been checked yet.
///
/// The checksum can only be verified once the message's CRC_EXTRA is known,
/// so unknown message ids are skipped without being treated as corrupt.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub header: FrameHeader,
    pub payload: Bytes,
    pub checksum: u16,
    crc_input: Bytes,
}

impl RawFrame {
    /// Checksum over the frame contents seeded with `crc_extra`
    pub fn compute_checksum(&self, crc_extra: u8) -> u16 {
        checksum(&self.crc_input, crc_extra)
    }

    /// Verifies the transmitted checksum
    pub fn verify(&self, crc_extra: u8) -> Result<(), FrameError> {
        let expected = self.compute_checksum(crc_extra);
        if expected != self.checksum {
            return Err(FrameError::ChecksumMismatch {
                message_id: self.header.message_id,
                expected,
                actual: self.checksum,
            });
        }
        Ok(())
    }
}

fn checksum(crc_input: &[u8], crc_extra: u8) -> u16 {
    let mut digest = X25.digest();
    digest.update(crc_input);
    digest.update(&[crc_extra]);
    digest.finalize()
}

/// Parses one frame from the front of `buf`.
///
/// Returns the frame and the number of bytes it occupied, including any
/// signature block.
pub fn parse_frame(buf: &[u8]) -> Result<(RawFrame, usize), FrameError> {
    let stx = *buf.first().ok_or(FrameError::Truncated {
        needed: 1,
        available: 0,
    })?;

    let (version, header_len) = match stx {
        MAVLINK_V1_STX => (MavlinkVersion::V1, V1_HEADER_LEN),
        MAVLINK_V2_STX => (MavlinkVersion::V2, V2_HEADER_LEN),
        other => return Err(FrameError::InvalidStartMarker(other)),
    };

    if buf.len() < header_len {
        return Err(FrameError::Truncated {
            needed: header_len,
            available: buf.len(),
        });
    }

    let payload_len = buf[1] as usize;

    let header = match version {
        MavlinkVersion::V1 => FrameHeader {
            version,
            sequence: buf[2],
            system_id: buf[3],
            component_id: buf[4],
            message_id: buf[5] as u32,
            incompat_flags: 0,
            compat_flags: 0,
        },
        MavlinkVersion::V2 => {
            let incompat_flags = buf[2];
            if incompat_flags & !INCOMPAT_FLAG_SIGNED != 0 {
                return Err(FrameError::UnsupportedIncompatFlags(incompat_flags));
            }
            FrameHeader {
                version,
                sequence: buf[4],
                system_id: buf[5],
                component_id: buf[6],
                message_id: u32::from_le_bytes([buf[7], buf[8], buf[9], 0]),
                incompat_flags,
                compat_flags: buf[3],
            }
        }
    };

    let signature_len = if header.is_signed() { SIGNATURE_LEN } else { 0 };
    let frame_len = header_len + payload_len + CHECKSUM_LEN + signature_len;
    if buf.len() < frame_len {
        return Err(FrameError::Truncated {
            needed: frame_len,
            available: buf.len(),
        });
    }

    let payload_end = header_len + payload_len;
    let checksum = u16::from_le_bytes([buf[payload_end], buf[payload_end + 1]]);

    let frame = RawFrame {
        header,
        payload: Bytes::copy_from_slice(&buf[header_len..payload_end]),
        checksum,
        crc_input: Bytes::copy_from_slice(&buf[1..payload_end]),
    };

    Ok((frame, frame_len))
}

/// Builds an unsigned frame around `payload`.
///
/// MAVLink 2 frames drop trailing zero bytes from the payload (keeping at
/// least one), as the receiver zero-extends them.
pub fn encode_frame(
    header: &FrameHeader,
    payload: &[u8],
    crc_extra: u8,
) -> Result<Bytes, FrameError> {
    let mut out = BytesMut::with_capacity(V2_HEADER_LEN + payload.len() + CHECKSUM_LEN);

    match header.version {
        MavlinkVersion::V1 => {
            let message_id = u8::try_from(header.message_id)
                .map_err(|_| FrameError::MessageIdOutOfRange(header.message_id))?;
            out.put_u8(MAVLINK_V1_STX);
            out.put_u8(payload.len() as u8);
            out.put_u8(header.sequence);
            out.put_u8(header.system_id);
            out.put_u8(header.component_id);
            out.put_u8(message_id);
            out.put_slice(payload);
        }
        MavlinkVersion::V2 => {
            let trimmed_len = payload
                .iter()
                .rposition(|&b| b != 0)
                .map_or(1, |last| last + 1)
                .min(payload.len());
            let id = header.message_id.to_le_bytes();
            out.put_u8(MAVLINK_V2_STX);
            out.put_u8(trimmed_len as u8);
            out.put_u8(0);
            out.put_u8(header.compat_flags);
            out.put_u8(header.sequence);
            out.put_u8(header.system_id);
            out.put_u8(header.component_id);
            out.put_slice(&id[..3]);
            out.put_slice(&payload[..trimmed_len]);
        }
    }

    let crc = checksum(&out[1..], crc_extra);
    out.put_u16_le(crc);
    Ok(out.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    // HEARTBEAT type=2 autopilot=3 base_mode=0x51 status=4 version=3, seq 0, sys 1, comp 1
    const HEARTBEAT_V1: [u8; 17] = [
        0xFE, 0x09, 0x00, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x03, 0x51, 0x04, 0x03,
        0x7D, 0xDD,
    ];

    fn header(version: MavlinkVersion, message_id: u32) -> FrameHeader {
        FrameHeader {
            version,
            sequence: 7,
            system_id: 1,
            component_id: 1,
            message_id,
            incompat_flags: 0,
            compat_flags: 0,
        }
    }

    #[test]
    fn test_crc_matches_reference_check_value() {
        assert_eq!(X25.checksum(b"123456789"), 0x6F91);
    }

    #[test]
    fn test_parse_reference_heartbeat() {
        let (frame, consumed) = parse_frame(&HEARTBEAT_V1).unwrap();
        assert_eq!(consumed, HEARTBEAT_V1.len());
        assert_eq!(frame.header.version, MavlinkVersion::V1);
        assert_eq!(frame.header.system_id, 1);
        assert_eq!(frame.header.message_id, 0);
        assert_eq!(frame.payload.len(), 9);
        assert!(frame.verify(50).is_ok());
        assert!(frame.verify(51).is_err());
    }

    #[test]
    fn test_encode_reproduces_reference_heartbeat() {
        let mut h = header(MavlinkVersion::V1, 0);
        h.sequence = 0;
        let encoded = encode_frame(&h, &HEARTBEAT_V1[6..15], 50).unwrap();
        assert_eq!(&encoded[..], &HEARTBEAT_V1[..]);
    }

    #[test]
    fn test_invalid_start_marker() {
        let mut bad = HEARTBEAT_V1;
        bad[0] = 0x55;
        assert_eq!(
            parse_frame(&bad).unwrap_err(),
            FrameError::InvalidStartMarker(0x55)
        );
    }

    #[test]
    fn test_declared_length_exceeds_datagram() {
        let mut bad = HEARTBEAT_V1;
        bad[1] = 40;
        assert!(matches!(
            parse_frame(&bad),
            Err(FrameError::Truncated { .. })
        ));
        assert!(matches!(
            parse_frame(&HEARTBEAT_V1[..4]),
            Err(FrameError::Truncated { .. })
        ));
    }

    #[test]
    fn test_corrupted_payload_fails_checksum() {
        let mut bad = HEARTBEAT_V1;
        bad[10] ^= 0xFF;
        let (frame, _) = parse_frame(&bad).unwrap();
        assert!(matches!(
            frame.verify(50),
            Err(FrameError::ChecksumMismatch { message_id: 0, .. })
        ));
    }

    #[test]
    fn test_v2_truncates_trailing_zeros() {
        let payload = [1u8, 2, 3, 0, 0, 0];
        let encoded = encode_frame(&header(MavlinkVersion::V2, 30), &payload, 39).unwrap();
        assert_eq!(encoded[1], 3);

        let (frame, consumed) = parse_frame(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(frame.header.message_id, 30);
        assert_eq!(&frame.payload[..], &[1, 2, 3]);
        assert!(frame.verify(39).is_ok());

        let all_zero = encode_frame(&header(MavlinkVersion::V2, 30), &[0u8; 4], 39).unwrap();
        assert_eq!(all_zero[1], 1);
    }

    #[test]
    fn test_v2_signed_frame_skips_signature() {
        let payload = [9u8; 4];
        let unsigned = encode_frame(&header(MavlinkVersion::V2, 74), &payload, 20).unwrap();

        let mut signed = unsigned.to_vec();
        signed[2] = INCOMPAT_FLAG_SIGNED;
        // flags are part of the checksummed header
        let crc = checksum(&signed[1..V2_HEADER_LEN + payload.len()], 20);
        let crc_pos = V2_HEADER_LEN + payload.len();
        signed[crc_pos..crc_pos + 2].copy_from_slice(&crc.to_le_bytes());
        signed.extend_from_slice(&[0xAA; SIGNATURE_LEN]);

        let (frame, consumed) = parse_frame(&signed).unwrap();
        assert!(frame.header.is_signed());
        assert_eq!(consumed, signed.len());
        assert!(frame.verify(20).is_ok());
    }

    #[test]
    fn test_v2_unknown_incompat_flag() {
        let mut encoded = encode_frame(&header(MavlinkVersion::V2, 0), &[1u8; 9], 50)
            .unwrap()
            .to_vec();
        encoded[2] = 0x02;
        assert_eq!(
            parse_frame(&encoded).unwrap_err(),
            FrameError::UnsupportedIncompatFlags(0x02)
        );
    }

    #[test]
    fn test_v1_rejects_wide_message_id() {
        assert_eq!(
            encode_frame(&header(MavlinkVersion::V1, 300), &[0u8; 4], 0).unwrap_err(),
            FrameError::MessageIdOutOfRange(300)
        );
    }
}
