//! MAVLink UDP intake

use crate::bridge::BridgeContext;
use crate::encoder::CotEncoder;
use crate::status::{LogLevel, VehiclePosition};
use crate::tracker::{TelemetryField, TelemetryUpdate};
use chrono::{DateTime, Utc};
use mavtak_core::error::NetworkError;
use mavtak_core::BridgeSettings;
use mavtak_mavlink::message::normalize_heading;
use mavtak_mavlink::{decode_datagram, DecodedMessage, MavMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, trace, warn};

/// Largest possible UDP payload
const RECV_BUFFER_SIZE: usize = 65_535;

/// What one datagram contributed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DatagramOutcome {
    pub messages: usize,
    pub ignored: usize,
    pub malformed: bool,
    pub updates_applied: usize,
    pub updates_rejected: usize,
}

/// Normalizes a decoded message into tracker updates
pub fn telemetry_updates(
    decoded: &DecodedMessage,
    received_at: DateTime<Utc>,
) -> Vec<TelemetryUpdate> {
    let vehicle_id = decoded.header.system_id;
    let update = |field| TelemetryUpdate::new(vehicle_id, field, received_at);

    match &decoded.message {
        MavMessage::Heartbeat(_) => vec![update(TelemetryField::Heartbeat)],
        MavMessage::GlobalPositionInt(fix) => {
            let mut updates = vec![
                update(TelemetryField::Position {
                    lat: fix.lat_deg(),
                    lon: fix.lon_deg(),
                }),
                update(TelemetryField::Altitude { alt: fix.alt_m() }),
            ];
            if let Some(heading) = fix.heading_deg() {
                updates.push(update(TelemetryField::Heading { heading }));
            }
            updates.push(update(TelemetryField::Speed {
                speed: fix.ground_speed(),
            }));
            updates
        }
        MavMessage::Attitude(attitude) => vec![update(TelemetryField::Heading {
            heading: attitude.heading_deg(),
        })],
        MavMessage::VfrHud(hud) => vec![
            update(TelemetryField::Heading {
                heading: normalize_heading(hud.heading as f64),
            }),
            update(TelemetryField::Speed {
                speed: hud.groundspeed as f64,
            }),
        ],
    }
}

/// Decodes one datagram and applies its telemetry.
///
/// Never fails: malformed input is counted and dropped. A fully accepted
/// GLOBAL_POSITION_INT on a vehicle with a position fix is published as that
/// vehicle's latest position.
pub fn handle_datagram(
    datagram: &[u8],
    received_at: DateTime<Utc>,
    context: &BridgeContext,
    encoder: &CotEncoder,
) -> DatagramOutcome {
    let decoded = decode_datagram(datagram);
    let status = &context.status;

    let mut outcome = DatagramOutcome {
        messages: decoded.messages.len(),
        ignored: decoded.ignored,
        malformed: decoded.error.is_some(),
        ..Default::default()
    };

    for message in &decoded.messages {
        status.record_message_received();
        trace!(
            system_id = message.header.system_id,
            message = message.message.name(),
            "MAVLink message decoded"
        );

        if let MavMessage::GlobalPositionInt(fix) = &message.message {
            status.log(
                LogLevel::Info,
                format!(
                    "MAVLink GLOBAL_POSITION_INT from {}: lat={:.7}, lon={:.7}, alt={:.1}m",
                    message.header.system_id,
                    fix.lat_deg(),
                    fix.lon_deg(),
                    fix.alt_m()
                ),
            );
        }

        let mut rejected = 0;
        for update in telemetry_updates(message, received_at) {
            match context.tracker.apply(&update) {
                Ok(()) => outcome.updates_applied += 1,
                Err(reason) => {
                    warn!(vehicle_id = update.vehicle_id, %reason, "Rejected telemetry update");
                    status.record_invalid_fix(update.vehicle_id, &reason.to_string());
                    rejected += 1;
                }
            }
        }
        outcome.updates_rejected += rejected;

        if rejected == 0 && matches!(message.message, MavMessage::GlobalPositionInt(_)) {
            let vehicle_id = message.header.system_id;
            if let Some(state) = context.tracker.get(vehicle_id).filter(|s| s.position_ready()) {
                status.update_position(VehiclePosition {
                    vehicle_id,
                    uid: encoder.uid_for(vehicle_id),
                    lat: state.lat,
                    lon: state.lon,
                    alt: state.alt,
                    heading: state.heading,
                    speed: state.speed,
                    updated_at: received_at,
                });
            }
        }
    }

    status.record_ignored(decoded.ignored as u64);

    if let Some(err) = decoded.error {
        debug!(error = %err, len = datagram.len(), "Dropping malformed MAVLink data");
        status.record_malformed(&err.to_string());
    }

    outcome
}

/// Owns the inbound UDP socket
#[derive(Debug)]
pub struct Listener {
    socket: UdpSocket,
    local_addr: SocketAddr,
    read_timeout: Duration,
    encoder: CotEncoder,
    context: Arc<BridgeContext>,
}

impl Listener {
    /// Binds `bind_address:mavlink_port`. Failure is fatal to the bridge.
    #[instrument(skip_all, fields(address = %settings.listen_address()))]
    pub fn bind(
        settings: &BridgeSettings,
        context: Arc<BridgeContext>,
    ) -> Result<Self, NetworkError> {
        let address = settings.listen_address();
        let bind_err = |reason: String| NetworkError::bind_failed(address.clone(), reason);

        let addr: SocketAddr = address.parse().map_err(|_| NetworkError::InvalidAddress {
            value: address.clone(),
        })?;

        let socket = socket2::Socket::new(
            socket2::Domain::for_address(addr),
            socket2::Type::DGRAM,
            Some(socket2::Protocol::UDP),
        )
        .map_err(|e| bind_err(e.to_string()))?;

        socket
            .set_nonblocking(true)
            .map_err(|e| bind_err(e.to_string()))?;
        socket
            .bind(&addr.into())
            .map_err(|e| bind_err(e.to_string()))?;

        let socket = UdpSocket::from_std(socket.into()).map_err(|e| bind_err(e.to_string()))?;
        let local_addr = socket.local_addr().map_err(|e| bind_err(e.to_string()))?;

        info!(local_addr = %local_addr, "Listening for MAVLink");

        Ok(Self {
            socket,
            local_addr,
            read_timeout: settings.read_timeout(),
            encoder: CotEncoder::new(settings),
            context,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Receives until the shutdown flag flips; the socket closes on return
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    debug!("Listener received shutdown signal");
                    break;
                }
                result = timeout(self.read_timeout, self.socket.recv_from(&mut buf)) => {
                    match result {
                        Ok(Ok((len, peer))) => {
                            trace!(len, peer = %peer, "Datagram received");
                            handle_datagram(
                                &buf[..len],
                                Utc::now(),
                                &self.context,
                                &self.encoder,
                            );
                        }
                        Ok(Err(e)) => {
                            // ICMP port unreachable and similar surface here on some platforms
                            error!(error = %e, "MAVLink receive error");
                            self.context.status.record_error(format!("MAVLink receive error: {e}"));
                        }
                        Err(_) => {
                            // Read timeout, loop to re-check shutdown
                        }
                    }
                }
            }
        }

        info!(local_addr = %self.local_addr, "Listener stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::FixState;
    use mavtak_mavlink::message::{Attitude, GlobalPositionInt, Heartbeat, VfrHud};
    use mavtak_mavlink::MavlinkVersion;

    const GPI_V1: [u8; 36] = [
        0xFE, 0x1C, 0x07, 0x01, 0x01, 0x21, 0xE8, 0x03, 0x00, 0x00, 0x4A, 0x52, 0x40, 0x1C, 0x42,
        0xF4, 0x17, 0x05, 0x20, 0xA1, 0x07, 0x00, 0x50, 0xC3, 0x00, 0x00, 0x2C, 0x01, 0x90, 0x01,
        0x00, 0x00, 0x28, 0x23, 0x68, 0x72,
    ];

    fn frame(message: MavMessage, system_id: u8) -> Vec<u8> {
        message
            .to_frame(MavlinkVersion::V2, 0, system_id, 1)
            .unwrap()
            .to_vec()
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn encoder() -> CotEncoder {
        CotEncoder::new(&BridgeSettings::default())
    }

    #[test]
    fn test_reference_frame_updates_tracker() {
        let context = BridgeContext::new();
        let outcome = handle_datagram(&GPI_V1, now(), &context, &encoder());

        assert_eq!(outcome.messages, 1);
        assert!(!outcome.malformed);

        let state = context.tracker.get(1).unwrap();
        assert!((state.lat - 47.3977418).abs() < 1e-9);
        assert!((state.lon - 8.5455938).abs() < 1e-9);
        assert!((state.alt - 500.0).abs() < 1e-9);
        assert!((state.heading - 90.0).abs() < 1e-9);
        assert!((state.speed - 5.0).abs() < 1e-9);
        assert!(state.position_ready());
        assert_eq!(context.status.counters().messages_received, 1);

        let position = context.status.position(1).unwrap();
        assert_eq!(position.uid, "DEFAULT_UAV-1");
        assert!((position.lat - 47.3977418).abs() < 1e-9);
        assert!((position.heading - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_heading_leaves_flag_unset() {
        let context = BridgeContext::new();
        let fix = GlobalPositionInt {
            lat: 100,
            lon: 200,
            alt: 1000,
            hdg: u16::MAX,
            ..Default::default()
        };
        handle_datagram(
            &frame(MavMessage::GlobalPositionInt(fix), 4),
            now(),
            &context,
            &encoder(),
        );

        let state = context.tracker.get(4).unwrap();
        assert!(!state.have_heading);
        assert_eq!(state.heading, 0.0);
    }

    #[test]
    fn test_attitude_and_vfr_hud_headings() {
        let context = BridgeContext::new();
        let attitude = Attitude {
            yaw: -std::f32::consts::FRAC_PI_2,
            ..Default::default()
        };
        handle_datagram(
            &frame(MavMessage::Attitude(attitude), 2),
            now(),
            &context,
            &encoder(),
        );
        let heading = context.tracker.get(2).unwrap().heading;
        assert!((heading - 270.0).abs() < 1e-3);

        let hud = VfrHud {
            groundspeed: 12.5,
            heading: -10,
            ..Default::default()
        };
        handle_datagram(
            &frame(MavMessage::VfrHud(hud), 2),
            now(),
            &context,
            &encoder(),
        );
        let state = context.tracker.get(2).unwrap();
        assert_eq!(state.heading, 350.0);
        assert_eq!(state.speed, 12.5);
        assert!(!state.position_ready());
    }

    #[test]
    fn test_heartbeat_only_vehicle_is_partial() {
        let context = BridgeContext::new();
        handle_datagram(
            &frame(MavMessage::Heartbeat(Heartbeat::default()), 9),
            now(),
            &context,
            &encoder(),
        );

        let state = context.tracker.get(9).unwrap();
        assert!(state.last_heartbeat.is_some());
        assert!(state.last_update_time.is_none());
        assert_eq!(state.fix_state(now(), None), FixState::PartialFix);
        assert!(context.status.position(9).is_none());
    }

    #[test]
    fn test_invalid_start_marker_counts_once() {
        let context = BridgeContext::new();
        let mut datagram = GPI_V1.to_vec();
        datagram[0] = 0x55;

        let outcome = handle_datagram(&datagram, now(), &context, &encoder());
        assert!(outcome.malformed);
        assert_eq!(outcome.messages, 0);

        let counters = context.status.counters();
        assert_eq!(counters.malformed_dropped, 1);
        assert_eq!(counters.messages_received, 0);
        assert!(context.tracker.is_empty());
    }

    #[test]
    fn test_bad_checksum_keeps_earlier_frames() {
        let context = BridgeContext::new();
        let mut datagram = frame(MavMessage::Heartbeat(Heartbeat::default()), 1);
        let mut corrupt = GPI_V1.to_vec();
        let last = corrupt.len() - 1;
        corrupt[last] ^= 0xFF;
        datagram.extend_from_slice(&corrupt);
        datagram.extend_from_slice(&GPI_V1);

        let outcome = handle_datagram(&datagram, now(), &context, &encoder());
        assert_eq!(outcome.messages, 1);
        assert!(outcome.malformed);

        let counters = context.status.counters();
        assert_eq!(counters.messages_received, 1);
        assert_eq!(counters.malformed_dropped, 1);
        assert!(!context.tracker.get(1).unwrap().have_position);
    }

    #[test]
    fn test_unknown_message_id_is_ignored() {
        let context = BridgeContext::new();
        // v1 SYS_STATUS (#1) with a zero payload; checksum is never verified
        let mut datagram = vec![0xFE, 0x1F, 0x00, 0x01, 0x01, 0x01];
        datagram.extend_from_slice(&[0u8; 31]);
        datagram.extend_from_slice(&[0x00, 0x00]);

        let outcome = handle_datagram(&datagram, now(), &context, &encoder());
        assert_eq!(outcome.ignored, 1);
        assert!(!outcome.malformed);

        let counters = context.status.counters();
        assert_eq!(counters.ignored_messages, 1);
        assert_eq!(counters.malformed_dropped, 0);
        assert_eq!(counters.messages_received, 0);
    }

    #[test]
    fn test_out_of_range_altitude_rejected() {
        let context = BridgeContext::new();
        let fix = GlobalPositionInt {
            lat: 473977418,
            lon: 85455938,
            alt: 70_000_000,
            hdg: u16::MAX,
            ..Default::default()
        };
        let outcome = handle_datagram(
            &frame(MavMessage::GlobalPositionInt(fix), 1),
            now(),
            &context,
            &encoder(),
        );

        assert_eq!(outcome.updates_rejected, 1);
        let state = context.tracker.get(1).unwrap();
        assert!(state.have_position);
        assert!(!state.have_altitude);
        assert!(context.status.position(1).is_none());
        assert_eq!(context.status.counters().invalid_fixes, 1);
        assert!(context
            .status
            .last_error()
            .unwrap()
            .message
            .contains("altitude"));
    }

    #[test]
    fn test_vehicles_tracked_independently() {
        let context = BridgeContext::new();
        let a = GlobalPositionInt {
            lat: 10_000_000,
            lon: 20_000_000,
            alt: 1000,
            hdg: u16::MAX,
            ..Default::default()
        };
        let b = GlobalPositionInt {
            lat: -10_000_000,
            ..a
        };
        let mut datagram = frame(MavMessage::GlobalPositionInt(a), 1);
        datagram.extend(frame(MavMessage::GlobalPositionInt(b), 2));

        handle_datagram(&datagram, now(), &context, &encoder());
        assert_eq!(context.tracker.len(), 2);
        assert_eq!(context.tracker.get(1).unwrap().lat, 1.0);
        assert_eq!(context.tracker.get(2).unwrap().lat, -1.0);
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let settings = BridgeSettings {
            bind_address: "203.0.113.7".to_string(),
            mavlink_port: 0,
            ..Default::default()
        };
        let err = Listener::bind(&settings, Arc::new(BridgeContext::new())).unwrap_err();
        assert!(matches!(err, NetworkError::BindFailed { .. }));
    }

    #[tokio::test]
    async fn test_listener_stops_on_shutdown() {
        let settings = BridgeSettings {
            bind_address: "127.0.0.1".to_string(),
            mavlink_port: 0,
            read_timeout_ms: 50,
            ..Default::default()
        };
        let context = Arc::new(BridgeContext::new());
        let listener = Listener::bind(&settings, Arc::clone(&context)).unwrap();
        let addr = listener.local_addr();
        assert_ne!(addr.port(), 0);

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(listener.run(rx));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(&GPI_V1, addr).await.unwrap();

        let mut ready = false;
        for _ in 0..100 {
            if context.tracker.get(1).is_some() {
                ready = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(ready);

        tx.send(true).unwrap();
        timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
    }
}
