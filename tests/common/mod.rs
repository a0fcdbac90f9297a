//! Common test utilities and helpers for integration tests

use mavtak_core::{BridgeSettings, DestinationConfig};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

/// GLOBAL_POSITION_INT, MAVLink v1, system 1, sequence 7:
/// 47.3977418, 8.5455938, 500 m MSL, heading 90, vx 3 m/s, vy 4 m/s
pub const GPI_V1: [u8; 36] = [
    0xFE, 0x1C, 0x07, 0x01, 0x01, 0x21, 0xE8, 0x03, 0x00, 0x00, 0x4A, 0x52, 0x40, 0x1C, 0x42, 0xF4,
    0x17, 0x05, 0x20, 0xA1, 0x07, 0x00, 0x50, 0xC3, 0x00, 0x00, 0x2C, 0x01, 0x90, 0x01, 0x00, 0x00,
    0x28, 0x23, 0x68, 0x72,
];

/// HEARTBEAT, MAVLink v1, system 1
pub const HEARTBEAT_V1: [u8; 17] = [
    0xFE, 0x09, 0x00, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x03, 0x51, 0x04, 0x03, 0x7D,
    0xDD,
];

/// A local socket standing in for a CoT client
pub async fn cot_receiver() -> (UdpSocket, u16) {
    let socket = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind CoT receiver");
    let port = socket.local_addr().expect("No local address").port();
    (socket, port)
}

/// Loopback-only settings with fast timers, sending unicast to `cot_port`
pub fn loopback_settings(cot_port: u16) -> BridgeSettings {
    BridgeSettings {
        bind_address: "127.0.0.1".to_string(),
        mavlink_port: 0,
        cot_ip: "127.0.0.1".to_string(),
        cot_port,
        use_multicast: false,
        emit_interval_ms: 50,
        read_timeout_ms: 50,
        ..Default::default()
    }
}

pub fn extra_unicast(name: &str, port: u16) -> DestinationConfig {
    DestinationConfig::unicast(name, "127.0.0.1", port)
}

/// Sends one datagram from an ephemeral socket
pub async fn send_datagram(target: SocketAddr, datagram: &[u8]) {
    let socket = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind sender");
    socket
        .send_to(datagram, target)
        .await
        .expect("Failed to send datagram");
}

/// Waits for one datagram, or `None` after `wait`
pub async fn recv_within(socket: &UdpSocket, wait: Duration) -> Option<Vec<u8>> {
    let mut buf = vec![0u8; 65_535];
    match tokio::time::timeout(wait, socket.recv_from(&mut buf)).await {
        Ok(Ok((len, _))) => Some(buf[..len].to_vec()),
        _ => None,
    }
}

/// Polls `condition` every 10ms for up to `wait`
pub async fn eventually(wait: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + wait;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
