//! CoT fan-out to every configured destination

use crate::status::StatusStore;
use async_trait::async_trait;
use futures::future::join_all;
use mavtak_core::error::NetworkError;
use mavtak_core::{BridgeSettings, DestinationConfig, DestinationMode};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

/// Largest datagram sent without a warning (1500 MTU - IP - UDP headers)
const MAX_UDP_PACKET_SIZE: usize = 1472;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("send to {destination} timed out after {timeout_ms}ms")]
    Timeout { destination: String, timeout_ms: u64 },

    #[error("send to {destination} failed: {source}")]
    Io {
        destination: String,
        source: std::io::Error,
    },
}

/// Somewhere serialized CoT can be delivered
#[async_trait]
pub trait CotSink: Send + Sync {
    /// Name used in logs and the status store
    fn name(&self) -> &str;

    /// Sends one datagram, returning the number of bytes written
    async fn send(&self, payload: &[u8]) -> Result<usize, DispatchError>;
}

/// UDP unicast or multicast destination
#[derive(Debug)]
pub struct UdpDestination {
    label: String,
    config: DestinationConfig,
    target: SocketAddr,
    socket: UdpSocket,
}

impl UdpDestination {
    /// Creates the outbound socket.
    ///
    /// Multicast destinations get the configured TTL and loopback enabled so
    /// clients on the same host see the feed.
    #[instrument(skip_all, fields(destination = %config))]
    pub fn bind(config: &DestinationConfig) -> Result<Self, NetworkError> {
        let setup_err = |reason: String| NetworkError::SocketSetup {
            destination: config.to_string(),
            reason,
        };

        let target = config
            .resolve()
            .map_err(|_| NetworkError::InvalidAddress {
                value: config.endpoint(),
            })?;

        let local_addr = match target.ip() {
            IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED), 0),
        };

        let socket = socket2::Socket::new(
            socket2::Domain::for_address(local_addr),
            socket2::Type::DGRAM,
            Some(socket2::Protocol::UDP),
        )
        .map_err(|e| setup_err(e.to_string()))?;

        if config.mode == DestinationMode::Multicast {
            socket
                .set_multicast_ttl_v4(config.ttl)
                .map_err(|e| setup_err(format!("failed to set multicast TTL: {e}")))?;
            socket
                .set_multicast_loop_v4(true)
                .map_err(|e| setup_err(format!("failed to enable multicast loopback: {e}")))?;
        }

        socket
            .set_nonblocking(true)
            .map_err(|e| setup_err(e.to_string()))?;
        socket
            .bind(&local_addr.into())
            .map_err(|e| setup_err(e.to_string()))?;

        let socket =
            UdpSocket::from_std(socket.into()).map_err(|e| setup_err(e.to_string()))?;

        info!(target = %target, "CoT destination ready");

        Ok(Self {
            label: config.to_string(),
            config: config.clone(),
            target,
            socket,
        })
    }

    pub fn config(&self) -> &DestinationConfig {
        &self.config
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Multicast TTL currently set on the socket
    pub fn multicast_ttl(&self) -> std::io::Result<u32> {
        self.socket.multicast_ttl_v4()
    }
}

#[async_trait]
impl CotSink for UdpDestination {
    fn name(&self) -> &str {
        &self.label
    }

    async fn send(&self, payload: &[u8]) -> Result<usize, DispatchError> {
        if payload.len() > MAX_UDP_PACKET_SIZE {
            warn!(
                size = payload.len(),
                max_size = MAX_UDP_PACKET_SIZE,
                "CoT datagram exceeds recommended size, may be fragmented or dropped"
            );
        }

        self.socket
            .send_to(payload, self.target)
            .await
            .map_err(|source| DispatchError::Io {
                destination: self.label.clone(),
                source,
            })
    }
}

/// Outcome of one fan-out
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Sends identical bytes to every sink concurrently
pub struct Dispatcher {
    sinks: Vec<Arc<dyn CotSink>>,
    send_timeout: Duration,
    status: Arc<StatusStore>,
}

impl Dispatcher {
    pub fn new(
        sinks: Vec<Arc<dyn CotSink>>,
        send_timeout: Duration,
        status: Arc<StatusStore>,
    ) -> Self {
        Self {
            sinks,
            send_timeout,
            status,
        }
    }

    /// Opens a UDP destination for every configured target
    pub fn from_settings(
        settings: &BridgeSettings,
        status: Arc<StatusStore>,
    ) -> Result<Self, NetworkError> {
        let sinks = settings
            .destinations()
            .iter()
            .map(|config| {
                UdpDestination::bind(config).map(|d| Arc::new(d) as Arc<dyn CotSink>)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(sinks, settings.send_timeout(), status))
    }

    pub fn destination_names(&self) -> Vec<String> {
        self.sinks.iter().map(|s| s.name().to_string()).collect()
    }

    /// Delivers `payload` to all sinks.
    ///
    /// A failing or slow sink is counted and logged; it never blocks or
    /// cancels the others.
    pub async fn dispatch(&self, payload: &[u8]) -> DispatchReport {
        let timeout_ms = self.send_timeout.as_millis() as u64;

        let sends = self.sinks.iter().map(|sink| async move {
            let result = match timeout(self.send_timeout, sink.send(payload)).await {
                Ok(result) => result,
                Err(_) => Err(DispatchError::Timeout {
                    destination: sink.name().to_string(),
                    timeout_ms,
                }),
            };
            (sink, result)
        });

        let mut report = DispatchReport::default();
        for (sink, result) in join_all(sends).await {
            match result {
                Ok(sent) => {
                    if sent != payload.len() {
                        warn!(
                            destination = sink.name(),
                            expected = payload.len(),
                            actual = sent,
                            "Partial CoT datagram sent"
                        );
                    }
                    debug!(destination = sink.name(), bytes = sent, "CoT sent");
                    self.status.record_message_sent();
                    report.delivered += 1;
                }
                Err(e) => {
                    warn!(destination = sink.name(), error = %e, "CoT send failed");
                    self.status.record_send_error(sink.name(), &e.to_string());
                    report.failed += 1;
                }
            }
        }

        report
    }
}
