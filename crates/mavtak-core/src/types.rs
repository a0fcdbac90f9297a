//! Core types shared by the bridge crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

/// MAVLink system id of a vehicle. Stable key for per-vehicle state.
pub type VehicleId = u8;

/// How CoT datagrams reach a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationMode {
    /// Point-to-point UDP send
    Unicast,
    /// UDP send to a multicast group with a configured TTL
    Multicast,
}

impl fmt::Display for DestinationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationMode::Unicast => write!(f, "unicast"),
            DestinationMode::Multicast => write!(f, "multicast"),
        }
    }
}

/// One CoT output target.
///
/// Several may be active at the same time, e.g. a unicast feed to a TAK
/// server alongside the SA multicast group.
///
/// # Examples
///
/// ```
/// use mavtak_core::types::DestinationConfig;
///
/// let dest = DestinationConfig::multicast("sa", "239.2.3.1", 6969, 4);
/// assert!(dest.validate().is_ok());
/// assert_eq!(dest.endpoint(), "239.2.3.1:6969");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Name used in logs and status output
    pub name: String,

    /// Delivery mode
    pub mode: DestinationMode,

    /// Host name, IP address or multicast group
    pub address: String,

    /// Destination UDP port
    pub port: u16,

    /// Multicast time-to-live (ignored for unicast)
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

fn default_ttl() -> u32 {
    1
}

impl DestinationConfig {
    /// Creates a unicast destination.
    pub fn unicast(name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            mode: DestinationMode::Unicast,
            address: address.into(),
            port,
            ttl: default_ttl(),
        }
    }

    /// Creates a multicast destination.
    pub fn multicast(
        name: impl Into<String>,
        address: impl Into<String>,
        port: u16,
        ttl: u32,
    ) -> Self {
        Self {
            name: name.into(),
            mode: DestinationMode::Multicast,
            address: address.into(),
            port,
            ttl,
        }
    }

    /// Returns `address:port`.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// Resolves the destination to a socket address.
    ///
    /// Literal IPs are used directly; host names go through the system
    /// resolver and the first IPv4 result wins.
    pub fn resolve(&self) -> std::result::Result<SocketAddr, String> {
        if let Ok(ip) = self.address.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.port));
        }

        let mut addrs = (self.address.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| format!("cannot resolve {}: {}", self.address, e))?;

        addrs
            .find(|a| a.is_ipv4())
            .ok_or_else(|| format!("no IPv4 address for {}", self.address))
    }

    /// Validates the destination.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name.is_empty() {
            return Err("Destination name cannot be empty".to_string());
        }

        if self.address.is_empty() {
            return Err("Address cannot be empty".to_string());
        }

        if self.port == 0 {
            return Err("Port cannot be 0".to_string());
        }

        if self.mode == DestinationMode::Multicast {
            let ip: IpAddr = self
                .address
                .parse()
                .map_err(|_| format!("Multicast group must be an IP address: {}", self.address))?;

            if !ip.is_multicast() {
                return Err(format!("{} is not a multicast address", ip));
            }

            if self.ttl == 0 || self.ttl > 255 {
                return Err(format!("TTL must be between 1 and 255, got {}", self.ttl));
            }
        }

        Ok(())
    }
}

impl fmt::Display for DestinationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.name, self.mode, self.endpoint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unicast_destination() {
        let dest = DestinationConfig::unicast("tak", "127.0.0.1", 8087);
        assert!(dest.validate().is_ok());
        assert_eq!(dest.resolve().unwrap(), "127.0.0.1:8087".parse().unwrap());
        assert_eq!(dest.to_string(), "tak (unicast 127.0.0.1:8087)");
    }

    #[test]
    fn test_multicast_requires_group_address() {
        let dest = DestinationConfig::multicast("sa", "192.168.1.10", 6969, 1);
        assert!(dest.validate().is_err());

        let dest = DestinationConfig::multicast("sa", "239.2.3.1", 6969, 0);
        assert!(dest.validate().is_err());

        let dest = DestinationConfig::multicast("sa", "239.2.3.1", 6969, 4);
        assert!(dest.validate().is_ok());
    }

    #[test]
    fn test_zero_port_rejected() {
        let dest = DestinationConfig::unicast("tak", "127.0.0.1", 0);
        assert!(dest.validate().is_err());
    }

    #[test]
    fn test_destination_mode_serde() {
        let yaml = "name: sa\nmode: multicast\naddress: 239.2.3.1\nport: 6969\n";
        let dest: DestinationConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(dest.mode, DestinationMode::Multicast);
        assert_eq!(dest.ttl, 1);
    }
}
