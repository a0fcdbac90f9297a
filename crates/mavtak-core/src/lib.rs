//! # mavtak Core
//!
//! Core types, error handling, and configuration for the mavtak MAVLink to
//! Cursor-on-Target bridge.
//!
//! - **Types**: vehicle identifiers and CoT destination definitions.
//! - **Errors**: `thiserror` based error types for configuration and socket
//!   setup failures.
//! - **Configuration**: YAML files, `MAVTAK__*` environment overrides, and
//!   validation.
//!
//! ## Example
//!
//! ```
//! use mavtak_core::config::AppConfig;
//! use mavtak_core::types::DestinationMode;
//!
//! let config = AppConfig::default();
//! assert!(config.validate().is_ok());
//!
//! let destinations = config.bridge.destinations();
//! assert_eq!(destinations.len(), 1);
//! assert_eq!(destinations[0].mode, DestinationMode::Multicast);
//! ```

pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, BridgeSettings};
pub use error::{MavtakError, Result};
pub use types::{DestinationConfig, DestinationMode, VehicleId};
