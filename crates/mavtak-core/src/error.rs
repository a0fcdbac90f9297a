//! Error types for the mavtak bridge.
//!
//! All errors implement `std::error::Error` and serialize with a `type` tag.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using MavtakError as the error type.
pub type Result<T> = std::result::Result<T, MavtakError>;

/// Top-level error type for all mavtak operations.
#[derive(Debug, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum MavtakError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Socket setup and transport errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
}

/// Errors raised while creating or using UDP sockets.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum NetworkError {
    /// Failed to bind the listening socket. Fatal at startup.
    #[error("Failed to bind {address}: {reason}")]
    BindFailed { address: String, reason: String },

    /// Failed to create or configure an outbound socket
    #[error("Failed to configure socket for {destination}: {reason}")]
    SocketSetup { destination: String, reason: String },

    /// Address could not be parsed or resolved
    #[error("Invalid address: {value}")]
    InvalidAddress { value: String },
}

impl NetworkError {
    /// Creates a bind failed error.
    pub fn bind_failed(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BindFailed {
            address: address.into(),
            reason: reason.into(),
        }
    }
}

/// Errors related to configuration.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {reason}")]
    InvalidFormat { reason: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// Invalid destination configuration
    #[error("Invalid destination '{destination}': {reason}")]
    InvalidDestination { destination: String, reason: String },

    /// Duplicate destination name
    #[error("Duplicate destination name: {name}")]
    DuplicateDestination { name: String },
}

impl ConfigError {
    /// Creates a file not found error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
