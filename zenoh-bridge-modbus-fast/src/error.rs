//! Error types for the bridge.

use thiserror::Error;

/// Result type alias using [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur in the bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration parse error.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] json5::Error),

    /// Invalid endpoint.
    #[error(transparent)]
    Endpoint(#[from] modbus_fast_core::ConfigError),

    /// Zenoh error.
    #[error("Zenoh error: {0}")]
    Zenoh(#[from] zenoh::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Publishing error.
    #[error("Failed to publish to {key}: {message}")]
    Publish { key: String, message: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
