//! Error types for the polling hub.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::config::RegisterType;

/// Invalid endpoint configuration. Raised at construction, never at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),
}

impl ConfigError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Modbus exception code carried by an exception response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExceptionCode(pub u8);

impl ExceptionCode {
    pub const ILLEGAL_FUNCTION: Self = Self(0x01);
    pub const ILLEGAL_DATA_ADDRESS: Self = Self(0x02);
    pub const ILLEGAL_DATA_VALUE: Self = Self(0x03);
    pub const SERVER_DEVICE_FAILURE: Self = Self(0x04);
    pub const ACKNOWLEDGE: Self = Self(0x05);
    pub const SERVER_DEVICE_BUSY: Self = Self(0x06);
    pub const MEMORY_PARITY_ERROR: Self = Self(0x08);
    pub const GATEWAY_PATH_UNAVAILABLE: Self = Self(0x0A);
    pub const GATEWAY_TARGET_FAILED: Self = Self(0x0B);

    /// Raw code as sent on the wire.
    pub fn code(&self) -> u8 {
        self.0
    }

    /// Human-readable name of the exception.
    pub fn name(&self) -> &'static str {
        match self.0 {
            0x01 => "Illegal Function",
            0x02 => "Illegal Data Address",
            0x03 => "Illegal Data Value",
            0x04 => "Server Device Failure",
            0x05 => "Acknowledge",
            0x06 => "Server Device Busy",
            0x08 => "Memory Parity Error",
            0x0A => "Gateway Path Unavailable",
            0x0B => "Gateway Target Device Failed To Respond",
            _ => "Unknown Exception",
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X} ({})", self.0, self.name())
    }
}

/// Errors reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    /// The session could not be established.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Socket or serial failure in the middle of a session.
    #[error("Transport I/O failed: {0}")]
    Io(String),

    /// The device answered with an exception response.
    #[error("Modbus exception on function 0x{function:02X}: {exception}")]
    Protocol {
        function: u8,
        exception: ExceptionCode,
    },

    /// The request exceeded the configured timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

impl TransportError {
    /// Whether this failure means the link itself is broken and the session
    /// must be re-established. Exception responses prove the link works.
    pub fn is_transport_level(&self) -> bool {
        !matches!(self, TransportError::Protocol { .. })
    }

    /// Function code with the exception bit set, as seen on the wire.
    pub fn exception_function_code(&self) -> Option<u8> {
        match self {
            TransportError::Protocol { function, .. } => Some(function | 0x80),
            _ => None,
        }
    }
}

/// A raw response could not be turned into booleans.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Short read: expected {expected} values, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("Register type '{kind}' cannot decode a {shape} response")]
    KindMismatch {
        kind: RegisterType,
        shape: &'static str,
    },
}

/// Any failure the hub can run into.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HubError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl HubError {
    /// Whether the scheduler must leave `Polling` and reconnect.
    pub fn requires_reconnect(&self) -> bool {
        matches!(self, HubError::Transport(e) if e.is_transport_level())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_display() {
        assert_eq!(
            ExceptionCode::ILLEGAL_DATA_ADDRESS.to_string(),
            "0x02 (Illegal Data Address)"
        );
        assert_eq!(ExceptionCode(0x42).name(), "Unknown Exception");
    }

    #[test]
    fn test_protocol_error_is_not_transport_level() {
        let err = TransportError::Protocol {
            function: 0x03,
            exception: ExceptionCode::ILLEGAL_DATA_ADDRESS,
        };
        assert!(!err.is_transport_level());
        assert_eq!(err.exception_function_code(), Some(0x83));
        assert_eq!(
            err.to_string(),
            "Modbus exception on function 0x03: 0x02 (Illegal Data Address)"
        );
    }

    #[test]
    fn test_timeout_requires_reconnect() {
        let err = HubError::from(TransportError::Timeout(Duration::from_secs(1)));
        assert!(err.requires_reconnect());

        let err = HubError::from(DecodeError::ShortRead {
            expected: 4,
            actual: 2,
        });
        assert!(!err.requires_reconnect());
    }
}
