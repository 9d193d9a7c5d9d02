//! JSON payloads published to Zenoh.

use chrono::{DateTime, Utc};
use modbus_fast_core::{ConnectionStatus, EndpointConfig, RegisterType};
use serde::{Deserialize, Serialize};

use crate::naming::{device_id, display_address, point_name, unique_id};

/// A point value change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointMessage {
    pub name: String,
    pub unique_id: String,
    /// Position within the polled block
    pub index: usize,
    /// Display address
    pub address: u32,
    pub value: bool,
    pub timestamp: DateTime<Utc>,
}

impl PointMessage {
    pub fn new(config: &EndpointConfig, index: usize, value: bool) -> Self {
        Self {
            name: point_name(config, index),
            unique_id: unique_id(config, index),
            index,
            address: display_address(config, index),
            value,
            timestamp: Utc::now(),
        }
    }
}

/// An availability transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityMessage {
    pub status: ConnectionStatus,
    pub available: bool,
    pub timestamp: DateTime<Utc>,
}

impl AvailabilityMessage {
    pub fn new(status: ConnectionStatus) -> Self {
        Self {
            status,
            available: status.is_available(),
            timestamp: Utc::now(),
        }
    }
}

/// Description of an endpoint and its points, published once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMessage {
    pub name: String,
    /// `host:port:unit` or `serial:baud:unit`
    pub identifier: String,
    /// e.g. `coil@100+16`
    pub model: String,
    pub register_type: RegisterType,
    pub sample_period_ms: u64,
    pub points: Vec<String>,
}

impl DeviceMessage {
    pub fn new(config: &EndpointConfig) -> Self {
        Self {
            name: config.name.clone(),
            identifier: device_id(config),
            model: format!(
                "{}@{}+{}",
                config.register_type, config.start_address, config.count
            ),
            register_type: config.register_type,
            sample_period_ms: config.sample_period_ms,
            points: (0..usize::from(config.count))
                .map(|index| point_name(config, index))
                .collect(),
        }
    }
}

/// Bridge status information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeStatus {
    /// Bridge name.
    pub bridge: String,
    /// Bridge version.
    pub version: String,
    /// Current status ("running", "offline").
    pub status: String,
    /// Additional metadata.
    #[serde(flatten)]
    pub metadata: serde_json::Value,
}

impl BridgeStatus {
    /// Create a new status with "running" state.
    pub fn running(bridge: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            bridge: bridge.into(),
            version: version.into(),
            status: "running".to_string(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Create a status with "offline" state.
    pub fn offline(bridge: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            bridge: bridge.into(),
            version: version.into(),
            status: "offline".to_string(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Add metadata to the status.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doors() -> EndpointConfig {
        EndpointConfig {
            name: "Doors".to_string(),
            register_type: RegisterType::Coil,
            start_address: 100,
            count: 3,
            ..EndpointConfig::tcp("10.0.0.2", 502)
        }
    }

    #[test]
    fn test_point_message() {
        let message = PointMessage::new(&doors(), 2, true);
        assert_eq!(message.name, "Doors C102");
        assert_eq!(message.unique_id, "modbus_fast_10.0.0.2_502_1_102");
        assert_eq!(message.address, 102);

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["value"], true);
        assert_eq!(json["index"], 2);
    }

    #[test]
    fn test_availability_message() {
        let json = serde_json::to_value(AvailabilityMessage::new(ConnectionStatus::Degraded)).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["available"], false);
    }

    #[test]
    fn test_device_message() {
        let message = DeviceMessage::new(&doors());
        assert_eq!(message.identifier, "10.0.0.2:502:1");
        assert_eq!(message.model, "coil@100+3");
        assert_eq!(message.points, vec!["Doors C100", "Doors C101", "Doors C102"]);
    }

    #[test]
    fn test_status_with_metadata() {
        let status = BridgeStatus::running("modbus_fast", "0.1.0")
            .with_metadata(serde_json::json!({ "endpoints": ["doors"] }));

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"status\":\"running\""));
        assert!(json.contains("\"endpoints\":[\"doors\"]"));
    }
}
