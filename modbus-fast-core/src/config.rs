//! Endpoint configuration.
//!
//! An [`EndpointConfig`] describes one Modbus endpoint and the block of
//! points polled from it. It is supplied once by an external loader and
//! validated once when the hub is built.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Largest number of points a single bulk read may cover.
pub const MAX_COUNT: u16 = 128;

/// Longest accepted sample period in milliseconds.
pub const MAX_SAMPLE_PERIOD_MS: u64 = 10_000;

/// Longest accepted transport timeout in seconds.
pub const MAX_TIMEOUT_SECS: f64 = 3600.0;

/// Convert a timeout in seconds. `None` unless it lies in `(0, MAX_TIMEOUT_SECS]`.
pub fn timeout_from_secs(secs: f64) -> Option<Duration> {
    if secs > 0.0 && secs <= MAX_TIMEOUT_SECS {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}

/// Modbus register types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterType {
    /// Discrete output coils (read/write, 1-bit)
    Coil,
    /// Discrete input contacts (read-only, 1-bit)
    Discrete,
    /// Input registers (read-only, 16-bit)
    Input,
    /// Holding registers (read/write, 16-bit)
    Holding,
}

impl RegisterType {
    /// Return the string name for this register type.
    pub fn as_str(&self) -> &'static str {
        match self {
            RegisterType::Coil => "coil",
            RegisterType::Discrete => "discrete",
            RegisterType::Input => "input",
            RegisterType::Holding => "holding",
        }
    }

    /// Function code of the bulk read for this register type.
    pub fn function_code(&self) -> u8 {
        match self {
            RegisterType::Coil => 0x01,
            RegisterType::Discrete => 0x02,
            RegisterType::Holding => 0x03,
            RegisterType::Input => 0x04,
        }
    }

    /// Letter used when naming points of this type.
    pub fn letter(&self) -> char {
        match self {
            RegisterType::Holding => 'H',
            RegisterType::Input => 'R',
            RegisterType::Coil => 'C',
            RegisterType::Discrete => 'I',
        }
    }

    /// Whether the device answers with a bit array rather than 16-bit words.
    pub fn is_bit(&self) -> bool {
        matches!(self, RegisterType::Coil | RegisterType::Discrete)
    }
}

impl fmt::Display for RegisterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serial parity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

/// Connection to the endpoint, TCP or serial RTU.
///
/// Deserialized from flat keys: `host`/`port` select TCP, `serial` selects RTU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConnectionConfig {
    /// Modbus TCP connection
    Tcp {
        /// Host address (IP or hostname)
        host: String,
        /// TCP port (default: 502)
        #[serde(default = "default_modbus_port")]
        port: u16,
    },
    /// Modbus RTU (serial) connection
    Rtu {
        /// Serial port path (e.g., "/dev/ttyUSB0" or "COM3")
        serial: String,
        /// Baud rate (default: 9600)
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        /// Parity (default: none)
        #[serde(default)]
        parity: Parity,
        /// Stop bits: 1 or 2 (default: 1)
        #[serde(default = "default_stop_bits")]
        stop_bits: u8,
        /// Data bits: 7 or 8 (default: 8)
        #[serde(default = "default_data_bits")]
        data_bits: u8,
    },
}

fn default_modbus_port() -> u16 {
    502
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_stop_bits() -> u8 {
    1
}

fn default_data_bits() -> u8 {
    8
}

impl ConnectionConfig {
    /// Short transport label: "tcp" or "rtu".
    pub fn mode(&self) -> &'static str {
        match self {
            ConnectionConfig::Tcp { .. } => "tcp",
            ConnectionConfig::Rtu { .. } => "rtu",
        }
    }
}

impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionConfig::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
            ConnectionConfig::Rtu {
                serial, baud_rate, ..
            } => write!(f, "rtu://{}@{}", serial, baud_rate),
        }
    }
}

/// Configuration of one polled endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Display label, also used to identify the endpoint in logs
    #[serde(default = "default_name")]
    pub name: String,

    /// Where to connect
    #[serde(flatten)]
    pub connection: ConnectionConfig,

    /// Modbus unit/slave ID
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Register type read every cycle
    #[serde(default = "default_register_type")]
    pub register_type: RegisterType,

    /// First address of the block (0-based)
    #[serde(default)]
    pub start_address: u16,

    /// Number of points in the block (1-128)
    #[serde(default = "default_count")]
    pub count: u16,

    /// Target period between cycle starts, in milliseconds
    #[serde(default = "default_sample_period_ms")]
    pub sample_period_ms: u64,

    /// Socket/serial timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: f64,

    /// Only dispatch points whose value changed
    #[serde(default = "default_only_on_change")]
    pub only_on_change: bool,

    /// Display addresses starting at 1 (naming only)
    #[serde(default)]
    pub one_based_names: bool,
}

fn default_name() -> String {
    "Modbus Fast".to_string()
}

fn default_unit_id() -> u8 {
    1
}

fn default_register_type() -> RegisterType {
    RegisterType::Holding
}

fn default_count() -> u16 {
    32
}

fn default_sample_period_ms() -> u64 {
    5
}

fn default_timeout() -> f64 {
    1.0
}

fn default_only_on_change() -> bool {
    true
}

impl EndpointConfig {
    /// Defaults for a TCP endpoint.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::with_connection(ConnectionConfig::Tcp {
            host: host.into(),
            port,
        })
    }

    /// Defaults for a serial RTU endpoint.
    pub fn rtu(serial: impl Into<String>, baud_rate: u32) -> Self {
        Self::with_connection(ConnectionConfig::Rtu {
            serial: serial.into(),
            baud_rate,
            parity: Parity::default(),
            stop_bits: default_stop_bits(),
            data_bits: default_data_bits(),
        })
    }

    fn with_connection(connection: ConnectionConfig) -> Self {
        Self {
            name: default_name(),
            connection,
            unit_id: default_unit_id(),
            register_type: default_register_type(),
            start_address: 0,
            count: default_count(),
            sample_period_ms: default_sample_period_ms(),
            timeout: default_timeout(),
            only_on_change: default_only_on_change(),
            one_based_names: false,
        }
    }

    /// Target period between cycle starts, never below 1 ms.
    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms.max(1))
    }

    /// Transport timeout.
    pub fn timeout_duration(&self) -> Result<Duration, ConfigError> {
        timeout_from_secs(self.timeout).ok_or_else(|| {
            ConfigError::validation(format!(
                "Endpoint '{}': timeout must be greater than 0 and at most {} seconds, got {}",
                self.name, MAX_TIMEOUT_SECS, self.timeout
            ))
        })
    }

    /// Last address covered by the block.
    pub fn end_address(&self) -> u32 {
        u32::from(self.start_address) + u32::from(self.count).saturating_sub(1)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::validation("Endpoint name cannot be empty"));
        }

        if self.count == 0 || self.count > MAX_COUNT {
            return Err(ConfigError::validation(format!(
                "Endpoint '{}': count must be 1-{}, got {}",
                self.name, MAX_COUNT, self.count
            )));
        }

        if self.end_address() > u32::from(u16::MAX) {
            return Err(ConfigError::validation(format!(
                "Endpoint '{}': block {}+{} exceeds the 16-bit address space",
                self.name, self.start_address, self.count
            )));
        }

        if self.sample_period_ms == 0 || self.sample_period_ms > MAX_SAMPLE_PERIOD_MS {
            return Err(ConfigError::validation(format!(
                "Endpoint '{}': sample_period_ms must be 1-{}, got {}",
                self.name, MAX_SAMPLE_PERIOD_MS, self.sample_period_ms
            )));
        }

        self.timeout_duration()?;

        match &self.connection {
            ConnectionConfig::Tcp { host, port } => {
                if host.trim().is_empty() {
                    return Err(ConfigError::validation(format!(
                        "Endpoint '{}': host cannot be empty",
                        self.name
                    )));
                }
                if *port == 0 {
                    return Err(ConfigError::validation(format!(
                        "Endpoint '{}': port cannot be 0",
                        self.name
                    )));
                }
            }
            ConnectionConfig::Rtu {
                serial,
                baud_rate,
                stop_bits,
                data_bits,
                ..
            } => {
                if serial.trim().is_empty() {
                    return Err(ConfigError::validation(format!(
                        "Endpoint '{}': serial port cannot be empty",
                        self.name
                    )));
                }
                if *baud_rate == 0 {
                    return Err(ConfigError::validation(format!(
                        "Endpoint '{}': baud_rate cannot be 0",
                        self.name
                    )));
                }
                if !matches!(stop_bits, 1 | 2) {
                    return Err(ConfigError::validation(format!(
                        "Endpoint '{}': stop_bits must be 1 or 2",
                        self.name
                    )));
                }
                if !matches!(data_bits, 7 | 8) {
                    return Err(ConfigError::validation(format!(
                        "Endpoint '{}': data_bits must be 7 or 8",
                        self.name
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let config: EndpointConfig = json5::from_str(r#"{ host: "192.168.1.10" }"#).unwrap();

        assert_eq!(config.name, "Modbus Fast");
        assert_eq!(
            config.connection,
            ConnectionConfig::Tcp {
                host: "192.168.1.10".to_string(),
                port: 502
            }
        );
        assert_eq!(config.unit_id, 1);
        assert_eq!(config.register_type, RegisterType::Holding);
        assert_eq!(config.start_address, 0);
        assert_eq!(config.count, 32);
        assert_eq!(config.sample_period_ms, 5);
        assert_eq!(config.timeout, 1.0);
        assert!(config.only_on_change);
        assert!(!config.one_based_names);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_rtu() {
        let config: EndpointConfig = json5::from_str(
            r#"{
                name: "Field",
                serial: "/dev/ttyUSB0",
                baud_rate: 19200,
                parity: "even",
                register_type: "discrete",
                count: 8,
                timeout: 0.5,
            }"#,
        )
        .unwrap();

        match &config.connection {
            ConnectionConfig::Rtu {
                serial,
                baud_rate,
                parity,
                stop_bits,
                data_bits,
            } => {
                assert_eq!(serial, "/dev/ttyUSB0");
                assert_eq!(*baud_rate, 19200);
                assert_eq!(*parity, Parity::Even);
                assert_eq!(*stop_bits, 1);
                assert_eq!(*data_bits, 8);
            }
            other => panic!("Expected RTU connection, got {:?}", other),
        }
        assert_eq!(config.register_type, RegisterType::Discrete);
        assert_eq!(config.timeout_duration(), Ok(Duration::from_millis(500)));
        config.validate().unwrap();
    }

    #[test]
    fn test_register_type_codes() {
        assert_eq!(RegisterType::Coil.function_code(), 0x01);
        assert_eq!(RegisterType::Discrete.function_code(), 0x02);
        assert_eq!(RegisterType::Holding.function_code(), 0x03);
        assert_eq!(RegisterType::Input.function_code(), 0x04);

        assert_eq!(RegisterType::Holding.letter(), 'H');
        assert_eq!(RegisterType::Input.letter(), 'R');
        assert_eq!(RegisterType::Coil.letter(), 'C');
        assert_eq!(RegisterType::Discrete.letter(), 'I');
    }

    #[test]
    fn test_validate_count_range() {
        let mut config = EndpointConfig::tcp("plc", 502);
        config.count = 0;
        assert!(config.validate().is_err());

        config.count = 129;
        assert!(config.validate().is_err());

        config.count = 128;
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_address_space() {
        let config = EndpointConfig {
            start_address: 65_535,
            count: 1,
            ..EndpointConfig::tcp("plc", 502)
        };
        config.validate().unwrap();

        let config = EndpointConfig {
            start_address: 65_535,
            count: 2,
            ..EndpointConfig::tcp("plc", 502)
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_period_and_timeout() {
        let config = EndpointConfig {
            sample_period_ms: 0,
            ..EndpointConfig::tcp("plc", 502)
        };
        assert!(config.validate().is_err());

        let config = EndpointConfig {
            sample_period_ms: 10_001,
            ..EndpointConfig::tcp("plc", 502)
        };
        assert!(config.validate().is_err());

        for timeout in [0.0, -1.0, f64::NAN, f64::INFINITY, 1e20, MAX_TIMEOUT_SECS + 1.0] {
            let config = EndpointConfig {
                timeout,
                ..EndpointConfig::tcp("plc", 502)
            };
            assert!(config.validate().is_err(), "timeout {} accepted", timeout);
            assert!(config.timeout_duration().is_err());
        }

        let config = EndpointConfig {
            timeout: MAX_TIMEOUT_SECS,
            ..EndpointConfig::tcp("plc", 502)
        };
        config.validate().unwrap();
        assert_eq!(config.timeout_duration(), Ok(Duration::from_secs(3600)));
    }

    #[test]
    fn test_validate_rtu_line_settings() {
        let mut config = EndpointConfig::rtu("/dev/ttyUSB0", 9600);
        config.validate().unwrap();

        if let ConnectionConfig::Rtu { stop_bits, .. } = &mut config.connection {
            *stop_bits = 3;
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_connection_display() {
        assert_eq!(
            EndpointConfig::tcp("10.0.0.5", 1502).connection.to_string(),
            "tcp://10.0.0.5:1502"
        );
        assert_eq!(
            EndpointConfig::rtu("COM3", 19200).connection.to_string(),
            "rtu://COM3@19200"
        );
    }
}
