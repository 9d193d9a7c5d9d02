//! Configuration for the bridge.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use modbus_fast_core::EndpointConfig;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::naming::slugify;

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Zenoh connection settings
    #[serde(default)]
    pub zenoh: ZenohConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Polled endpoints
    pub modbus_fast: ModbusFastConfig,
}

/// Role of the bridge in the Zenoh network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZenohMode {
    Client,
    #[default]
    Peer,
    Router,
}

impl fmt::Display for ZenohMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZenohMode::Client => write!(f, "client"),
            ZenohMode::Peer => write!(f, "peer"),
            ZenohMode::Router => write!(f, "router"),
        }
    }
}

/// Zenoh connection configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZenohConfig {
    /// Session role (default: peer)
    #[serde(default)]
    pub mode: ZenohMode,

    /// Locators to connect to, e.g. `tcp/router:7447`
    #[serde(default)]
    pub connect: Vec<String>,

    /// Locators to listen on
    #[serde(default)]
    pub listen: Vec<String>,
}

impl ZenohConfig {
    /// Check that every locator has the `<protocol>/<address>` shape.
    pub fn validate(&self) -> Result<()> {
        for locator in self.connect.iter().chain(&self.listen) {
            match locator.split_once('/') {
                Some((protocol, address)) if !protocol.is_empty() && !address.is_empty() => {}
                _ => {
                    return Err(BridgeError::Config(format!(
                        "Invalid Zenoh locator '{}': expected <protocol>/<address>",
                        locator
                    )));
                }
            }
        }
        Ok(())
    }

    /// Build the session configuration.
    pub fn to_zenoh_config(&self) -> Result<zenoh::Config> {
        self.validate()?;

        let mut config = zenoh::Config::default();
        insert(&mut config, "mode", serde_json::to_string(&self.mode)?)?;
        if !self.connect.is_empty() {
            insert(
                &mut config,
                "connect/endpoints",
                serde_json::to_string(&self.connect)?,
            )?;
        }
        if !self.listen.is_empty() {
            insert(
                &mut config,
                "listen/endpoints",
                serde_json::to_string(&self.listen)?,
            )?;
        }
        Ok(config)
    }
}

fn insert(config: &mut zenoh::Config, key: &str, value: String) -> Result<()> {
    config
        .insert_json5(key, &value)
        .map_err(|e| BridgeError::Config(format!("Failed to set Zenoh '{}': {}", key, e)))
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Endpoint list and key space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusFastConfig {
    /// Key expression prefix (default: "modbus_fast")
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Endpoints to poll, one hub each
    pub endpoints: Vec<EndpointConfig>,
}

fn default_key_prefix() -> String {
    "modbus_fast".to_string()
}

impl BridgeConfig {
    /// Load and validate configuration from a JSON5 file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: BridgeConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.zenoh.validate()?;
        self.logging.level_filter()?;

        let prefix = &self.modbus_fast.key_prefix;
        if prefix.is_empty() || prefix.contains(['*', '$', '?', '#']) {
            return Err(BridgeError::Config(format!(
                "Invalid key_prefix '{}'",
                prefix
            )));
        }

        if self.modbus_fast.endpoints.is_empty() {
            return Err(BridgeError::Config(
                "At least one endpoint must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for endpoint in &self.modbus_fast.endpoints {
            endpoint.validate()?;

            // Names map onto key segments, so compare them slugified.
            if !seen.insert(slugify(&endpoint.name)) {
                return Err(BridgeError::Config(format!(
                    "Duplicate endpoint name '{}'",
                    endpoint.name
                )));
            }
        }

        Ok(())
    }
}
