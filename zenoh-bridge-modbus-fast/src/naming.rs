//! Point names, unique ids and key expressions.

use modbus_fast_core::{ConnectionConfig, EndpointConfig};

/// Lowercase `name` and replace anything outside `[a-z0-9]` with `_`.
pub fn slugify(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Address shown for point `index`, honouring `one_based_names`.
pub fn display_address(config: &EndpointConfig, index: usize) -> u32 {
    let address = u32::from(config.start_address) + index as u32;
    if config.one_based_names {
        address + 1
    } else {
        address
    }
}

/// Point label, e.g. `"Panel C12"`.
pub fn point_name(config: &EndpointConfig, index: usize) -> String {
    format!(
        "{} {}{}",
        config.name,
        config.register_type.letter(),
        display_address(config, index)
    )
}

/// Stable identifier of a point across restarts.
pub fn unique_id(config: &EndpointConfig, index: usize) -> String {
    format!(
        "modbus_fast_{}_{}",
        device_id(config).replace(':', "_"),
        display_address(config, index)
    )
}

/// `host:port:unit` for TCP, `serial:baud:unit` for RTU.
pub fn device_id(config: &EndpointConfig) -> String {
    match &config.connection {
        ConnectionConfig::Tcp { host, port } => format!("{}:{}:{}", host, port, config.unit_id),
        ConnectionConfig::Rtu {
            serial, baud_rate, ..
        } => format!("{}:{}:{}", serial, baud_rate, config.unit_id),
    }
}

/// Key expressions of one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointKeys {
    base: String,
}

impl EndpointKeys {
    pub fn new(key_prefix: &str, config: &EndpointConfig) -> Self {
        Self {
            base: format!("{}/{}", key_prefix, slugify(&config.name)),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// `<base>/<letter><address>`
    pub fn point(&self, config: &EndpointConfig, index: usize) -> String {
        format!(
            "{}/{}{}",
            self.base,
            config.register_type.letter(),
            display_address(config, index)
        )
    }

    pub fn availability(&self) -> String {
        format!("{}/@/availability", self.base)
    }

    pub fn diagnostics(&self) -> String {
        format!("{}/@/diagnostics", self.base)
    }

    pub fn device(&self) -> String {
        format!("{}/@/device", self.base)
    }

    /// Wildcard over everything this endpoint publishes.
    pub fn wildcard(&self) -> String {
        format!("{}/**", self.base)
    }
}

/// `<prefix>/@/status`
pub fn status_key(key_prefix: &str) -> String {
    format!("{}/@/status", key_prefix)
}

#[cfg(test)]
mod tests {
    use modbus_fast_core::RegisterType;

    use super::*;

    fn panel(register_type: RegisterType, one_based_names: bool) -> EndpointConfig {
        EndpointConfig {
            name: "Panel".to_string(),
            register_type,
            start_address: 10,
            count: 4,
            one_based_names,
            ..EndpointConfig::tcp("192.168.1.10", 5020)
        }
    }

    #[test]
    fn test_point_names_per_register_type() {
        assert_eq!(point_name(&panel(RegisterType::Holding, false), 0), "Panel H10");
        assert_eq!(point_name(&panel(RegisterType::Input, false), 1), "Panel R11");
        assert_eq!(point_name(&panel(RegisterType::Coil, false), 2), "Panel C12");
        assert_eq!(point_name(&panel(RegisterType::Discrete, false), 3), "Panel I13");
    }

    #[test]
    fn test_one_based_names() {
        let config = panel(RegisterType::Coil, true);
        assert_eq!(point_name(&config, 0), "Panel C11");
        assert_eq!(unique_id(&config, 0), "modbus_fast_192.168.1.10_5020_1_11");
    }

    #[test]
    fn test_unique_id_carries_unit_once() {
        let config = EndpointConfig::tcp("10.0.0.2", 502);
        assert_eq!(device_id(&config), "10.0.0.2:502:1");
        assert_eq!(unique_id(&config, 5), "modbus_fast_10.0.0.2_502_1_5");

        let config = EndpointConfig {
            unit_id: 12,
            ..config
        };
        assert_eq!(unique_id(&config, 0), "modbus_fast_10.0.0.2_502_12_0");
    }

    #[test]
    fn test_unique_id_rtu() {
        let config = EndpointConfig {
            unit_id: 7,
            ..EndpointConfig::rtu("/dev/ttyUSB0", 19200)
        };
        assert_eq!(device_id(&config), "/dev/ttyUSB0:19200:7");
        assert_eq!(unique_id(&config, 3), "modbus_fast_/dev/ttyUSB0_19200_7_3");
    }

    #[test]
    fn test_keys() {
        let config = EndpointConfig {
            name: "Line 2 / Doors".to_string(),
            ..panel(RegisterType::Discrete, false)
        };
        let keys = EndpointKeys::new("modbus_fast", &config);

        assert_eq!(keys.base(), "modbus_fast/line_2___doors");
        assert_eq!(keys.point(&config, 1), "modbus_fast/line_2___doors/I11");
        assert_eq!(keys.availability(), "modbus_fast/line_2___doors/@/availability");
        assert_eq!(keys.diagnostics(), "modbus_fast/line_2___doors/@/diagnostics");
        assert_eq!(keys.wildcard(), "modbus_fast/line_2___doors/**");
        assert_eq!(status_key("modbus_fast"), "modbus_fast/@/status");
    }
}
