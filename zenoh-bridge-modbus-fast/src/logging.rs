//! Tracing setup for the bridge binary.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{BridgeError, Result};

impl LoggingConfig {
    /// Parsed `level`.
    pub fn level_filter(&self) -> Result<LevelFilter> {
        self.level
            .trim()
            .parse()
            .map_err(|_| BridgeError::Config(format!("Invalid log level '{}'", self.level)))
    }

    /// Filter directives for `level`. Zenoh's own crates stay at `warn` so
    /// that `debug` shows cycle activity rather than transport chatter.
    pub fn directives(&self) -> Result<String> {
        self.level_filter()?;
        let level = self.level.trim().to_ascii_lowercase();
        Ok(format!(
            "{level},zenoh=warn,{}={level}",
            env!("CARGO_CRATE_NAME")
        ))
    }
}

/// Install the global subscriber. `RUST_LOG` replaces the configured filter.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.directives()?)
            .map_err(|e| BridgeError::Config(format!("Invalid log filter: {}", e)))?,
    };

    let output: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Text => fmt::layer().with_target(false).boxed(),
        LogFormat::Json => fmt::layer().json().flatten_event(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .try_init()
        .map_err(|e| BridgeError::Config(format!("Failed to initialize tracing: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logging(level: &str) -> LoggingConfig {
        LoggingConfig {
            level: level.to_string(),
            ..LoggingConfig::default()
        }
    }

    #[test]
    fn test_directives_keep_zenoh_quiet() {
        assert_eq!(
            logging("DEBUG").directives().unwrap(),
            "debug,zenoh=warn,zenoh_bridge_modbus_fast=debug"
        );
        assert_eq!(logging("info").level_filter().unwrap(), LevelFilter::INFO);
    }

    #[test]
    fn test_rejects_unknown_level() {
        assert!(matches!(
            logging("loud").directives(),
            Err(BridgeError::Config(_))
        ));
    }
}
