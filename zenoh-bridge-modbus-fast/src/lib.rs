//! Zenoh bridge for fast-polled Modbus bits.
//!
//! Every configured endpoint runs its own [`modbus_fast_core::PollHub`]. Value
//! changes, availability transitions and diagnostics are published to Zenoh
//! as JSON.
//!
//! # Key Expressions
//!
//! ```text
//! <prefix>/<endpoint>/<letter><address>      point value
//! <prefix>/<endpoint>/@/availability         connection availability
//! <prefix>/<endpoint>/@/diagnostics          failed cycles
//! <prefix>/<endpoint>/@/device               endpoint description
//! <prefix>/@/status                          bridge status
//! ```
//!
//! Where:
//! - `<endpoint>` - Endpoint name, slugified
//! - `<letter>` - `C` coil, `I` discrete, `H` holding, `R` input
//! - `<address>` - Point address, 1-based when `one_based_names` is set

pub mod bridge;
pub mod config;
pub mod error;
pub mod logging;
pub mod message;
pub mod naming;
pub mod probe;
pub mod publisher;
pub mod session;

pub use config::{
    BridgeConfig, LogFormat, LoggingConfig, ModbusFastConfig, ZenohConfig, ZenohMode,
};
pub use error::{BridgeError, Result};
pub use logging::init_tracing;
