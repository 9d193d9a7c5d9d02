//! Modbus Fast Core
//!
//! A polling hub that exposes a contiguous block of Modbus points as
//! up-to-date boolean states. Each cycle issues a single bulk read, decodes
//! the response, detects which points changed and pushes the changes to
//! subscribers.
//!
//! - [`config`] - Endpoint configuration and validation
//! - [`transport`] - The [`Transport`] seam and the tokio-modbus implementation
//! - [`decode`] - Raw response to boolean sequence
//! - [`diff`] - Change detection against the last published values
//! - [`dispatch`] - Per-point, availability and diagnostic subscriptions
//! - [`scheduler`] - The polling loop and its state machine
//! - [`mock`] - Scripted transport for tests and demos
//!
//! # Example
//!
//! ```ignore
//! use modbus_fast_core::{EndpointConfig, PollHub, RegisterType};
//!
//! let config = EndpointConfig {
//!     register_type: RegisterType::Coil,
//!     count: 16,
//!     ..EndpointConfig::tcp("192.168.1.10", 502)
//! };
//!
//! let hub = PollHub::modbus(config)?;
//! hub.dispatcher().subscribe(3, |value| println!("C3 is now {value}"));
//!
//! let handle = hub.start();
//! // ...
//! handle.stop().await;
//! ```

pub mod backoff;
pub mod config;
pub mod decode;
pub mod diff;
pub mod dispatch;
pub mod error;
pub mod mock;
pub mod points;
pub mod scheduler;
pub mod stats;
pub mod transport;

pub use config::{ConnectionConfig, EndpointConfig, Parity, RegisterType, timeout_from_secs};
pub use decode::decode;
pub use diff::{ChangeDetector, changed_indices};
pub use dispatch::{Diagnostic, DiagnosticKind, Dispatcher, PointSubscriber, SubscriptionId};
pub use error::{ConfigError, DecodeError, ExceptionCode, HubError, TransportError};
pub use points::{PointState, PointTable, SharedPoints};
pub use scheduler::{CycleReport, HubHandle, PollHub, SchedulerState};
pub use stats::{CycleStats, HubStats};
pub use transport::{ConnectionStatus, ModbusTransport, RawBlock, Transport};
