//! One-shot read for commissioning a device.
//!
//! Connects once, issues a single read and reports the raw values. Useful to
//! check addressing and wiring before adding an endpoint to the bridge.

use clap::{Args, ValueEnum};
use modbus_fast_core::{
    ConnectionConfig, ModbusTransport, Parity, RawBlock, RegisterType, Transport, TransportError,
    timeout_from_secs,
};
use serde::Serialize;
use thiserror::Error;

/// Connection mode of a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMode {
    Tcp,
    Rtu,
}

/// What to read, named like the Modbus function tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    Holding,
    Input,
    Coils,
    Discrete,
}

impl From<ProbeKind> for RegisterType {
    fn from(kind: ProbeKind) -> Self {
        match kind {
            ProbeKind::Holding => RegisterType::Holding,
            ProbeKind::Input => RegisterType::Input,
            ProbeKind::Coils => RegisterType::Coil,
            ProbeKind::Discrete => RegisterType::Discrete,
        }
    }
}

/// Serial parity letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProbeParity {
    #[value(name = "N")]
    N,
    #[value(name = "E")]
    E,
    #[value(name = "O")]
    O,
}

impl From<ProbeParity> for Parity {
    fn from(parity: ProbeParity) -> Self {
        match parity {
            ProbeParity::N => Parity::None,
            ProbeParity::E => Parity::Even,
            ProbeParity::O => Parity::Odd,
        }
    }
}

/// Arguments of the `probe` command.
#[derive(Args, Debug, Clone)]
pub struct ProbeArgs {
    /// Connection mode
    #[arg(long, value_enum, default_value_t = ProbeMode::Tcp)]
    pub mode: ProbeMode,

    /// Modbus TCP host
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Modbus TCP port
    #[arg(long, default_value_t = 502)]
    pub port: u16,

    /// Serial port for RTU, e.g. /dev/ttyUSB0
    #[arg(long)]
    pub serial: Option<String>,

    /// Baud rate for RTU
    #[arg(long, default_value_t = 9600)]
    pub baud: u32,

    /// Parity for RTU
    #[arg(long, value_enum, default_value_t = ProbeParity::N)]
    pub parity: ProbeParity,

    /// Stop bits for RTU
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=2))]
    pub stopbits: u8,

    /// Byte size for RTU
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u8).range(7..=8))]
    pub bytesize: u8,

    /// What to read
    #[arg(long = "type", value_enum, default_value_t = ProbeKind::Holding)]
    pub kind: ProbeKind,

    /// Start address
    #[arg(long, default_value_t = 0)]
    pub address: u16,

    /// Number of items to read
    #[arg(long, default_value_t = 1)]
    pub count: u16,

    /// Modbus unit/device id
    #[arg(long, default_value_t = 1)]
    pub unit: u8,

    /// Socket/serial timeout in seconds
    #[arg(long, default_value_t = 3.0)]
    pub timeout: f64,
}

impl ProbeArgs {
    /// Connection described by the arguments.
    pub fn connection(&self) -> Result<ConnectionConfig, ProbeError> {
        match self.mode {
            ProbeMode::Tcp => Ok(ConnectionConfig::Tcp {
                host: self.host.clone(),
                port: self.port,
            }),
            ProbeMode::Rtu => {
                let serial = self.serial.clone().ok_or(ProbeError::MissingSerial)?;
                Ok(ConnectionConfig::Rtu {
                    serial,
                    baud_rate: self.baud,
                    parity: self.parity.into(),
                    stop_bits: self.stopbits,
                    data_bits: self.bytesize,
                })
            }
        }
    }
}

/// Values read by a probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ProbeValues {
    Bits(Vec<bool>),
    Words(Vec<u16>),
}

impl ProbeValues {
    pub fn len(&self) -> usize {
        match self {
            ProbeValues::Bits(bits) => bits.len(),
            ProbeValues::Words(words) => words.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<RawBlock> for ProbeValues {
    fn from(raw: RawBlock) -> Self {
        match raw {
            RawBlock::Bits(bits) => ProbeValues::Bits(bits),
            RawBlock::Words(words) => ProbeValues::Words(words),
        }
    }
}

/// Result of a successful probe, printed as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub mode: ProbeMode,
    #[serde(rename = "type")]
    pub kind: ProbeKind,
    pub unit: u8,
    pub address: u16,
    pub end_address: u32,
    pub count: usize,
    pub values: ProbeValues,
}

impl ProbeReport {
    pub fn new(args: &ProbeArgs, values: ProbeValues) -> Self {
        let count = values.len();
        Self {
            mode: args.mode,
            kind: args.kind,
            unit: args.unit,
            address: args.address,
            end_address: (u32::from(args.address) + count as u32).saturating_sub(1),
            count,
            values,
        }
    }
}

/// Probe failure. Each variant maps to a process exit code.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("--serial is required for RTU mode")]
    MissingSerial,

    #[error("Invalid timeout {0}")]
    InvalidTimeout(f64),

    #[error("Failed to connect to Modbus device: {0}")]
    Connect(TransportError),

    #[error("Modbus error: {0}")]
    Read(TransportError),

    #[error("No data returned")]
    NoData,
}

impl ProbeError {
    pub fn exit_code(&self) -> u8 {
        match self {
            ProbeError::MissingSerial | ProbeError::InvalidTimeout(_) => 2,
            ProbeError::Connect(_) => 3,
            ProbeError::Read(_) => 4,
            ProbeError::NoData => 5,
        }
    }
}

/// Connect, read once, disconnect.
pub async fn probe(args: &ProbeArgs) -> Result<ProbeReport, ProbeError> {
    let timeout =
        timeout_from_secs(args.timeout).ok_or(ProbeError::InvalidTimeout(args.timeout))?;

    let connection = args.connection()?;
    let mut transport = ModbusTransport::new(connection, args.unit, timeout);

    transport.connect().await.map_err(ProbeError::Connect)?;

    let result = transport
        .read_block(args.kind.into(), args.address, args.count)
        .await;
    transport.disconnect().await;

    let values = ProbeValues::from(result.map_err(ProbeError::Read)?);
    if values.is_empty() {
        return Err(ProbeError::NoData);
    }

    Ok(ProbeReport::new(args, values))
}
