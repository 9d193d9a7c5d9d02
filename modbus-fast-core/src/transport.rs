//! Transport client: the narrow connect/read/status contract the hub polls
//! through, and its tokio-modbus implementation.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::lookup_host;
use tokio::time::timeout;
use tokio_modbus::client::{Client as _, Context, Reader};
use tokio_modbus::prelude::*;
use tracing::{debug, warn};

use crate::config::{ConnectionConfig, EndpointConfig, Parity, RegisterType};
use crate::error::{ConfigError, ExceptionCode, TransportError};

/// Connection status of a transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No session.
    #[default]
    Disconnected,
    /// A connect attempt is in progress.
    Connecting,
    /// Session established and the last request succeeded.
    Connected,
    /// The last request failed at the transport level.
    Degraded,
}

impl ConnectionStatus {
    /// Whether point values are considered live.
    pub fn is_available(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Degraded => write!(f, "degraded"),
        }
    }
}

/// Raw result of one bulk read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawBlock {
    /// Coils or discrete inputs.
    Bits(Vec<bool>),
    /// Holding or input registers.
    Words(Vec<u16>),
}

impl RawBlock {
    /// Number of raw values.
    pub fn len(&self) -> usize {
        match self {
            RawBlock::Bits(bits) => bits.len(),
            RawBlock::Words(words) => words.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// "bit" or "word".
    pub fn shape(&self) -> &'static str {
        match self {
            RawBlock::Bits(_) => "bit",
            RawBlock::Words(_) => "word",
        }
    }
}

/// A connection to one Modbus endpoint.
///
/// The hub owns its transport exclusively and never issues two calls at once.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Establish the session. Does nothing when already connected.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Issue exactly one bulk read of `count` points starting at `start`.
    async fn read_block(
        &mut self,
        kind: RegisterType,
        start: u16,
        count: u16,
    ) -> Result<RawBlock, TransportError>;

    /// Close the session.
    async fn disconnect(&mut self);

    /// Current status, without blocking.
    ///
    /// The hub checks it before every read: anything but `Connected` sends
    /// it to reconnect without touching the wire.
    fn status(&self) -> ConnectionStatus;
}

/// [`Transport`] backed by tokio-modbus, over TCP or serial RTU.
pub struct ModbusTransport {
    connection: ConnectionConfig,
    unit_id: u8,
    timeout: Duration,
    ctx: Option<Context>,
    status: ConnectionStatus,
}

impl ModbusTransport {
    /// Create a disconnected transport.
    pub fn new(connection: ConnectionConfig, unit_id: u8, timeout: Duration) -> Self {
        Self {
            connection,
            unit_id,
            timeout,
            ctx: None,
            status: ConnectionStatus::Disconnected,
        }
    }

    /// Create a transport for an endpoint.
    pub fn from_config(config: &EndpointConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.connection.clone(),
            config.unit_id,
            config.timeout_duration()?,
        ))
    }

    /// Open a new client context.
    async fn open(&mut self) -> Result<Context, TransportError> {
        let slave = Slave(self.unit_id);

        match &self.connection {
            ConnectionConfig::Tcp { host, port } => {
                let connect = async {
                    let addr = lookup_host((host.as_str(), *port))
                        .await
                        .map_err(|e| {
                            TransportError::Connection(format!("Cannot resolve '{}': {}", host, e))
                        })?
                        .next()
                        .ok_or_else(|| {
                            TransportError::Connection(format!("No address for '{}'", host))
                        })?;

                    tcp::connect_slave(addr, slave)
                        .await
                        .map_err(|e| TransportError::Connection(e.to_string()))
                };

                timeout(self.timeout, connect)
                    .await
                    .map_err(|_| TransportError::Connection("Connection timeout".to_string()))?
            }
            ConnectionConfig::Rtu {
                serial,
                baud_rate,
                parity,
                stop_bits,
                data_bits,
            } => {
                let parity = match parity {
                    Parity::None => tokio_serial::Parity::None,
                    Parity::Even => tokio_serial::Parity::Even,
                    Parity::Odd => tokio_serial::Parity::Odd,
                };

                let stop_bits = match stop_bits {
                    2 => tokio_serial::StopBits::Two,
                    _ => tokio_serial::StopBits::One,
                };

                let data_bits = match data_bits {
                    7 => tokio_serial::DataBits::Seven,
                    _ => tokio_serial::DataBits::Eight,
                };

                let builder = tokio_serial::new(serial, *baud_rate)
                    .parity(parity)
                    .stop_bits(stop_bits)
                    .data_bits(data_bits)
                    .timeout(self.timeout);

                let stream = tokio_serial::SerialStream::open(&builder).map_err(|e| {
                    TransportError::Connection(format!("Serial open failed: {}", e))
                })?;

                Ok(rtu::attach_slave(stream, slave))
            }
        }
    }

    /// Drop the session after a transport-level failure.
    fn fail(&mut self, err: TransportError) -> TransportError {
        if err.is_transport_level() {
            self.ctx = None;
            self.status = ConnectionStatus::Degraded;
        }
        err
    }
}

#[async_trait]
impl Transport for ModbusTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.ctx.is_some() && self.status == ConnectionStatus::Connected {
            return Ok(());
        }

        self.status = ConnectionStatus::Connecting;
        debug!(connection = %self.connection, unit_id = self.unit_id, "Connecting");

        match self.open().await {
            Ok(ctx) => {
                self.ctx = Some(ctx);
                self.status = ConnectionStatus::Connected;
                Ok(())
            }
            Err(e) => {
                self.ctx = None;
                self.status = ConnectionStatus::Disconnected;
                Err(e)
            }
        }
    }

    async fn read_block(
        &mut self,
        kind: RegisterType,
        start: u16,
        count: u16,
    ) -> Result<RawBlock, TransportError> {
        let limit = self.timeout;
        let Some(ctx) = self.ctx.as_mut() else {
            let err = TransportError::Io("Not connected".to_string());
            return Err(self.fail(err));
        };

        let request = async {
            match kind {
                RegisterType::Coil => ctx
                    .read_coils(start, count)
                    .await
                    .map(|r| r.map(RawBlock::Bits)),
                RegisterType::Discrete => ctx
                    .read_discrete_inputs(start, count)
                    .await
                    .map(|r| r.map(RawBlock::Bits)),
                RegisterType::Holding => ctx
                    .read_holding_registers(start, count)
                    .await
                    .map(|r| r.map(RawBlock::Words)),
                RegisterType::Input => ctx
                    .read_input_registers(start, count)
                    .await
                    .map(|r| r.map(RawBlock::Words)),
            }
        };

        let result = match timeout(limit, request).await {
            Err(_) => Err(TransportError::Timeout(limit)),
            Ok(Err(e)) => Err(TransportError::Io(e.to_string())),
            Ok(Ok(Err(code))) => Err(TransportError::Protocol {
                function: kind.function_code(),
                exception: ExceptionCode(u8::from(code)),
            }),
            Ok(Ok(Ok(block))) => Ok(block),
        };

        match result {
            Ok(block) => {
                self.status = ConnectionStatus::Connected;
                Ok(block)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn disconnect(&mut self) {
        if let Some(mut ctx) = self.ctx.take() {
            match timeout(self.timeout, ctx.disconnect()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(connection = %self.connection, error = %e, "Disconnect failed")
                }
                Err(_) => warn!(connection = %self.connection, "Disconnect timed out"),
            }
        }
        self.status = ConnectionStatus::Disconnected;
    }

    fn status(&self) -> ConnectionStatus {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use tokio::net::TcpListener;
    use tokio_modbus::server::Service;
    use tokio_modbus::server::tcp::{Server, accept_tcp_connection};

    use super::*;

    /// Answers coil reads with an alternating pattern and rejects holding
    /// register reads with "Illegal Data Address".
    #[derive(Clone, Copy)]
    struct Panel;

    impl Service for Panel {
        type Request = tokio_modbus::Request<'static>;
        type Response = tokio_modbus::Response;
        type Exception = tokio_modbus::ExceptionCode;
        type Future = std::future::Ready<Result<Self::Response, Self::Exception>>;

        fn call(&self, req: Self::Request) -> Self::Future {
            let response = match req {
                tokio_modbus::Request::ReadCoils(_, count) => Ok(tokio_modbus::Response::ReadCoils(
                    (0..count).map(|i| i % 2 == 0).collect(),
                )),
                tokio_modbus::Request::ReadHoldingRegisters(..) => {
                    Err(tokio_modbus::ExceptionCode::IllegalDataAddress)
                }
                _ => Err(tokio_modbus::ExceptionCode::IllegalFunction),
            };
            std::future::ready(response)
        }
    }

    async fn serve_panel() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let server = Server::new(listener);
            let new_service = |_socket_addr| Ok(Some(Panel));
            let on_connected = |stream, socket_addr| async move {
                accept_tcp_connection(stream, socket_addr, new_service)
            };
            let _ = server.serve(&on_connected, |_err| {}).await;
        });
        addr
    }

    fn tcp_transport(addr: SocketAddr, timeout: Duration) -> ModbusTransport {
        let connection = ConnectionConfig::Tcp {
            host: addr.ip().to_string(),
            port: addr.port(),
        };
        ModbusTransport::new(connection, 1, timeout)
    }

    #[test]
    fn test_raw_block_shape() {
        let bits = RawBlock::Bits(vec![true, false, true]);
        assert_eq!(bits.len(), 3);
        assert_eq!(bits.shape(), "bit");

        let words = RawBlock::Words(vec![]);
        assert!(words.is_empty());
        assert_eq!(words.shape(), "word");
    }

    #[test]
    fn test_status_availability() {
        assert!(ConnectionStatus::Connected.is_available());
        assert!(!ConnectionStatus::Degraded.is_available());
        assert!(!ConnectionStatus::Connecting.is_available());
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Disconnected);
        assert_eq!(ConnectionStatus::Degraded.to_string(), "degraded");
    }

    #[tokio::test]
    async fn test_read_without_session_degrades() {
        let mut transport = ModbusTransport::from_config(&EndpointConfig::tcp("127.0.0.1", 502)).unwrap();
        assert_eq!(transport.status(), ConnectionStatus::Disconnected);

        let err = transport
            .read_block(RegisterType::Coil, 0, 4)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
        assert_eq!(transport.status(), ConnectionStatus::Degraded);

        transport.disconnect().await;
        assert_eq!(transport.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_exception_response_keeps_session() {
        let addr = serve_panel().await;
        let mut transport = tcp_transport(addr, Duration::from_secs(2));
        transport.connect().await.unwrap();
        assert_eq!(transport.status(), ConnectionStatus::Connected);

        let err = transport
            .read_block(RegisterType::Holding, 100, 2)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::Protocol {
                function: 0x03,
                exception: ExceptionCode::ILLEGAL_DATA_ADDRESS,
            }
        );
        assert_eq!(err.exception_function_code(), Some(0x83));
        assert_eq!(transport.status(), ConnectionStatus::Connected);

        // The same session keeps answering.
        assert_eq!(
            transport.read_block(RegisterType::Coil, 0, 3).await,
            Ok(RawBlock::Bits(vec![true, false, true]))
        );

        transport.disconnect().await;
        assert_eq!(transport.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_silent_device_times_out_and_drops_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let silent = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let limit = Duration::from_millis(200);
        let mut transport = tcp_transport(addr, limit);
        transport.connect().await.unwrap();

        let err = transport
            .read_block(RegisterType::Coil, 0, 8)
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Timeout(limit));
        assert_eq!(transport.status(), ConnectionStatus::Degraded);

        // No late answer can be read on the old session.
        let err = transport
            .read_block(RegisterType::Coil, 0, 8)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));

        silent.abort();
    }
}
