//! Scripted in-memory transport for testing.
//!
//! Provides a [`Transport`] whose connect and read outcomes are queued up
//! front, without any device or network. Clones share the same script, so a
//! test keeps one clone to drive and inspect the transport while the hub owns
//! the other.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::RegisterType;
use crate::error::{ExceptionCode, TransportError};
use crate::transport::{ConnectionStatus, RawBlock, Transport};

/// One recorded read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    pub kind: RegisterType,
    pub start: u16,
    pub count: u16,
}

#[derive(Debug, Default)]
struct MockState {
    status: ConnectionStatus,
    connect_script: VecDeque<Result<(), TransportError>>,
    read_script: VecDeque<Result<RawBlock, TransportError>>,
    /// Served again once the read script runs dry.
    last_read: Option<Result<RawBlock, TransportError>>,
    read_delay: Duration,
    connects: usize,
    disconnects: usize,
    requests: Vec<ReadRequest>,
    in_flight: usize,
    max_in_flight: usize,
}

/// Scripted [`Transport`].
///
/// - Connect attempts succeed unless a failure was queued.
/// - Reads pop the next queued response; when the queue is empty the last
///   response is served again. Reads with nothing scripted fail with
///   [`TransportError::Io`].
/// - Transport-level read failures move the status to `Degraded`; exception
///   responses leave it untouched.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue the outcome of the next connect attempt.
    pub fn push_connect(&self, result: Result<(), TransportError>) -> &Self {
        self.lock().connect_script.push_back(result);
        self
    }

    /// Queue `n` failing connect attempts.
    pub fn fail_connects(&self, n: usize) -> &Self {
        for _ in 0..n {
            self.push_connect(Err(TransportError::Connection(
                "Connection refused".to_string(),
            )));
        }
        self
    }

    /// Queue the outcome of the next read.
    pub fn push_read(&self, result: Result<RawBlock, TransportError>) -> &Self {
        self.lock().read_script.push_back(result);
        self
    }

    /// Queue a bit response, `0` meaning off.
    pub fn push_bits(&self, bits: &[u8]) -> &Self {
        self.push_read(Ok(RawBlock::Bits(bits.iter().map(|b| *b != 0).collect())))
    }

    /// Queue a register response.
    pub fn push_words(&self, words: &[u16]) -> &Self {
        self.push_read(Ok(RawBlock::Words(words.to_vec())))
    }

    /// Queue an exception response for `kind`.
    pub fn push_exception(&self, kind: RegisterType, exception: ExceptionCode) -> &Self {
        self.push_read(Err(TransportError::Protocol {
            function: kind.function_code(),
            exception,
        }))
    }

    /// Queue a mid-session I/O failure.
    pub fn push_io_error(&self, message: &str) -> &Self {
        self.push_read(Err(TransportError::Io(message.to_string())))
    }

    /// Make every read take `delay` before answering.
    pub fn set_read_delay(&self, delay: Duration) -> &Self {
        self.lock().read_delay = delay;
        self
    }

    /// Mark the link lost without failing a call, as a transport that
    /// notices a dead peer between requests would.
    pub fn drop_link(&self) -> &Self {
        self.lock().status = ConnectionStatus::Degraded;
        self
    }

    /// Number of connect attempts so far.
    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn disconnects(&self) -> usize {
        self.lock().disconnects
    }

    /// Number of reads issued so far.
    pub fn reads(&self) -> usize {
        self.lock().requests.len()
    }

    /// Every read issued so far.
    pub fn requests(&self) -> Vec<ReadRequest> {
        self.lock().requests.clone()
    }

    /// Highest number of reads ever outstanding at once.
    pub fn max_in_flight(&self) -> usize {
        self.lock().max_in_flight
    }

    /// Reads currently outstanding.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.status == ConnectionStatus::Connected {
            return Ok(());
        }

        state.connects += 1;
        let result = state.connect_script.pop_front().unwrap_or(Ok(()));
        state.status = match result {
            Ok(()) => ConnectionStatus::Connected,
            Err(_) => ConnectionStatus::Disconnected,
        };
        result
    }

    async fn read_block(
        &mut self,
        kind: RegisterType,
        start: u16,
        count: u16,
    ) -> Result<RawBlock, TransportError> {
        let delay = {
            let mut state = self.lock();
            state.requests.push(ReadRequest { kind, start, count });
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            state.read_delay
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        state.in_flight -= 1;

        let result = if state.status != ConnectionStatus::Connected {
            Err(TransportError::Io("Not connected".to_string()))
        } else {
            match state.read_script.pop_front() {
                Some(result) => {
                    state.last_read = Some(result.clone());
                    result
                }
                None => state.last_read.clone().unwrap_or_else(|| {
                    Err(TransportError::Io("No scripted response".to_string()))
                }),
            }
        };

        if let Err(e) = &result {
            if e.is_transport_level() {
                state.status = ConnectionStatus::Degraded;
            }
        }
        result
    }

    async fn disconnect(&mut self) {
        let mut state = self.lock();
        state.disconnects += 1;
        state.status = ConnectionStatus::Disconnected;
    }

    fn status(&self) -> ConnectionStatus {
        self.lock().status
    }
}
