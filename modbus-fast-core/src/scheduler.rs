//! The polling loop.
//!
//! A [`PollHub`] owns one transport and drives it from a single tokio task:
//!
//! ```text
//! Idle ──start──▶ Polling ◀──retry ok── Reconnecting
//!                   │  ▲                    ▲  │
//!                   │  └─tick (ok, protocol/decode failure)
//!                   └──transport failure────┘  │
//!        any state ──stop──▶ Stopped ◀─────────┘
//! ```
//!
//! Cycles never overlap: the next tick is only awaited once the previous
//! cycle's dispatch has returned. Stop is observed between cycles and during
//! the reconnect delay; a read already on the wire is allowed to finish.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval, sleep};
use tracing::{debug, error, info, trace, warn};

use crate::backoff::ReconnectBackoff;
use crate::config::EndpointConfig;
use crate::decode::decode;
use crate::diff::ChangeDetector;
use crate::dispatch::{Diagnostic, Dispatcher};
use crate::error::{ConfigError, HubError, TransportError};
use crate::points::SharedPoints;
use crate::stats::{CycleStats, HubStats};
use crate::transport::{ConnectionStatus, ModbusTransport, Transport};

/// Lifecycle of a hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    /// Created, not yet connected.
    Idle,
    /// Connected and reading every sample period.
    Polling,
    /// Waiting to re-establish the session.
    Reconnecting,
    /// Shut down. Terminal.
    Stopped,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Polling => "polling",
            SchedulerState::Reconnecting => "reconnecting",
            SchedulerState::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// Result of one successful cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Decoded block, one entry per point.
    pub values: Vec<bool>,
    /// Indices that were dispatched, ascending.
    pub changed: Vec<usize>,
}

/// A configured, not yet running hub.
///
/// Subscribe through [`PollHub::dispatcher`] before calling
/// [`PollHub::start`] to see the first cycle.
pub struct PollHub<T: Transport> {
    config: EndpointConfig,
    transport: T,
    dispatcher: Arc<Dispatcher>,
    points: SharedPoints,
    stats: Arc<CycleStats>,
}

impl PollHub<ModbusTransport> {
    /// Hub polling a real device over tokio-modbus.
    pub fn modbus(config: EndpointConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let transport = ModbusTransport::from_config(&config)?;
        Self::new(config, transport)
    }
}

impl<T: Transport> PollHub<T> {
    /// Validate `config` and bind it to `transport`.
    pub fn new(config: EndpointConfig, transport: T) -> Result<Self, ConfigError> {
        config.validate()?;

        let points = SharedPoints::new(usize::from(config.count));
        Ok(Self {
            config,
            transport,
            dispatcher: Arc::new(Dispatcher::new()),
            points,
            stats: Arc::new(CycleStats::new()),
        })
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn points(&self) -> SharedPoints {
        self.points.clone()
    }

    /// Spawn the polling task. Must be called within a tokio runtime.
    pub fn start(self) -> HubHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(SchedulerState::Idle);

        let name = self.config.name.clone();
        let dispatcher = Arc::clone(&self.dispatcher);
        let points = self.points.clone();
        let stats = Arc::clone(&self.stats);

        let worker = Worker {
            detector: ChangeDetector::new(self.config.only_on_change),
            config: self.config,
            transport: self.transport,
            dispatcher: self.dispatcher,
            points: self.points,
            stats: self.stats,
            state: state_tx,
        };
        let task = tokio::spawn(worker.run(stop_rx));

        HubHandle {
            name,
            stop: stop_tx,
            state: state_rx,
            task,
            dispatcher,
            points,
            stats,
        }
    }
}

/// Control handle of a running hub.
///
/// Dropping the handle stops the hub.
pub struct HubHandle {
    name: String,
    stop: watch::Sender<bool>,
    state: watch::Receiver<SchedulerState>,
    task: JoinHandle<()>,
    dispatcher: Arc<Dispatcher>,
    points: SharedPoints,
    stats: Arc<CycleStats>,
}

impl HubHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the hub to stop without waiting for it.
    pub fn request_stop(&self) {
        self.stop.send_replace(true);
    }

    /// Stop the hub and wait until the transport is closed.
    pub async fn stop(self) {
        self.request_stop();
        if let Err(e) = self.task.await {
            error!("Hub '{}': polling task failed: {}", self.name, e);
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Receiver notified on every state transition.
    pub fn state_changes(&self) -> watch::Receiver<SchedulerState> {
        self.state.clone()
    }

    /// Wait until the hub enters `target`. Returns `false` if the hub
    /// terminated without reaching it.
    pub async fn wait_for_state(&self, target: SchedulerState) -> bool {
        let mut rx = self.state.clone();
        rx.wait_for(|state| *state == target).await.is_ok()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn points(&self) -> SharedPoints {
        self.points.clone()
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn stats(&self) -> HubStats {
        self.stats.snapshot()
    }

    /// Last availability delivered to subscribers.
    pub fn availability(&self) -> ConnectionStatus {
        self.dispatcher
            .availability()
            .unwrap_or(ConnectionStatus::Disconnected)
    }
}

impl fmt::Debug for HubHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubHandle")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

/// State owned by the polling task.
struct Worker<T: Transport> {
    config: EndpointConfig,
    transport: T,
    detector: ChangeDetector,
    dispatcher: Arc<Dispatcher>,
    points: SharedPoints,
    stats: Arc<CycleStats>,
    state: watch::Sender<SchedulerState>,
}

impl<T: Transport> Worker<T> {
    async fn run(mut self, mut stop: watch::Receiver<bool>) {
        let period = self.config.sample_period();
        info!(
            "Hub '{}': polling {} {} {}..={} unit {} every {}ms",
            self.config.name,
            self.config.connection,
            self.config.register_type,
            self.config.start_address,
            self.config.end_address(),
            self.config.unit_id,
            period.as_millis()
        );

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut backoff = ReconnectBackoff::new(period);

        let mut next = self.connect_first().await;
        while next != SchedulerState::Stopped {
            self.set_state(next);
            next = match next {
                SchedulerState::Polling => {
                    tokio::select! {
                        biased;
                        _ = stop.changed() => SchedulerState::Stopped,
                        deadline = ticker.tick() => self.tick(deadline, period).await,
                    }
                }
                SchedulerState::Reconnecting => {
                    self.reconnect(&mut backoff, &mut ticker, &mut stop).await
                }
                SchedulerState::Idle | SchedulerState::Stopped => SchedulerState::Stopped,
            };
        }

        self.transport.disconnect().await;
        self.dispatcher
            .publish_availability(ConnectionStatus::Disconnected);
        self.set_state(SchedulerState::Stopped);

        let stats = self.stats.snapshot();
        info!(
            "Hub '{}': stopped after {} cycles ({} failed, {} ticks skipped, {} reconnect attempts)",
            self.config.name,
            stats.cycles_total,
            stats.cycles_failed,
            stats.ticks_skipped,
            stats.reconnect_attempts
        );
    }

    fn set_state(&self, next: SchedulerState) {
        let changed = self.state.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
        if changed {
            debug!("Hub '{}': state -> {}", self.config.name, next);
        }
    }

    async fn connect_first(&mut self) -> SchedulerState {
        match self.transport.connect().await {
            Ok(()) => {
                info!("Hub '{}': connected to {}", self.config.name, self.config.connection);
                self.dispatcher
                    .publish_availability(ConnectionStatus::Connected);
                SchedulerState::Polling
            }
            Err(e) => {
                warn!(
                    "Hub '{}': connection to {} failed: {}",
                    self.config.name, self.config.connection, e
                );
                self.dispatcher
                    .publish_availability(ConnectionStatus::Disconnected);
                self.diagnose(&HubError::from(e));
                SchedulerState::Reconnecting
            }
        }
    }

    async fn tick(&mut self, deadline: Instant, period: Duration) -> SchedulerState {
        self.stats
            .record_tick(Instant::now().saturating_duration_since(deadline), period);

        let started = Instant::now();
        let status = self.transport.status();
        let result = if status.is_available() {
            self.poll_once().await
        } else {
            // The transport noticed the link is gone; don't put a read on it.
            Err(HubError::from(TransportError::Io(format!(
                "Transport reports {}",
                status
            ))))
        };
        let elapsed = started.elapsed();

        match result {
            Ok(report) => {
                self.stats.record_success(elapsed, report.changed.len());
                trace!(
                    "Hub '{}': cycle took {}us, {} changed",
                    self.config.name,
                    elapsed.as_micros(),
                    report.changed.len()
                );
                SchedulerState::Polling
            }
            Err(e) if e.requires_reconnect() => {
                self.stats.record_failure(elapsed);
                warn!("Hub '{}': transport failure: {}", self.config.name, e);
                self.dispatcher
                    .publish_availability(ConnectionStatus::Degraded);
                self.diagnose(&e);
                SchedulerState::Reconnecting
            }
            Err(e) => {
                self.stats.record_failure(elapsed);
                warn!("Hub '{}': cycle skipped: {}", self.config.name, e);
                self.diagnose(&e);
                SchedulerState::Polling
            }
        }
    }

    /// One read, decode, diff and dispatch.
    async fn poll_once(&mut self) -> Result<CycleReport, HubError> {
        let kind = self.config.register_type;
        let raw = self
            .transport
            .read_block(kind, self.config.start_address, self.config.count)
            .await?;

        let values = decode(kind, &raw, usize::from(self.config.count))?;
        let changed = self.detector.diff(&values);

        if !changed.is_empty() {
            // Points are written before any subscriber sees the change.
            self.points.write().apply(&changed, &values, Utc::now());
            self.dispatcher.publish(&changed, &values);
        }

        Ok(CycleReport { values, changed })
    }

    async fn reconnect(
        &mut self,
        backoff: &mut ReconnectBackoff,
        ticker: &mut Interval,
        stop: &mut watch::Receiver<bool>,
    ) -> SchedulerState {
        let delay = backoff.next_delay();
        debug!(
            "Hub '{}': reconnecting in {}ms",
            self.config.name,
            delay.as_millis()
        );

        tokio::select! {
            biased;
            _ = stop.changed() => return SchedulerState::Stopped,
            _ = sleep(delay) => {}
        }

        self.stats.record_reconnect_attempt();
        match self.transport.connect().await {
            Ok(()) => {
                info!(
                    "Hub '{}': reconnected to {}",
                    self.config.name, self.config.connection
                );
                backoff.reset();
                ticker.reset_immediately();
                self.dispatcher
                    .publish_availability(ConnectionStatus::Connected);
                SchedulerState::Polling
            }
            Err(e) => {
                warn!("Hub '{}': reconnect failed: {}", self.config.name, e);
                self.dispatcher
                    .publish_availability(ConnectionStatus::Disconnected);
                self.diagnose(&HubError::from(e));
                SchedulerState::Reconnecting
            }
        }
    }

    fn diagnose(&self, err: &HubError) {
        self.dispatcher
            .publish_diagnostic(&Diagnostic::from_error(&self.config.name, err));
    }
}
