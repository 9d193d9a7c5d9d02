//! Publish/subscribe between the scheduler and point consumers.
//!
//! Three channels are offered:
//! - per-index value changes, delivered in ascending index order
//! - availability, derived from [`ConnectionStatus`]
//! - diagnostics, for failures that do not affect availability
//!
//! Delivery is synchronous with the cycle that produced it. Each callback is
//! isolated: a panicking subscriber is logged and the remaining subscribers
//! still receive the event.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{HubError, TransportError};
use crate::transport::ConnectionStatus;

/// Handle returned by every `subscribe*` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// A consumer of one point, such as a presentation-layer entity.
pub trait PointSubscriber: Send + Sync {
    /// The point's value was reported changed.
    fn on_value_changed(&self, value: bool);

    /// The endpoint's availability changed.
    fn on_availability_changed(&self, status: ConnectionStatus);
}

/// Failure classification of a [`Diagnostic`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// The device answered with an exception response.
    ProtocolException { function: u8, exception_code: u8 },
    /// The response could not be decoded.
    Decode,
    /// The request timed out.
    Timeout,
    /// Mid-session I/O failure.
    Transport,
    /// A connect attempt failed.
    Connection,
}

/// A failure event, for logging and display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    #[serde(flatten)]
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(endpoint: impl Into<String>, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            endpoint: endpoint.into(),
            kind,
            message: message.into(),
        }
    }

    /// Classify a hub error.
    pub fn from_error(endpoint: impl Into<String>, err: &HubError) -> Self {
        let kind = match err {
            HubError::Transport(TransportError::Protocol {
                function,
                exception,
            }) => DiagnosticKind::ProtocolException {
                function: *function,
                exception_code: exception.code(),
            },
            HubError::Transport(TransportError::Timeout(_)) => DiagnosticKind::Timeout,
            HubError::Transport(TransportError::Io(_)) => DiagnosticKind::Transport,
            HubError::Transport(TransportError::Connection(_)) | HubError::Config(_) => {
                DiagnosticKind::Connection
            }
            HubError::Decode(_) => DiagnosticKind::Decode,
        };
        Self::new(endpoint, kind, err.to_string())
    }
}

type ValueCallback = Arc<dyn Fn(bool) + Send + Sync>;
type AvailabilityCallback = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;
type DiagnosticCallback = Arc<dyn Fn(&Diagnostic) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    points: BTreeMap<usize, Vec<(SubscriptionId, ValueCallback)>>,
    availability: Vec<(SubscriptionId, AvailabilityCallback)>,
    diagnostics: Vec<(SubscriptionId, DiagnosticCallback)>,
    last_availability: Option<ConnectionStatus>,
}

impl Registry {
    fn next_id(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }
}

/// Subscription registry for one hub.
#[derive(Default)]
pub struct Dispatcher {
    registry: Mutex<Registry>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.lock();
        f.debug_struct("Dispatcher")
            .field("points", &registry.points.len())
            .field("availability", &registry.availability.len())
            .field("diagnostics", &registry.diagnostics.len())
            .field("last_availability", &registry.last_availability)
            .finish()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Call `callback` with the new value whenever point `index` is reported.
    pub fn subscribe<F>(&self, index: usize, callback: F) -> SubscriptionId
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let mut registry = self.lock();
        let id = registry.next_id();
        registry
            .points
            .entry(index)
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Call `callback` on every availability transition.
    pub fn subscribe_availability<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(ConnectionStatus) + Send + Sync + 'static,
    {
        let mut registry = self.lock();
        let id = registry.next_id();
        registry.availability.push((id, Arc::new(callback)));
        id
    }

    /// Call `callback` for every diagnostic event.
    pub fn subscribe_diagnostics<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Diagnostic) + Send + Sync + 'static,
    {
        let mut registry = self.lock();
        let id = registry.next_id();
        registry.diagnostics.push((id, Arc::new(callback)));
        id
    }

    /// Register a [`PointSubscriber`] for point `index` and for availability.
    ///
    /// Returns the value and availability subscription ids.
    pub fn subscribe_point(
        &self,
        index: usize,
        subscriber: Arc<dyn PointSubscriber>,
    ) -> (SubscriptionId, SubscriptionId) {
        let on_value = Arc::clone(&subscriber);
        let value_id = self.subscribe(index, move |value| on_value.on_value_changed(value));
        let availability_id =
            self.subscribe_availability(move |status| subscriber.on_availability_changed(status));
        (value_id, availability_id)
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.lock();
        let mut removed = false;

        for callbacks in registry.points.values_mut() {
            let before = callbacks.len();
            callbacks.retain(|(sid, _)| *sid != id);
            removed |= callbacks.len() != before;
        }
        registry.points.retain(|_, callbacks| !callbacks.is_empty());

        let before = registry.availability.len();
        registry.availability.retain(|(sid, _)| *sid != id);
        removed |= registry.availability.len() != before;

        let before = registry.diagnostics.len();
        registry.diagnostics.retain(|(sid, _)| *sid != id);
        removed |= registry.diagnostics.len() != before;

        removed
    }

    /// Number of value subscribers for a point.
    pub fn subscriber_count(&self, index: usize) -> usize {
        self.lock().points.get(&index).map_or(0, Vec::len)
    }

    /// Last availability delivered, if any.
    pub fn availability(&self) -> Option<ConnectionStatus> {
        self.lock().last_availability
    }

    /// Deliver `values[i]` to the subscribers of every index in `changed`.
    ///
    /// Indices are delivered in ascending order. Returns the number of
    /// callbacks invoked.
    pub fn publish(&self, changed: &[usize], values: &[bool]) -> usize {
        let mut ordered: Vec<usize> = changed.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        // Callbacks run without the lock held so they may (un)subscribe.
        let targets: Vec<(usize, bool, Vec<ValueCallback>)> = {
            let registry = self.lock();
            ordered
                .into_iter()
                .filter_map(|index| {
                    let value = *values.get(index)?;
                    let callbacks = registry.points.get(&index)?;
                    Some((index, value, callbacks.iter().map(|(_, cb)| Arc::clone(cb)).collect()))
                })
                .collect()
        };

        let mut delivered = 0;
        for (index, value, callbacks) in targets {
            for callback in callbacks {
                if catch_unwind(AssertUnwindSafe(|| (*callback)(value))).is_err() {
                    warn!(index, value, "Point subscriber panicked");
                }
                delivered += 1;
            }
        }
        delivered
    }

    /// Deliver an availability transition.
    ///
    /// `Connecting` is not an availability state and is ignored, as is a
    /// repeat of the last delivered status. Returns whether it was delivered.
    pub fn publish_availability(&self, status: ConnectionStatus) -> bool {
        if status == ConnectionStatus::Connecting {
            return false;
        }

        let callbacks: Vec<AvailabilityCallback> = {
            let mut registry = self.lock();
            if registry.last_availability == Some(status) {
                return false;
            }
            registry.last_availability = Some(status);
            registry
                .availability
                .iter()
                .map(|(_, cb)| Arc::clone(cb))
                .collect()
        };

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| (*callback)(status))).is_err() {
                warn!(%status, "Availability subscriber panicked");
            }
        }
        true
    }

    /// Deliver a diagnostic event.
    pub fn publish_diagnostic(&self, diagnostic: &Diagnostic) {
        let callbacks: Vec<DiagnosticCallback> = self
            .lock()
            .diagnostics
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| (*callback)(diagnostic))).is_err() {
                warn!(endpoint = %diagnostic.endpoint, "Diagnostic subscriber panicked");
            }
        }
    }
}
