//! Wiring between polling hubs and Zenoh.
//!
//! Subscriber callbacks run inside the polling cycle, so they only serialize
//! the event and hand it to a bounded channel. A single forwarder task drains
//! the channel and performs the Zenoh puts.

use std::future::Future;
use std::sync::Arc;

use modbus_fast_core::{Dispatcher, EndpointConfig, HubHandle, PollHub, SubscriptionId};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::error::Result;
use crate::message::{AvailabilityMessage, BridgeStatus, DeviceMessage, PointMessage};
use crate::naming::{EndpointKeys, slugify};
use crate::publisher::Publisher;

/// Name reported in the bridge status.
pub const BRIDGE_NAME: &str = "modbus_fast";

/// Events buffered between the hubs and the forwarder.
pub const OUTBOUND_CAPACITY: usize = 4096;

/// A serialized payload waiting to be put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub key: String,
    pub payload: String,
}

fn enqueue<T: Serialize>(tx: &mpsc::Sender<Outbound>, key: String, message: &T) {
    let payload = match serde_json::to_string(message) {
        Ok(payload) => payload,
        Err(e) => {
            error!("Failed to serialize payload for {}: {}", key, e);
            return;
        }
    };

    if let Err(e) = tx.try_send(Outbound { key, payload }) {
        match e {
            mpsc::error::TrySendError::Full(out) => {
                warn!("Outbound queue full, dropping update for {}", out.key)
            }
            mpsc::error::TrySendError::Closed(out) => {
                debug!("Forwarder gone, dropping update for {}", out.key)
            }
        }
    }
}

/// Subscribe every point, availability and diagnostics of one endpoint and
/// turn them into [`Outbound`] messages.
pub fn attach(
    dispatcher: &Dispatcher,
    config: &EndpointConfig,
    key_prefix: &str,
    tx: &mpsc::Sender<Outbound>,
) -> Vec<SubscriptionId> {
    let keys = EndpointKeys::new(key_prefix, config);
    let config = Arc::new(config.clone());
    let mut ids = Vec::with_capacity(usize::from(config.count) + 2);

    for index in 0..usize::from(config.count) {
        let key = keys.point(&config, index);
        let config = Arc::clone(&config);
        let tx = tx.clone();
        ids.push(dispatcher.subscribe(index, move |value| {
            enqueue(&tx, key.clone(), &PointMessage::new(&config, index, value));
        }));
    }

    let key = keys.availability();
    let availability_tx = tx.clone();
    ids.push(dispatcher.subscribe_availability(move |status| {
        enqueue(&availability_tx, key.clone(), &AvailabilityMessage::new(status));
    }));

    let key = keys.diagnostics();
    let diagnostics_tx = tx.clone();
    ids.push(dispatcher.subscribe_diagnostics(move |diagnostic| {
        enqueue(&diagnostics_tx, key.clone(), diagnostic);
    }));

    ids
}

/// Drain `rx` into Zenoh until every sender is gone.
pub async fn forward(publisher: Publisher, mut rx: mpsc::Receiver<Outbound>) {
    while let Some(out) = rx.recv().await {
        if let Err(e) = publisher.publish_raw(&out.key, out.payload).await {
            warn!(error = %e, "Failed to publish update");
        }
    }
    debug!("Forwarder stopped");
}

/// Run every configured endpoint until `shutdown` resolves.
pub async fn run(
    config: &BridgeConfig,
    session: Arc<zenoh::Session>,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let key_prefix = config.modbus_fast.key_prefix.as_str();
    let publisher = Publisher::new(session, key_prefix);
    let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);

    // Build every hub first so a bad endpoint fails before anything starts.
    let mut hubs = Vec::with_capacity(config.modbus_fast.endpoints.len());
    for endpoint in &config.modbus_fast.endpoints {
        let hub = PollHub::modbus(endpoint.clone())?;
        attach(&hub.dispatcher(), endpoint, key_prefix, &tx);
        hubs.push(hub);
    }
    drop(tx);

    let forwarder: JoinHandle<()> = tokio::spawn(forward(publisher.clone(), rx));

    let mut handles: Vec<HubHandle> = Vec::with_capacity(hubs.len());
    for hub in hubs {
        let endpoint = hub.config();
        let keys = EndpointKeys::new(key_prefix, endpoint);
        if let Err(e) = publisher
            .publish_json(&keys.device(), &DeviceMessage::new(endpoint))
            .await
        {
            warn!("Endpoint '{}': failed to publish device info: {}", endpoint.name, e);
        }

        info!(
            "Starting hub for endpoint '{}' ({})",
            endpoint.name, endpoint.connection
        );
        handles.push(hub.start());
    }

    let status = BridgeStatus::running(BRIDGE_NAME, env!("CARGO_PKG_VERSION")).with_metadata(
        serde_json::json!({
            "endpoints": config
                .modbus_fast
                .endpoints
                .iter()
                .map(|e| slugify(&e.name))
                .collect::<Vec<_>>(),
        }),
    );
    if let Err(e) = publisher.publish_status(&status).await {
        error!("Failed to publish bridge status: {}", e);
    }

    info!("Modbus fast bridge running with {} endpoint(s)", handles.len());

    shutdown.await;
    info!("Stopping {} hub(s)", handles.len());

    for handle in handles {
        let stats = handle.stats();
        debug!(
            endpoint = handle.name(),
            cycles = stats.cycles_total,
            failed = stats.cycles_failed,
            max_cycle_us = stats.max_cycle_us,
            "Hub statistics"
        );
        handle.stop().await;
    }

    // The last sender lived in the stopped hubs' dispatchers.
    if let Err(e) = forwarder.await {
        error!("Forwarder task failed: {}", e);
    }

    let status = BridgeStatus::offline(BRIDGE_NAME, env!("CARGO_PKG_VERSION"));
    if let Err(e) = publisher.publish_status(&status).await {
        warn!("Failed to publish offline status: {}", e);
    }

    Ok(())
}
