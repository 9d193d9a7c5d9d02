//! Payload publisher for Zenoh.

use std::sync::Arc;

use serde::Serialize;

use crate::error::{BridgeError, Result};
use crate::message::BridgeStatus;
use crate::naming::status_key;

/// Wraps a Zenoh session and publishes JSON payloads under a key prefix.
#[derive(Clone, Debug)]
pub struct Publisher {
    session: Arc<zenoh::Session>,
    key_prefix: String,
}

impl Publisher {
    pub fn new(session: Arc<zenoh::Session>, key_prefix: impl Into<String>) -> Self {
        Self {
            session,
            key_prefix: key_prefix.into(),
        }
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn session(&self) -> &Arc<zenoh::Session> {
        &self.session
    }

    /// Serialize `value` as JSON and put it on `key`.
    pub async fn publish_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let payload = serde_json::to_string(value)?;
        self.publish_raw(key, payload).await
    }

    /// Put an already serialized payload on `key`.
    pub async fn publish_raw(&self, key: &str, payload: String) -> Result<()> {
        self.session
            .put(key, payload)
            .await
            .map_err(|e| BridgeError::Publish {
                key: key.to_string(),
                message: e.to_string(),
            })
    }

    /// Publish `status` to `{key_prefix}/@/status`.
    pub async fn publish_status(&self, status: &BridgeStatus) -> Result<()> {
        self.publish_json(&status_key(&self.key_prefix), status).await
    }
}
