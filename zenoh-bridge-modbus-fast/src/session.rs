//! Zenoh session setup.

use tracing::info;
use zenoh::Session;

use crate::config::ZenohConfig;
use crate::error::Result;

/// Open a session. Endpoint hubs share it through the bridge publisher.
pub async fn connect(config: &ZenohConfig) -> Result<Session> {
    let zenoh_config = config.to_zenoh_config()?;
    info!(
        mode = %config.mode,
        connect = ?config.connect,
        listen = ?config.listen,
        "Opening Zenoh session"
    );

    let session = zenoh::open(zenoh_config).await?;
    info!(zid = %session.zid(), "Zenoh session open");
    Ok(session)
}
