//! Periodic status refresh

use std::sync::Arc;
use std::time::Duration;

use log::*;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::ProtocolEngine;

/// Refresh the engine's snapshot every `interval` until the task is
/// aborted. Ticks are skipped while the charger is not connected.
pub fn spawn_poller(engine: Arc<ProtocolEngine>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if !engine.is_ready() {
                debug!("Not connected, skipping refresh");
                continue;
            }

            match engine.refresh().await {
                Ok(snapshot) => debug!("Refreshed: {snapshot:?}"),
                Err(e) => warn!("Refresh failed: {e}"),
            }
        }
    })
}
