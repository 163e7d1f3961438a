//! Periodic removal of stale sessions

use super::Engine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Sweep the engine's store every `interval` until shutdown
pub async fn run_reaper(
    engine: Arc<Engine>,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Session reaper shutting down");
                break;
            }
            _ = tokio::time::sleep(interval) => {
                let removed = engine.reap();
                debug!("Reaper pass removed {} sessions", removed);
            }
        }
    }
}
