//! Connectivity watcher
//!
//! Bridges a platform reachability signal (a `watch` channel of online/
//! offline booleans) into sync triggers: every offline-to-online edge kicks
//! a flush and a refresh. The coordinator's own guards absorb duplicate or
//! rapid-fire edges, so this watcher stays a dumb edge detector.
//!
//! The loop ends when the signal's sender is dropped, which is how the
//! embedding application shuts the watcher down.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::coordinator::SyncCoordinator;

/// Spawns the watcher task over a reachability signal
pub fn spawn_connectivity_watcher(
    mut online: watch::Receiver<bool>,
    coordinator: Arc<SyncCoordinator>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut was_online = *online.borrow();
        debug!(online = was_online, "Connectivity watcher started");

        while online.changed().await.is_ok() {
            let is_online = *online.borrow();
            if is_online && !was_online {
                info!("Connectivity restored, triggering flush and refresh");
                if let Err(err) = coordinator.flush().await {
                    warn!(error = %err, "Flush after reconnect failed");
                }
                if let Err(err) = coordinator.refresh().await {
                    warn!(error = %err, "Refresh after reconnect failed");
                }
            }
            was_online = is_online;
        }

        debug!("Connectivity signal closed, watcher exiting");
    })
}
