//! Periodic purge of expired store entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use vigil_monitor::Monitor;

/// Run the sweep loop until the shutdown signal fires.
pub async fn run(monitor: Arc<Monitor>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    info!(interval_secs = interval.as_secs(), "store sweeper started");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                match monitor.purge_expired().await {
                    Ok(0) => {}
                    Ok(purged) => debug!(purged, "expired entries purged"),
                    Err(e) => warn!(error = %e, "store sweep failed"),
                }
            }
            _ = shutdown.changed() => {
                info!("store sweeper shutting down");
                break;
            }
        }
    }
}
