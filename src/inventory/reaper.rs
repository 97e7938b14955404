// Background reclaim of expired reservations

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::inventory::ledger::InventoryLedger;

/// Runs a reaper pass every `interval` until `shutdown` flips to true
pub fn spawn_reaper(
    ledger: Arc<InventoryLedger>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Reservation reaper started (every {:?})", interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = ledger.reap_expired().await {
                        error!("Reaper pass failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Reservation reaper stopped");
    })
}
