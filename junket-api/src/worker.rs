use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use junket_booking::BookingOrchestrator;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::metrics::Metrics;

/// Periodically lapses pending holds whose payment deadline has passed.
pub fn start_expiry_worker(
    orchestrator: Arc<BookingOrchestrator>,
    metrics: Arc<Metrics>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Expiry worker started, sweeping every {:?}", every);

        loop {
            ticker.tick().await;
            match orchestrator.lapse_expired_holds(Utc::now()).await {
                Ok(0) => {}
                Ok(lapsed) => {
                    metrics.add_lapsed(lapsed);
                    info!(lapsed, "Expired holds lapsed");
                }
                Err(e) => error!(error = %e, "Expiry sweep failed"),
            }
        }
    })
}
