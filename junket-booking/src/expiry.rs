use chrono::{DateTime, Utc};
use junket_core::itinerary::Transition;
use junket_core::repository::StoreError;
use junket_shared::models::events::TOPIC_ITINERARY_DENIED;
use tracing::{debug, info};

use crate::error::BookingError;
use crate::orchestrator::BookingOrchestrator;

impl BookingOrchestrator {
    /// Marks every pending hold whose payment deadline has passed as
    /// denied (`lapsed`). Rows moved concurrently by another writer are
    /// skipped. Returns how many holds lapsed.
    pub async fn lapse_expired_holds(&self, now: DateTime<Utc>) -> Result<usize, BookingError> {
        let expired = self.itineraries().list_expired_pending(now).await?;
        let mut lapsed = 0;

        for itinerary in expired {
            match self
                .itineraries()
                .update_status(itinerary.id, Transition::Lapse, now)
                .await
            {
                Ok(updated) => {
                    lapsed += 1;
                    info!(
                        itinerary_id = %updated.id,
                        order_id = ?updated.provider_order_id,
                        "Unpaid hold lapsed"
                    );
                    self.announce(TOPIC_ITINERARY_DENIED, &updated).await;
                }
                Err(StoreError::InvalidTransition { from, .. }) => {
                    debug!(itinerary_id = %itinerary.id, status = %from, "Hold already settled, not lapsing");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(lapsed)
    }
}
