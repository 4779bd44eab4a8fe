use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info, instrument, warn};

use crate::services::CollectionService;

#[instrument(skip(collection_service), fields(interval_minutes = %interval_minutes))]
pub async fn start_collection_scheduler(collection_service: CollectionService, interval_minutes: u64) {
    let mut interval = time::interval(Duration::from_secs(interval_minutes.max(1) * 60));

    info!("Collection scheduler started with {} minute interval", interval_minutes);

    loop {
        interval.tick().await;
        debug!("Scheduler tick - initiating collection run");

        match collection_service.run_collection().await {
            Ok(report) => {
                if report.merge.changed() {
                    info!(
                        "Collection stored {} new and {} superseded observations",
                        report.merge.inserted, report.merge.superseded
                    );
                } else {
                    debug!("No new observations to store (all duplicates)");
                }
                if report.merge.ambiguities > 0 {
                    warn!(
                        "{} conflicting reports with equal measurements kept existing values",
                        report.merge.ambiguities
                    );
                }
            }
            Err(e) => {
                error!("Failed to collect and store observations: {}", e);
            }
        }
    }
}
