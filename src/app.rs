use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::{create_router, AppState};
use crate::config::Config;
use crate::fetcher::BulletinFetcher;
use crate::pns::BulletinParser;
use crate::reference::StationDirectory;
use crate::scheduler;
use crate::services::{CollectionService, SummaryService};
use crate::store::{ObservationStore, TsvRepository};

/// Application with all spawned background tasks and server
pub struct Application {
    pub server_handle: JoinHandle<Result<(), std::io::Error>>,
    pub collection_scheduler_handle: JoinHandle<()>,
}

impl Application {
    /// Build and initialize the application
    ///
    /// Opens the observation store, loads the station reference table, and spawns:
    /// - HTTP API server (Axum)
    /// - Collection scheduler (`FETCH_INTERVAL_MINUTES`)
    pub async fn build(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Initializing application components");

        let store = ObservationStore::open(TsvRepository::new(config.store_path.clone()))?;
        info!("Observation store holds {} records", store.len()?);

        let directory = match StationDirectory::load(&config.station_reference_path) {
            Ok(directory) => directory,
            Err(e) => {
                warn!(
                    "Station reference table {} unavailable, summaries will carry no coordinates: {}",
                    config.station_reference_path.display(),
                    e
                );
                StationDirectory::default()
            }
        };

        let parser = Arc::new(BulletinParser::new(config.normalizer_config())?);
        let fetcher = BulletinFetcher::with_base_url(config.pns_base_url.clone());

        let collection_service = CollectionService::new(
            fetcher,
            parser,
            store.clone(),
            config.offices.clone(),
            config.pages_per_office,
            config.fetch_concurrency,
        );
        let summary_service = SummaryService::new(store.clone(), Arc::new(directory));

        info!(
            "Spawning collection scheduler for offices {:?}",
            config.offices
        );
        let collection_scheduler_handle = {
            let interval = config.fetch_interval_minutes;
            tokio::spawn(async move {
                scheduler::start_collection_scheduler(collection_service, interval).await;
            })
        };

        let app_state = AppState {
            summary_service,
            store,
        };
        let app = create_router(app_state).layer(TraceLayer::new_for_http());

        let addr = config.server_addr();
        info!("Starting HTTP server on {}", addr);

        let server_handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            axum::serve(listener, app).await
        });

        info!("Application initialized successfully");

        Ok(Self {
            server_handle,
            collection_scheduler_handle,
        })
    }

    /// Run until the server stops. The scheduler runs in the background.
    pub async fn run_until_stopped(self) -> Result<(), Box<dyn std::error::Error>> {
        self.server_handle.await??;
        Ok(())
    }
}
