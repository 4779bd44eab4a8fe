use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;

use crate::fetcher::BulletinFetcher;
use crate::pns::{Bulletin, BulletinParser, NormalizedRecord};
use crate::store::{MergeReport, ObservationStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Totals for one polling run or bulk import
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct CollectionReport {
    pub offices_attempted: usize,
    pub offices_failed: usize,
    pub bulletins: usize,
    /// Bulletins rejected as undecodable
    pub fatal_bulletins: usize,
    pub blocks: usize,
    pub valid_records: usize,
    pub invalid_records: usize,
    pub structural_gaps: usize,
    pub merge: MergeReport,
    pub stored_rows: usize,
}

#[derive(Clone)]
pub struct CollectionService {
    fetcher: BulletinFetcher,
    parser: Arc<BulletinParser>,
    store: ObservationStore,
    offices: Vec<String>,
    pages_per_office: u32,
    concurrency: usize,
}

impl CollectionService {
    pub fn new(
        fetcher: BulletinFetcher,
        parser: Arc<BulletinParser>,
        store: ObservationStore,
        offices: Vec<String>,
        pages_per_office: u32,
        concurrency: usize,
    ) -> Self {
        Self {
            fetcher,
            parser,
            store,
            offices,
            pages_per_office,
            concurrency,
        }
    }

    /// Fetch every configured office, merge each office's records, then persist once
    #[instrument(skip(self), fields(offices = self.offices.len()))]
    pub async fn run_collection(&self) -> Result<CollectionReport, CollectionError> {
        let mut report = CollectionReport {
            offices_attempted: self.offices.len(),
            ..Default::default()
        };

        let mut fetches = stream::iter(self.offices.iter().cloned())
            .map(|office| {
                let fetcher = self.fetcher.clone();
                let pages = self.pages_per_office;
                async move {
                    let result = fetcher.fetch_office(&office, pages).await;
                    (office, result)
                }
            })
            .buffer_unordered(self.concurrency.max(1));

        while let Some((office, result)) = fetches.next().await {
            match result {
                Ok(bulletins) => {
                    self.ingest(&bulletins, &mut report)?;
                }
                Err(e) => {
                    error!("Failed to fetch bulletins for {}: {}", office, e);
                    report.offices_failed += 1;
                }
            }
        }

        let store = self.store.clone();
        report.stored_rows = tokio::task::spawn_blocking(move || store.persist()).await??;

        info!(
            "Collection run complete: {} new, {} superseded, {} invalid, {} offices failed",
            report.merge.inserted,
            report.merge.superseded,
            report.invalid_records,
            report.offices_failed
        );
        Ok(report)
    }

    /// Parse bulletins and merge their records into the store as one batch
    ///
    /// Bulletins that are not text are skipped; the rest of the batch proceeds.
    pub fn ingest(
        &self,
        bulletins: &[Bulletin],
        report: &mut CollectionReport,
    ) -> Result<MergeReport, StoreError> {
        let mut batch: Vec<NormalizedRecord> = Vec::new();

        for bulletin in bulletins {
            report.bulletins += 1;
            match self.parser.parse(bulletin) {
                Ok(parsed) => {
                    report.blocks += parsed.block_count();
                    report.valid_records += parsed.valid_count();
                    report.invalid_records += parsed.invalid_count();
                    report.structural_gaps += parsed.gaps.len();
                    batch.extend(parsed.records);
                }
                Err(e) => {
                    warn!("Skipping bulletin: {}", e);
                    report.fatal_bulletins += 1;
                }
            }
        }

        let merge = self.store.merge_batch(&batch)?;
        report.merge += merge;
        Ok(merge)
    }

    pub fn store(&self) -> &ObservationStore {
        &self.store
    }
}
