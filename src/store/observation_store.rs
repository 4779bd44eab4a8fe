use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{info, instrument};

use crate::pns::{InvalidRecord, NormalizedRecord};
use crate::store::{MergeReport, MergedTable, StoreError, TsvRepository};

pub const DEFAULT_DIAGNOSTICS_CAPACITY: usize = 500;

/// Shared handle to the merged observation table
///
/// Merges hold the table-wide write lock for the whole batch, so concurrent
/// office batches are applied one at a time. Readers take the read lock.
#[derive(Clone)]
pub struct ObservationStore {
    table: Arc<RwLock<MergedTable>>,
    diagnostics: Arc<Mutex<VecDeque<InvalidRecord>>>,
    diagnostics_capacity: usize,
    repository: Option<TsvRepository>,
}

impl ObservationStore {
    /// Store with no backing file
    pub fn in_memory() -> Self {
        Self::with_table(MergedTable::new(), None)
    }

    /// Load the table from `repository` and persist back to it
    pub fn open(repository: TsvRepository) -> Result<Self, StoreError> {
        let (table, report) = repository.load()?;
        info!(
            path = %repository.path().display(),
            loaded = report.loaded,
            skipped = report.skipped_rows,
            "Opened observation store"
        );
        Ok(Self::with_table(table, Some(repository)))
    }

    fn with_table(table: MergedTable, repository: Option<TsvRepository>) -> Self {
        Self {
            table: Arc::new(RwLock::new(table)),
            diagnostics: Arc::new(Mutex::new(VecDeque::new())),
            diagnostics_capacity: DEFAULT_DIAGNOSTICS_CAPACITY,
            repository,
        }
    }

    pub fn with_diagnostics_capacity(mut self, capacity: usize) -> Self {
        self.diagnostics_capacity = capacity;
        self
    }

    /// Apply one batch under the write lock and keep its invalid records for diagnostics
    #[instrument(skip(self, batch), fields(batch_size = batch.len()))]
    pub fn merge_batch(&self, batch: &[NormalizedRecord]) -> Result<MergeReport, StoreError> {
        let report = {
            let mut table = self.table.write().map_err(|_| StoreError::LockPoisoned)?;
            table.merge_batch(batch)
        };

        self.record_diagnostics(batch.iter().filter_map(NormalizedRecord::as_invalid))?;
        Ok(report)
    }

    fn record_diagnostics<'a>(
        &self,
        invalid: impl Iterator<Item = &'a InvalidRecord>,
    ) -> Result<(), StoreError> {
        let mut log = self.diagnostics.lock().map_err(|_| StoreError::LockPoisoned)?;
        for record in invalid {
            if log.len() >= self.diagnostics_capacity {
                log.pop_front();
            }
            log.push_back(record.clone());
        }
        Ok(())
    }

    /// Run `f` against the table under the read lock
    pub fn read<R>(&self, f: impl FnOnce(&MergedTable) -> R) -> Result<R, StoreError> {
        let table = self.table.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(f(&table))
    }

    pub fn snapshot(&self) -> Result<MergedTable, StoreError> {
        self.read(MergedTable::clone)
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        self.read(MergedTable::len)
    }

    /// Most recent invalid records, oldest first
    pub fn diagnostics(&self) -> Result<Vec<InvalidRecord>, StoreError> {
        let log = self.diagnostics.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(log.iter().cloned().collect())
    }

    /// Write the table to the backing file. Returns the number of rows on disk.
    pub fn persist(&self) -> Result<usize, StoreError> {
        let Some(repository) = &self.repository else {
            return self.len();
        };
        let table = self.snapshot()?;
        repository.save(&table)
    }
}
