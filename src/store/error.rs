#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Store file row could not be written: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to replace store file: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("Observation table lock poisoned")]
    LockPoisoned,
}
