pub mod error;
pub mod merged_table;
pub mod observation_store;
pub mod tsv_repository;

pub use error::StoreError;
pub use merged_table::{MergeReport, MergedTable, ObservationKey};
pub use observation_store::ObservationStore;
pub use tsv_repository::{LoadReport, TsvRepository};
