pub mod collection_service;
pub mod summary_service;

pub use collection_service::{CollectionError, CollectionReport, CollectionService};
pub use summary_service::{
    AggregateSummary, DateRange, HeatMap, HeatMapPoint, StationSummary, SummaryError,
    SummaryService,
};
