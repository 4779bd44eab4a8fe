use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};
use utoipa::ToSchema;

use crate::pns::{Coordinates, EventCategory, ObservationRecord};
use crate::reference::StationDirectory;
use crate::store::{MergedTable, ObservationKey, ObservationStore, StoreError};

/// Length of the default visualization window
pub const RECENT_WINDOW_HOURS: i64 = 48;

#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Inclusive calendar date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, SummaryError> {
        if start > end {
            return Err(SummaryError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// e.g. `February 02, 2025 - February 04, 2025`
    pub fn label(&self) -> String {
        format!(
            "{} - {}",
            self.start.format("%B %d, %Y"),
            self.end.format("%B %d, %Y")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct StationSummary {
    pub station_id: String,
    pub station_name: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub record_count: usize,
    pub total_measurement: f64,
    pub records: Vec<ObservationRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AggregateSummary {
    pub range: DateRange,
    pub label: String,
    pub category: Option<EventCategory>,
    pub stations: Vec<StationSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct HeatMapPoint {
    pub station_id: String,
    pub location_name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub total_measurement: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct HeatMap {
    pub range: DateRange,
    pub label: String,
    pub points: Vec<HeatMapPoint>,
}

impl AggregateSummary {
    /// Points to plot for the summary
    ///
    /// Site reports get one point per site at their own coordinates. A
    /// station's other records share one point at its reference location,
    /// and are left out when the station has none.
    pub fn heat_map_points(&self) -> Vec<HeatMapPoint> {
        let mut points = Vec::new();

        for station in &self.stations {
            let mut station_total: Option<f64> = None;
            let mut sites: BTreeMap<String, HeatMapPoint> = BTreeMap::new();

            for record in &station.records {
                match record.coordinates {
                    Some(c) => {
                        sites
                            .entry(ObservationKey::of(record).site)
                            .or_insert_with(|| HeatMapPoint {
                                station_id: station.station_id.clone(),
                                location_name: record.location_name.clone(),
                                latitude: c.latitude,
                                longitude: c.longitude,
                                total_measurement: 0.0,
                            })
                            .total_measurement += record.measurement;
                    }
                    None => *station_total.get_or_insert(0.0) += record.measurement,
                }
            }

            if let (Some(total), Some(c)) = (station_total, station.coordinates) {
                points.push(HeatMapPoint {
                    station_id: station.station_id.clone(),
                    location_name: station.station_name.clone(),
                    latitude: c.latitude,
                    longitude: c.longitude,
                    total_measurement: total,
                });
            }
            points.extend(sites.into_values());
        }

        points
    }
}

/// Group the records observed within `range` by station
///
/// Records are matched on the calendar date of their local observation time.
/// Stations without matching records are omitted. Stations are ordered by id
/// and records by observation instant.
pub fn build_summary(
    table: &MergedTable,
    range: DateRange,
    category: Option<EventCategory>,
    directory: &StationDirectory,
) -> AggregateSummary {
    let mut grouped: BTreeMap<&str, Vec<ObservationRecord>> = BTreeMap::new();

    for record in table.iter() {
        if !range.contains(record.observed_at.date_naive()) {
            continue;
        }
        if let Some(category) = category {
            if EventCategory::classify(record.event_code.as_deref()) != category {
                continue;
            }
        }
        grouped
            .entry(record.station_id.as_str())
            .or_default()
            .push(record.clone());
    }

    let stations = grouped
        .into_iter()
        .map(|(station_id, mut records)| {
            records.sort_by_key(|r| r.observed_at);
            let info = directory.get(station_id);
            StationSummary {
                station_id: station_id.to_string(),
                station_name: info.map(|s| s.name.clone()),
                coordinates: info.map(|s| Coordinates {
                    latitude: s.latitude,
                    longitude: s.longitude,
                }),
                record_count: records.len(),
                total_measurement: records.iter().map(|r| r.measurement).sum(),
                records,
            }
        })
        .collect();

    AggregateSummary {
        range,
        label: range.label(),
        category,
        stations,
    }
}

/// The window ending at `now`, shifted back to the latest observation when it would be empty
pub fn recent_range(
    table: &MergedTable,
    category: Option<EventCategory>,
    now: DateTime<Utc>,
) -> DateRange {
    let window = Duration::hours(RECENT_WINDOW_HOURS);
    let default_range = DateRange {
        start: (now - window).date_naive(),
        end: now.date_naive(),
    };

    let in_category = |record: &&ObservationRecord| {
        category.map_or(true, |c| EventCategory::classify(record.event_code.as_deref()) == c)
    };
    let has_recent = table
        .iter()
        .filter(in_category)
        .any(|record| record.observed_at.with_timezone(&Utc) >= now - window);
    if has_recent {
        return default_range;
    }

    match table.iter().filter(in_category).max_by_key(|r| r.observed_at) {
        Some(latest) => {
            let end = latest.observed_at.date_naive();
            let start = (latest.observed_at - window).date_naive();
            debug!(%start, %end, "No recent observations, shifting window to latest data");
            DateRange { start, end }
        }
        None => default_range,
    }
}

#[derive(Clone)]
pub struct SummaryService {
    store: ObservationStore,
    directory: Arc<StationDirectory>,
}

impl SummaryService {
    pub fn new(store: ObservationStore, directory: Arc<StationDirectory>) -> Self {
        Self { store, directory }
    }

    #[instrument(skip(self))]
    pub fn get_summary(
        &self,
        range: DateRange,
        category: Option<EventCategory>,
    ) -> Result<AggregateSummary, SummaryError> {
        let summary = self
            .store
            .read(|table| build_summary(table, range, category, &self.directory))?;
        debug!(stations = summary.stations.len(), "Built summary");
        Ok(summary)
    }

    /// Summary over the recent window as of `now`
    pub fn get_recent_summary(
        &self,
        category: Option<EventCategory>,
        now: DateTime<Utc>,
    ) -> Result<AggregateSummary, SummaryError> {
        let summary = self.store.read(|table| {
            let range = recent_range(table, category, now);
            build_summary(table, range, category, &self.directory)
        })?;
        Ok(summary)
    }

    pub fn get_heat_map(
        &self,
        range: DateRange,
        category: Option<EventCategory>,
    ) -> Result<HeatMap, SummaryError> {
        let summary = self.get_summary(range, category)?;
        Ok(HeatMap {
            range: summary.range,
            label: summary.label.clone(),
            points: summary.heat_map_points(),
        })
    }

    /// Every stored record for one station, oldest first
    pub fn get_station_observations(
        &self,
        station_id: &str,
    ) -> Result<Vec<ObservationRecord>, SummaryError> {
        let records = self
            .store
            .read(|table| table.records_for_station(station_id).cloned().collect())?;
        Ok(records)
    }
}
