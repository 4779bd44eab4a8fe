use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::ops::AddAssign;
use tracing::{debug, instrument};
use utoipa::ToSchema;

use crate::pns::{Coordinates, NormalizedRecord, ObservationRecord};

/// Identity of an observation: one station at one instant
///
/// Site reports (records carrying their own coordinates) also key on their
/// location, so spotters reporting to the same office at the same time stay
/// distinct. `site` is empty for every other record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ObservationKey {
    pub station_id: String,
    pub observed_at: DateTime<Utc>,
    pub site: String,
}

impl ObservationKey {
    pub fn of(record: &ObservationRecord) -> Self {
        let site = match (&record.coordinates, &record.location_name) {
            (Some(_), Some(location)) => location
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_ascii_uppercase(),
            _ => String::new(),
        };
        Self {
            station_id: record.station_id.clone(),
            observed_at: record.observed_at.with_timezone(&Utc),
            site,
        }
    }
}

/// Counts of what a merge did with each incoming record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct MergeReport {
    pub inserted: usize,
    pub superseded: usize,
    /// Incoming records with the same measurement as the kept record
    pub unchanged: usize,
    /// Incoming records smaller than the kept record
    pub stale: usize,
    /// Equal measurements with differing station details
    pub ambiguities: usize,
    pub skipped_invalid: usize,
}

impl MergeReport {
    /// Whether the table was modified
    pub fn changed(&self) -> bool {
        self.inserted > 0 || self.superseded > 0
    }
}

impl AddAssign for MergeReport {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.superseded += other.superseded;
        self.unchanged += other.unchanged;
        self.stale += other.stale;
        self.ambiguities += other.ambiguities;
        self.skipped_invalid += other.skipped_invalid;
    }
}

/// Cumulative observation table, at most one record per [`ObservationKey`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedTable {
    records: BTreeMap<ObservationKey, ObservationRecord>,
}

impl MergedTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &ObservationKey) -> Option<&ObservationRecord> {
        self.records.get(key)
    }

    /// All records ordered by station, then instant
    pub fn iter(&self) -> impl Iterator<Item = &ObservationRecord> {
        self.records.values()
    }

    pub fn records_for_station<'a>(
        &'a self,
        station_id: &'a str,
    ) -> impl Iterator<Item = &'a ObservationRecord> + 'a {
        self.records
            .range(
                ObservationKey {
                    station_id: station_id.to_string(),
                    observed_at: DateTime::<Utc>::MIN_UTC,
                    site: String::new(),
                }..,
            )
            .take_while(move |(key, _)| key.station_id == station_id)
            .map(|(_, record)| record)
    }

    /// Most recent observation instant across all stations
    pub fn latest_observed_at(&self) -> Option<DateTime<Utc>> {
        self.records.keys().map(|key| key.observed_at).max()
    }

    /// Merge one collection run's batch. Invalid records are counted and ignored.
    #[instrument(skip(self, batch), fields(batch_size = batch.len(), table_size = self.len()))]
    pub fn merge_batch(&mut self, batch: &[NormalizedRecord]) -> MergeReport {
        let skipped_invalid = batch.iter().filter(|record| !record.is_valid()).count();
        let mut report = self.merge_records(batch.iter().filter_map(NormalizedRecord::as_valid));
        report.skipped_invalid = skipped_invalid;

        debug!(?report, "Merged batch");
        report
    }

    /// Merge already-valid records
    pub fn merge_records<'a, I>(&mut self, records: I) -> MergeReport
    where
        I: IntoIterator<Item = &'a ObservationRecord>,
    {
        let mut report = MergeReport::default();

        // Reduce same-key records in the batch to one winner first, so the
        // outcome does not depend on their order within the batch
        let mut winners: BTreeMap<ObservationKey, &ObservationRecord> = BTreeMap::new();
        for record in records {
            match winners.entry(ObservationKey::of(record)) {
                Entry::Vacant(slot) => {
                    slot.insert(record);
                }
                Entry::Occupied(mut slot) => {
                    let current = *slot.get();
                    if current.measurement.total_cmp(&record.measurement) == Ordering::Equal
                        && current != record
                    {
                        report.ambiguities += 1;
                    }
                    if batch_order(record, current) == Ordering::Greater {
                        slot.insert(record);
                    }
                }
            }
        }

        for (key, incoming) in winners {
            match self.records.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(incoming.clone());
                    report.inserted += 1;
                }
                Entry::Occupied(mut slot) => {
                    match incoming.measurement.total_cmp(&slot.get().measurement) {
                        Ordering::Greater => {
                            slot.insert(incoming.clone());
                            report.superseded += 1;
                        }
                        Ordering::Equal => {
                            if slot.get() != incoming {
                                debug!(
                                    station_id = %incoming.station_id,
                                    observed_at = %incoming.observed_at,
                                    "Equal measurement with differing details, keeping existing"
                                );
                                report.ambiguities += 1;
                            }
                            report.unchanged += 1;
                        }
                        Ordering::Less => report.stale += 1,
                    }
                }
            }
        }

        report
    }
}

/// Total order used to pick a winner among same-key records of one batch
fn batch_order(a: &ObservationRecord, b: &ObservationRecord) -> Ordering {
    a.measurement
        .total_cmp(&b.measurement)
        .then_with(|| a.source_office.cmp(&b.source_office))
        .then_with(|| a.event_code.cmp(&b.event_code))
        .then_with(|| a.location_name.cmp(&b.location_name))
        .then_with(|| coordinate_order(a.coordinates, b.coordinates))
        .then_with(|| {
            a.observed_at
                .offset()
                .local_minus_utc()
                .cmp(&b.observed_at.offset().local_minus_utc())
        })
}

fn coordinate_order(a: Option<Coordinates>, b: Option<Coordinates>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a
            .latitude
            .total_cmp(&b.latitude)
            .then_with(|| a.longitude.total_cmp(&b.longitude)),
        (a, b) => a.is_some().cmp(&b.is_some()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn record(station: &str, hour: u32, measurement: f64) -> ObservationRecord {
        ObservationRecord {
            station_id: station.to_string(),
            location_name: None,
            observed_at: FixedOffset::west_opt(5 * 3600)
                .unwrap()
                .with_ymd_and_hms(2025, 2, 8, hour, 0, 0)
                .unwrap(),
            measurement,
            event_code: Some("SNOW".to_string()),
            source_office: "ALY".to_string(),
            coordinates: None,
        }
    }

    fn site(location: &str, latitude: f64, measurement: f64) -> ObservationRecord {
        let mut record = record("ALY", 7, measurement);
        record.location_name = Some(location.to_string());
        record.coordinates = Some(Coordinates {
            latitude,
            longitude: -73.8,
        });
        record
    }

    #[test]
    fn test_insert_and_supersede() {
        let mut table = MergedTable::new();
        let report = table.merge_records([&record("ALY", 8, 4.0)]);
        assert_eq!(report.inserted, 1);

        let report = table.merge_records([&record("ALY", 8, 6.0)]);
        assert_eq!(report.superseded, 1);
        assert_eq!(table.len(), 1);
        assert_eq!(table.iter().next().unwrap().measurement, 6.0);

        let report = table.merge_records([&record("ALY", 8, 5.0)]);
        assert_eq!(report.stale, 1);
        assert_eq!(table.iter().next().unwrap().measurement, 6.0);
    }

    #[test]
    fn test_equal_measurement_keeps_existing_and_counts_ambiguity() {
        let mut table = MergedTable::new();
        table.merge_records([&record("ALY", 8, 4.0)]);

        let mut rival = record("ALY", 8, 4.0);
        rival.event_code = Some("SNOW_24".to_string());
        let report = table.merge_records([&rival]);

        assert_eq!(report.unchanged, 1);
        assert_eq!(report.ambiguities, 1);
        assert_eq!(table.iter().next().unwrap().event_code.as_deref(), Some("SNOW"));
    }

    #[test]
    fn test_same_instant_in_other_zone_shares_key() {
        let mut table = MergedTable::new();
        table.merge_records([&record("ALY", 8, 4.0)]);

        let mut utc_copy = record("ALY", 8, 4.5);
        utc_copy.observed_at = Utc
            .with_ymd_and_hms(2025, 2, 8, 13, 0, 0)
            .unwrap()
            .fixed_offset();
        let report = table.merge_records([&utc_copy]);
        assert_eq!(report.superseded, 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_site_reports_at_one_instant_stay_distinct() {
        let mut table = MergedTable::new();
        let report = table.merge_records([
            &site("Colonie", 42.72, 6.5),
            &site("Saratoga Springs", 43.08, 9.0),
            &site("Troy", 42.73, 4.0),
        ]);
        assert_eq!(report.inserted, 3);
        assert_eq!(table.records_for_station("ALY").count(), 3);

        // The same site reported again still goes through the merge policy
        let report = table.merge_records([&site("colonie ", 42.72, 7.0)]);
        assert_eq!(report.superseded, 1);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_in_batch_duplicates_are_order_independent() {
        let a = record("ALY", 8, 4.0);
        let mut b = record("ALY", 8, 4.0);
        b.source_office = "BGM".to_string();

        let mut forward = MergedTable::new();
        forward.merge_records([&a, &b]);
        let mut backward = MergedTable::new();
        backward.merge_records([&b, &a]);

        assert_eq!(forward, backward);
    }

    #[test]
    fn test_invalid_records_are_skipped() {
        use crate::pns::{ExtractedFields, InvalidRecord, RecordField};

        let invalid = NormalizedRecord::Invalid(InvalidRecord {
            source_office: "ALY".to_string(),
            block_index: 0,
            station_id: Some("ALY".to_string()),
            location_name: None,
            observed_at: None,
            measurement: Some(1.0),
            event_code: None,
            failed_fields: vec![RecordField::ObservedAt],
            raw: ExtractedFields::default(),
        });
        let batch = vec![NormalizedRecord::Valid(record("ALY", 8, 4.0)), invalid];

        let mut table = MergedTable::new();
        let report = table.merge_batch(&batch);
        assert_eq!(report.inserted, 1);
        assert_eq!(report.skipped_invalid, 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_records_for_station_are_ordered() {
        let mut table = MergedTable::new();
        table.merge_records([
            &record("BOX", 9, 1.0),
            &record("ALY", 9, 2.0),
            &record("ALY", 7, 3.0),
            &record("ALZ", 7, 3.0),
        ]);

        let aly: Vec<f64> = table.records_for_station("ALY").map(|r| r.measurement).collect();
        assert_eq!(aly, vec![3.0, 2.0]);
        assert_eq!(table.records_for_station("OKX").count(), 0);
        assert_eq!(
            table.latest_observed_at(),
            Some(Utc.with_ymd_and_hms(2025, 2, 8, 14, 0, 0).unwrap())
        );
    }
}
