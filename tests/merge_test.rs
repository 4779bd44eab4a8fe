// Merge policy tests for the cumulative observation table

mod common;

use common::{aly_collected_at, bulletin, parser, record, ALY_BULLETIN};
use snow_report_service::pns::NormalizedRecord;
use snow_report_service::store::{MergedTable, ObservationKey};

fn batch(records: &[(&str, &str, f64)]) -> Vec<NormalizedRecord> {
    records
        .iter()
        .map(|(station, at, measurement)| NormalizedRecord::Valid(record(station, at, *measurement)))
        .collect()
}

#[test]
fn test_merging_same_batch_twice_is_idempotent() {
    let parsed = parser()
        .parse(&bulletin("ALY", ALY_BULLETIN, aly_collected_at()))
        .unwrap();

    let mut table = MergedTable::new();
    let first = table.merge_batch(&parsed.records);
    let after_once = table.clone();

    let second = table.merge_batch(&parsed.records);
    assert_eq!(table, after_once);
    assert_eq!(first.inserted, 6);
    assert_eq!(first.skipped_invalid, 2);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.superseded, 0);
    assert_eq!(second.unchanged, 6);
    assert_eq!(second.ambiguities, 0);
}

#[test]
fn test_disjoint_batches_are_order_independent() {
    let a = batch(&[
        ("ALY", "2025-02-08T08:00:00-05:00", 4.0),
        ("BGM", "2025-02-08T07:00:00-05:00", 3.5),
    ]);
    let b = batch(&[
        ("ALY", "2025-02-08T08:00:00-05:00", 6.0),
        ("BTV", "2025-02-08T06:00:00-05:00", 5.9),
    ]);

    let mut ab = MergedTable::new();
    ab.merge_batch(&a);
    ab.merge_batch(&b);

    let mut ba = MergedTable::new();
    ba.merge_batch(&b);
    ba.merge_batch(&a);

    assert_eq!(ab, ba);
    assert_eq!(ab.len(), 3);
}

#[test]
fn test_larger_measurement_survives_regardless_of_order() {
    let smaller = batch(&[("BOX", "2025-02-03T07:00:00-05:00", 2.0)]);
    let larger = batch(&[("BOX", "2025-02-03T07:00:00-05:00", 3.5)]);
    let key = ObservationKey::of(&record("BOX", "2025-02-03T07:00:00-05:00", 0.0));

    let mut table = MergedTable::new();
    table.merge_batch(&smaller);
    let report = table.merge_batch(&larger);
    assert_eq!(report.superseded, 1);
    assert_eq!(table.get(&key).unwrap().measurement, 3.5);

    let mut table = MergedTable::new();
    table.merge_batch(&larger);
    let report = table.merge_batch(&smaller);
    assert_eq!(report.stale, 1);
    assert_eq!(table.get(&key).unwrap().measurement, 3.5);
}

#[test]
fn test_equal_measurement_keeps_first_inserted() {
    let mut first = record("BOX", "2025-02-03T07:00:00-05:00", 3.5);
    first.location_name = Some("Norton".to_string());
    let mut second = first.clone();
    second.location_name = Some("Taunton".to_string());

    let mut table = MergedTable::new();
    table.merge_batch(&[NormalizedRecord::Valid(first.clone())]);
    let report = table.merge_batch(&[NormalizedRecord::Valid(second)]);

    assert_eq!(report.unchanged, 1);
    assert_eq!(report.ambiguities, 1);
    assert_eq!(table.iter().next().unwrap(), &first);
}

#[test]
fn test_same_batch_duplicates_reduce_to_one_winner() {
    let forward = batch(&[
        ("OKX", "2025-02-08T07:00:00-05:00", 5.0),
        ("OKX", "2025-02-08T07:00:00-05:00", 7.0),
        ("OKX", "2025-02-08T12:00:00Z", 6.0),
    ]);
    let mut backward = forward.clone();
    backward.reverse();

    let mut table_forward = MergedTable::new();
    let report = table_forward.merge_batch(&forward);
    let mut table_backward = MergedTable::new();
    table_backward.merge_batch(&backward);

    assert_eq!(report.inserted, 1);
    assert_eq!(table_forward, table_backward);
    assert_eq!(table_forward.iter().next().unwrap().measurement, 7.0);
}

#[test]
fn test_invalid_records_never_enter_the_table() {
    let parsed = parser()
        .parse(&bulletin("ALY", ALY_BULLETIN, aly_collected_at()))
        .unwrap();

    let mut table = MergedTable::new();
    table.merge_batch(&parsed.records);

    assert!(table.iter().all(|r| r.station_id != "PSF" && r.station_id != "ALB"));
}
