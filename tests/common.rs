#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use snow_report_service::pns::{Bulletin, BulletinParser, NormalizerConfig, ObservationRecord};

pub const ALY_BULLETIN: &str = include_str!("../sample-data-files/ALY_20250208.html");

pub const BOX_BULLETIN: &str = "\
PUBLIC INFORMATION STATEMENT
NATIONAL WEATHER SERVICE NORTON MA
0600 PM EST TUE FEB 4 2025

BOX ... SNOW 2.0 INCHES ... AS OF 0700 AM EST ON 02/01/25
BOX ... SNOW 3.5 INCHES ... AS OF 0700 AM EST ON 02/03/25
BOX ... SNOW 1.5 INCHES ... AS OF 0700 AM EST ON 02/04/25
ORH ... SNOW 1 TO 2 INCHES ... AS OF 0800 AM EST ON 02/04/25

$$
";

/// Collection time of the ALY sample
pub fn aly_collected_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 8, 16, 0, 0).unwrap()
}

pub fn box_collected_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 4, 23, 0, 0).unwrap()
}

pub fn parser() -> BulletinParser {
    BulletinParser::new(NormalizerConfig::default()).expect("recognizer patterns compile")
}

pub fn bulletin(office_code: &str, raw_text: &str, retrieved_at: DateTime<Utc>) -> Bulletin {
    Bulletin {
        office_code: office_code.to_string(),
        raw_text: raw_text.to_string(),
        retrieved_at,
    }
}

/// Valid record at an RFC 3339 instant
pub fn record(station_id: &str, observed_at: &str, measurement: f64) -> ObservationRecord {
    ObservationRecord {
        station_id: station_id.to_string(),
        location_name: None,
        observed_at: DateTime::parse_from_rfc3339(observed_at).expect("valid RFC 3339 timestamp"),
        measurement,
        event_code: Some("SNOW".to_string()),
        source_office: station_id.to_string(),
        coordinates: None,
    }
}
