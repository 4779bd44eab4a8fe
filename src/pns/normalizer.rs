/// PNS Record Normalizer
///
/// Converts raw field strings into typed observation values. Normalization
/// never fails outright: a block whose required fields cannot be
/// canonicalized becomes an [`InvalidRecord`] naming the failing fields.
use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate, TimeZone, Utc};
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;
use utoipa::ToSchema;

use crate::pns::extractor::ExtractedFields;
use crate::utils;

/// Required fields a record can fail on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecordField {
    StationId,
    ObservedAt,
    Measurement,
}

impl fmt::Display for RecordField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordField::StationId => "station_id",
            RecordField::ObservedAt => "observed_at",
            RecordField::Measurement => "measurement",
        };
        f.write_str(name)
    }
}

/// Decimal degrees, west and south negative
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// A fully normalized station observation. Measurements are in inches.
///
/// `coordinates` is set when the report locates its own site, as metadata
/// rows do; such a record is a site report and its location name is part of
/// its identity.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ObservationRecord {
    pub station_id: String,
    pub location_name: Option<String>,
    #[schema(value_type = String, format = DateTime)]
    pub observed_at: DateTime<FixedOffset>,
    pub measurement: f64,
    pub event_code: Option<String>,
    pub source_office: String,
    pub coordinates: Option<Coordinates>,
}

/// A block whose required fields did not survive normalization
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct InvalidRecord {
    pub source_office: String,
    pub block_index: usize,
    pub station_id: Option<String>,
    pub location_name: Option<String>,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub observed_at: Option<DateTime<FixedOffset>>,
    pub measurement: Option<f64>,
    pub event_code: Option<String>,
    pub failed_fields: Vec<RecordField>,
    #[schema(value_type = Object)]
    pub raw: ExtractedFields,
}

/// Outcome of normalizing one block
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedRecord {
    Valid(ObservationRecord),
    Invalid(InvalidRecord),
}

impl NormalizedRecord {
    pub fn is_valid(&self) -> bool {
        matches!(self, NormalizedRecord::Valid(_))
    }

    pub fn as_valid(&self) -> Option<&ObservationRecord> {
        match self {
            NormalizedRecord::Valid(record) => Some(record),
            NormalizedRecord::Invalid(_) => None,
        }
    }

    pub fn as_invalid(&self) -> Option<&InvalidRecord> {
        match self {
            NormalizedRecord::Valid(_) => None,
            NormalizedRecord::Invalid(record) => Some(record),
        }
    }

    /// Names of the required fields that failed, empty for valid records
    pub fn failed_fields(&self) -> &[RecordField] {
        match self {
            NormalizedRecord::Valid(_) => &[],
            NormalizedRecord::Invalid(record) => &record.failed_fields,
        }
    }
}

/// Where a set of extracted fields came from
#[derive(Debug, Clone, Copy)]
pub struct SourceContext<'a> {
    pub office_code: &'a str,
    pub block_index: usize,
    pub collected_at: DateTime<Utc>,
}

/// Time zone policy for timestamps that carry no zone abbreviation
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    pub default_utc_offset_hours: i32,
    pub office_utc_offsets: HashMap<String, i32>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            default_utc_offset_hours: -5,
            office_utc_offsets: HashMap::new(),
        }
    }
}

#[derive(Debug)]
struct TimestampFormat {
    name: &'static str,
    pattern: Regex,
}

pub struct Normalizer {
    config: NormalizerConfig,
    timestamp_formats: Vec<TimestampFormat>,
    measurement_pattern: Regex,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Result<Self, regex::Error> {
        // Accepted formats, tried in order against the uppercased raw text
        let timestamp_formats = vec![
            TimestampFormat {
                name: "time-first",
                pattern: Regex::new(
                    r"^(?P<hm>\d{3,4})\s*(?P<ampm>AM|PM)(?:\s+(?P<tz>[A-Z]{2,4}))??\s+(?:ON\s+)?(?P<month>\d{1,2})/(?P<day>\d{1,2})(?:/(?P<year>\d{4}|\d{2}))?$",
                )?,
            },
            TimestampFormat {
                name: "date-first",
                pattern: Regex::new(
                    r"^(?P<month>\d{1,2})/(?P<day>\d{1,2})/(?P<year>\d{4}|\d{2})[ ,]+(?P<hm>\d{3,4})\s*(?P<ampm>AM|PM)(?:\s+(?P<tz>[A-Z]{2,4}))?$",
                )?,
            },
            TimestampFormat {
                name: "issuance",
                pattern: Regex::new(
                    r"^(?P<hm>\d{3,4})\s*(?P<ampm>AM|PM)\s+(?P<tz>[A-Z]{2,4})\s+(?:MON|TUE|WED|THU|FRI|SAT|SUN)\s+(?P<mon>[A-Z]{3})\s+(?P<day>\d{1,2})\s+(?P<year>\d{4})$",
                )?,
            },
        ];

        let measurement_pattern = Regex::new(
            r#"^(?P<neg>-)?(?P<num>\d+(?:\.\d+)?|\.\d+)(?:\s*(?:TO|-)\s*(?:\d+(?:\.\d+)?|\.\d+))?\s*(?P<unit>[A-Z"]+)?"#,
        )?;

        Ok(Self {
            config,
            timestamp_formats,
            measurement_pattern,
        })
    }

    /// Normalize one block's fields into exactly one record
    pub fn normalize(&self, fields: &ExtractedFields, source: &SourceContext<'_>) -> NormalizedRecord {
        let station_id = fields
            .station_id
            .as_deref()
            .and_then(utils::canonical_station_code);
        let observed_at = fields
            .timestamp_raw
            .as_deref()
            .and_then(|raw| self.parse_timestamp(raw, source.office_code, source.collected_at));
        let measurement = fields
            .measurement_raw
            .as_deref()
            .and_then(|raw| self.parse_measurement(raw));
        let location_name = fields
            .location_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let event_code = fields
            .event_code
            .as_deref()
            .map(|code| code.split_whitespace().collect::<Vec<_>>().join("_").to_ascii_uppercase())
            .filter(|s| !s.is_empty());
        let source_office = source.office_code.to_ascii_uppercase();
        let coordinates = match (fields.latitude_raw.as_deref(), fields.longitude_raw.as_deref()) {
            (Some(lat), Some(lon)) => parse_coordinates(lat, lon),
            _ => None,
        };

        match (station_id, observed_at, measurement) {
            (Some(station_id), Some(observed_at), Some(measurement)) => {
                NormalizedRecord::Valid(ObservationRecord {
                    station_id,
                    location_name,
                    observed_at,
                    measurement,
                    event_code,
                    source_office,
                    coordinates,
                })
            }
            (station_id, observed_at, measurement) => {
                let mut failed_fields = Vec::new();
                if station_id.is_none() {
                    failed_fields.push(RecordField::StationId);
                }
                if observed_at.is_none() {
                    failed_fields.push(RecordField::ObservedAt);
                }
                if measurement.is_none() {
                    failed_fields.push(RecordField::Measurement);
                }
                debug!(
                    office_code = source.office_code,
                    block_index = source.block_index,
                    failed = ?failed_fields,
                    "Block failed normalization"
                );
                NormalizedRecord::Invalid(InvalidRecord {
                    source_office,
                    block_index: source.block_index,
                    station_id,
                    location_name,
                    observed_at,
                    measurement,
                    event_code,
                    failed_fields,
                    raw: fields.clone(),
                })
            }
        }
    }

    /// Parse a raw timestamp with the first accepted format that matches
    pub fn parse_timestamp(
        &self,
        raw: &str,
        office_code: &str,
        collected_at: DateTime<Utc>,
    ) -> Option<DateTime<FixedOffset>> {
        let text = raw
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();

        for format in &self.timestamp_formats {
            if let Some(caps) = format.pattern.captures(&text) {
                let parsed = self.build_timestamp(&caps, office_code, collected_at);
                debug!(raw, format = format.name, ?parsed, "Timestamp format matched");
                return parsed;
            }
        }

        debug!(raw, "No accepted timestamp format matched");
        None
    }

    fn build_timestamp(
        &self,
        caps: &Captures<'_>,
        office_code: &str,
        collected_at: DateTime<Utc>,
    ) -> Option<DateTime<FixedOffset>> {
        let hm: u32 = caps.name("hm")?.as_str().parse().ok()?;
        let (hour12, minute) = (hm / 100, hm % 100);
        if !(1..=12).contains(&hour12) || minute >= 60 {
            return None;
        }
        let hour = match (caps.name("ampm")?.as_str(), hour12) {
            ("AM", 12) => 0,
            ("AM", h) => h,
            ("PM", 12) => 12,
            ("PM", h) => h + 12,
            _ => return None,
        };

        let offset = match caps.name("tz") {
            Some(tz) => zone_offset(tz.as_str())?,
            None => self.default_offset(office_code)?,
        };

        let month = match (caps.name("month"), caps.name("mon")) {
            (Some(m), _) => m.as_str().parse().ok()?,
            (None, Some(m)) => month_from_abbrev(m.as_str())?,
            (None, None) => return None,
        };
        let day: u32 = caps.name("day")?.as_str().parse().ok()?;

        let reference = collected_at.with_timezone(&offset).date_naive();
        let date = resolve_date(caps.name("year").map(|m| m.as_str()), month, day, reference)?;
        let naive = date.and_hms_opt(hour, minute, 0)?;

        offset.from_local_datetime(&naive).single()
    }

    fn default_offset(&self, office_code: &str) -> Option<FixedOffset> {
        let hours = self
            .config
            .office_utc_offsets
            .get(&office_code.to_ascii_uppercase())
            .copied()
            .unwrap_or(self.config.default_utc_offset_hours);
        FixedOffset::east_opt(hours * 3600)
    }

    /// Parse the leading amount of a raw measurement and convert it to inches
    pub fn parse_measurement(&self, raw: &str) -> Option<f64> {
        let text = raw.trim().to_ascii_uppercase();
        let mut tokens = text.split_whitespace();
        if matches!(tokens.next(), Some("T" | "TRACE")) {
            // A trailing unit still has to be a length
            return unit_factor(tokens.next()).map(|_| 0.0);
        }

        let caps = self.measurement_pattern.captures(&text)?;
        if caps.name("neg").is_some() {
            return None;
        }
        let value: f64 = caps.name("num")?.as_str().parse().ok()?;
        let factor = unit_factor(caps.name("unit").map(|m| m.as_str()))?;

        let inches = value * factor;
        (inches.is_finite() && inches >= 0.0).then_some(inches)
    }
}

/// Multiplier into inches for a length unit; `None` for units that are not lengths
fn unit_factor(unit: Option<&str>) -> Option<f64> {
    match unit {
        None | Some("IN") | Some("INCH") | Some("INCHES") | Some("\"") => Some(1.0),
        Some("CM") => Some(1.0 / 2.54),
        Some("MM") => Some(1.0 / 25.4),
        Some("FT") | Some("FOOT") | Some("FEET") => Some(12.0),
        Some(_) => None,
    }
}

/// Parse a latitude/longitude pair given as signed decimals or with a hemisphere suffix
fn parse_coordinates(latitude: &str, longitude: &str) -> Option<Coordinates> {
    let latitude = parse_degrees(latitude, 'N', 'S')?;
    let longitude = parse_degrees(longitude, 'E', 'W')?;
    ((-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude)).then_some(
        Coordinates {
            latitude,
            longitude,
        },
    )
}

fn parse_degrees(raw: &str, positive: char, negative: char) -> Option<f64> {
    let text = raw.trim().to_ascii_uppercase();
    let (number, sign) = if let Some(n) = text.strip_suffix(positive) {
        (n, 1.0)
    } else if let Some(n) = text.strip_suffix(negative) {
        (n, -1.0)
    } else {
        (text.as_str(), 1.0)
    };
    let value: f64 = number.trim().parse().ok()?;
    value.is_finite().then_some(value * sign)
}

fn zone_offset(abbrev: &str) -> Option<FixedOffset> {
    let hours = match abbrev {
        "UTC" | "GMT" | "Z" => 0,
        "EST" | "CDT" => -5,
        "EDT" => -4,
        "CST" | "MDT" => -6,
        "MST" | "PDT" => -7,
        "PST" | "AKDT" => -8,
        "AKST" => -9,
        "HST" => -10,
        _ => return None,
    };
    FixedOffset::east_opt(hours * 3600)
}

fn month_from_abbrev(abbrev: &str) -> Option<u32> {
    let month = match abbrev {
        "JAN" => 1,
        "FEB" => 2,
        "MAR" => 3,
        "APR" => 4,
        "MAY" => 5,
        "JUN" => 6,
        "JUL" => 7,
        "AUG" => 8,
        "SEP" => 9,
        "OCT" => 10,
        "NOV" => 11,
        "DEC" => 12,
        _ => return None,
    };
    Some(month)
}

/// Resolve a possibly abbreviated or missing year against the collection date.
///
/// Two-digit years pick the latest century that keeps the date from landing
/// in the future; a missing year picks the latest year that does the same.
/// One day of slack covers the observer being a zone ahead of the collector.
fn resolve_date(year: Option<&str>, month: u32, day: u32, reference: NaiveDate) -> Option<NaiveDate> {
    let latest = reference.checked_add_days(Days::new(1))?;

    match year {
        Some(y) if y.len() == 4 => NaiveDate::from_ymd_opt(y.parse().ok()?, month, day),
        Some(yy) => {
            let yy: i32 = yy.parse().ok()?;
            let century = reference.year() - reference.year().rem_euclid(100);
            let date = NaiveDate::from_ymd_opt(century + yy, month, day)?;
            if date > latest {
                NaiveDate::from_ymd_opt(century + yy - 100, month, day)
            } else {
                Some(date)
            }
        }
        None => (reference.year() - 4..=reference.year())
            .rev()
            .filter_map(|y| NaiveDate::from_ymd_opt(y, month, day))
            .find(|date| *date <= latest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn normalizer() -> Normalizer {
        Normalizer::new(NormalizerConfig::default()).unwrap()
    }

    fn collected() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 8, 18, 0, 0).unwrap()
    }

    fn source(office_code: &str) -> SourceContext<'_> {
        SourceContext {
            office_code,
            block_index: 3,
            collected_at: collected(),
        }
    }

    fn est() -> FixedOffset {
        FixedOffset::west_opt(5 * 3600).unwrap()
    }

    #[test]
    fn test_narrative_example_normalizes() {
        let fields = ExtractedFields {
            station_id: Some("ALY".to_string()),
            timestamp_raw: Some("0800 AM EST ON 02/08/25".to_string()),
            measurement_raw: Some("4 TO 6 INCHES".to_string()),
            event_code: Some("SNOW".to_string()),
            ..Default::default()
        };

        let record = normalizer().normalize(&fields, &source("ALY"));
        let record = record.as_valid().expect("record should be valid");
        assert_eq!(record.station_id, "ALY");
        assert_eq!(record.measurement, 4.0);
        assert_eq!(
            record.observed_at,
            est().with_ymd_and_hms(2025, 2, 8, 8, 0, 0).unwrap()
        );
        assert_eq!(record.observed_at.offset(), &est());
    }

    #[test]
    fn test_missing_timestamp_marks_observed_at() {
        let fields = ExtractedFields {
            station_id: Some("ALY".to_string()),
            measurement_raw: Some("4 INCHES".to_string()),
            ..Default::default()
        };

        let record = normalizer().normalize(&fields, &source("ALY"));
        assert!(!record.is_valid());
        assert_eq!(record.failed_fields(), &[RecordField::ObservedAt]);
        assert_eq!(record.as_invalid().unwrap().block_index, 3);
    }

    #[test]
    fn test_empty_fields_fail_every_required_field() {
        let record = normalizer().normalize(&ExtractedFields::default(), &source("ALY"));
        assert_eq!(
            record.failed_fields(),
            &[
                RecordField::StationId,
                RecordField::ObservedAt,
                RecordField::Measurement
            ]
        );
    }

    #[test]
    fn test_date_first_format_uses_office_default_offset() {
        let mut config = NormalizerConfig::default();
        config.office_utc_offsets.insert("ABQ".to_string(), -7);
        let normalizer = Normalizer::new(config).unwrap();

        let ts = normalizer
            .parse_timestamp("2/8/2025 0800 AM", "ABQ", collected())
            .unwrap();
        assert_eq!(ts.offset().local_minus_utc(), -7 * 3600);
        assert_eq!(ts.hour(), 8);

        let ts = normalizer
            .parse_timestamp("2/8/2025 0800 AM", "OKX", collected())
            .unwrap();
        assert_eq!(ts.offset().local_minus_utc(), -5 * 3600);
    }

    #[test]
    fn test_issuance_format() {
        let ts = normalizer()
            .parse_timestamp("1000 PM EST SUN JAN 19 2025", "OKX", collected())
            .unwrap();
        assert_eq!(ts, est().with_ymd_and_hms(2025, 1, 19, 22, 0, 0).unwrap());
    }

    #[test]
    fn test_noon_and_midnight() {
        let n = normalizer();
        let noon = n.parse_timestamp("1200 PM EST 02/07/2025", "ALY", collected()).unwrap();
        assert_eq!(noon.hour(), 12);
        let midnight = n.parse_timestamp("1200 AM EST 02/07/2025", "ALY", collected()).unwrap();
        assert_eq!(midnight.hour(), 0);
    }

    #[test]
    fn test_two_digit_year_never_lands_in_future() {
        let n = normalizer();
        let ts = n.parse_timestamp("0800 AM EST 12/31/25", "ALY", collected()).unwrap();
        assert_eq!(ts.year(), 1925);
        let ts = n.parse_timestamp("0800 AM EST 01/31/25", "ALY", collected()).unwrap();
        assert_eq!(ts.year(), 2025);
    }

    #[test]
    fn test_missing_year_resolves_to_latest_past_date() {
        let n = normalizer();
        let ts = n.parse_timestamp("0800 AM 02/08", "ALY", collected()).unwrap();
        assert_eq!(ts.year(), 2025);
        let ts = n.parse_timestamp("0800 AM 12/30", "ALY", collected()).unwrap();
        assert_eq!(ts.year(), 2024);
    }

    #[test]
    fn test_unknown_zone_or_format_is_rejected() {
        let n = normalizer();
        assert!(n.parse_timestamp("0800 AM XYZ 02/08/2025", "ALY", collected()).is_none());
        assert!(n.parse_timestamp("2025-02-08T08:00", "ALY", collected()).is_none());
        assert!(n.parse_timestamp("1300 PM EST 02/08/2025", "ALY", collected()).is_none());
    }

    #[test]
    fn test_measurement_units() {
        let n = normalizer();
        assert_eq!(n.parse_measurement("6.5 Inch"), Some(6.5));
        assert_eq!(n.parse_measurement("12"), Some(12.0));
        assert_eq!(n.parse_measurement("2 FT"), Some(24.0));
        assert_eq!(n.parse_measurement("TRACE"), Some(0.0));
        assert_eq!(n.parse_measurement("T Inch"), Some(0.0));
        assert_eq!(n.parse_measurement("trace inches"), Some(0.0));
        assert_eq!(n.parse_measurement("4-6 INCHES"), Some(4.0));

        let cm = n.parse_measurement("10 CM").unwrap();
        assert!((cm - 3.937).abs() < 0.001);
    }

    #[test]
    fn test_measurement_rejections() {
        let n = normalizer();
        assert_eq!(n.parse_measurement("-2 INCHES"), None);
        assert_eq!(n.parse_measurement("M"), None);
        assert_eq!(n.parse_measurement("45 MPH"), None);
        assert_eq!(n.parse_measurement("T MPH"), None);
        assert_eq!(n.parse_measurement(""), None);
    }

    #[test]
    fn test_icao_station_code_is_shortened() {
        let fields = ExtractedFields {
            station_id: Some(" kaly ".to_string()),
            timestamp_raw: Some("2/8/2025 0700 AM".to_string()),
            measurement_raw: Some("5.8 Inch".to_string()),
            event_code: Some("freezing rain".to_string()),
            location_name: Some("  Albany Airport ".to_string()),
            ..Default::default()
        };
        let record = normalizer().normalize(&fields, &source("aly"));
        let record = record.as_valid().unwrap();
        assert_eq!(record.station_id, "ALY");
        assert_eq!(record.location_name.as_deref(), Some("Albany Airport"));
        assert_eq!(record.event_code.as_deref(), Some("FREEZING_RAIN"));
        assert_eq!(record.source_office, "ALY");
    }

    #[test]
    fn test_coordinates_are_parsed() {
        let fields = ExtractedFields {
            station_id: Some("ALY".to_string()),
            location_name: Some("Saratoga Springs".to_string()),
            timestamp_raw: Some("2/8/2025 0700 AM".to_string()),
            measurement_raw: Some("T Inch".to_string()),
            latitude_raw: Some("43.08".to_string()),
            longitude_raw: Some("-73.78".to_string()),
            ..Default::default()
        };
        let record = normalizer().normalize(&fields, &source("ALY"));
        let record = record.as_valid().unwrap();
        assert_eq!(record.measurement, 0.0);
        assert_eq!(
            record.coordinates,
            Some(Coordinates {
                latitude: 43.08,
                longitude: -73.78
            })
        );
    }

    #[test]
    fn test_hemisphere_suffixes_and_bad_coordinates() {
        let c = parse_coordinates("40.87N", "72.86W").unwrap();
        assert_eq!((c.latitude, c.longitude), (40.87, -72.86));
        assert!(parse_coordinates("95.0", "-73.0").is_none());
        assert!(parse_coordinates("", "-73.0").is_none());
    }

    #[test]
    fn test_bad_station_code_is_rejected() {
        let fields = ExtractedFields {
            station_id: Some("SNOW".to_string()),
            timestamp_raw: Some("2/8/2025 0700 AM".to_string()),
            measurement_raw: Some("5.8".to_string()),
            ..Default::default()
        };
        let record = normalizer().normalize(&fields, &source("ALY"));
        assert_eq!(record.failed_fields(), &[RecordField::StationId]);
    }
}
