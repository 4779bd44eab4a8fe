/// PNS Field Extractor
///
/// Locates the raw field strings of one report block. Offices format their
/// reports differently, so each field has an ordered list of recognizers and
/// the first one that matches wins. Extraction never fails: a field nobody
/// recognizes is simply absent.
use csv::{ReaderBuilder, StringRecord, Trim};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::pns::tokenizer::{BlockLayout, RawBlock};

/// Raw field strings located in one block
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractedFields {
    pub station_id: Option<String>,
    pub location_name: Option<String>,
    pub timestamp_raw: Option<String>,
    pub measurement_raw: Option<String>,
    pub event_code: Option<String>,
    pub latitude_raw: Option<String>,
    pub longitude_raw: Option<String>,
}

impl ExtractedFields {
    pub fn is_empty(&self) -> bool {
        self.station_id.is_none()
            && self.location_name.is_none()
            && self.timestamp_raw.is_none()
            && self.measurement_raw.is_none()
            && self.event_code.is_none()
            && self.latitude_raw.is_none()
            && self.longitude_raw.is_none()
    }
}

/// How a recognizer pulls a value out of a block
#[derive(Debug)]
enum Matcher {
    /// The `value` capture group of a pattern run against the block text
    Pattern(Regex),
    /// Zero-based column of a metadata row
    Column(usize),
    /// Two metadata columns joined with a space
    Columns(usize, usize),
    /// The office that issued the bulletin
    IssuingOffice,
}

#[derive(Debug)]
struct Recognizer {
    /// Restricts the recognizer to one layout; `None` applies to both
    layout: Option<BlockLayout>,
    matcher: Matcher,
}

impl Recognizer {
    fn narrative(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            layout: Some(BlockLayout::Narrative),
            matcher: Matcher::Pattern(Regex::new(pattern)?),
        })
    }

    fn metadata(matcher: Matcher) -> Self {
        Self {
            layout: Some(BlockLayout::MetadataRow),
            matcher,
        }
    }

    fn apply(&self, block: &RawBlock, columns: &StringRecord) -> Option<String> {
        if self.layout.is_some_and(|layout| layout != block.layout) {
            return None;
        }

        let value = match &self.matcher {
            Matcher::Pattern(re) => re
                .captures(&block.text)
                .and_then(|caps| caps.name("value"))
                .map(|m| m.as_str().to_string()),
            Matcher::Column(idx) => columns.get(*idx).map(str::to_string),
            Matcher::Columns(first, second) => match (columns.get(*first), columns.get(*second)) {
                (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => Some(format!("{a} {b}")),
                (Some(a), _) if !a.is_empty() => Some(a.to_string()),
                _ => None,
            },
            Matcher::IssuingOffice => Some(block.office_code.clone()),
        };

        value
            .map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|v| !v.is_empty())
    }
}

/// Ordered recognizer lists, one per field
#[derive(Debug)]
pub struct FieldExtractor {
    station_id: Vec<Recognizer>,
    location_name: Vec<Recognizer>,
    timestamp: Vec<Recognizer>,
    measurement: Vec<Recognizer>,
    event_code: Vec<Recognizer>,
    latitude: Vec<Recognizer>,
    longitude: Vec<Recognizer>,
}

const TIME: &str = r"\d{3,4}\s*[AP]M";
const ZONE_ABBREV: &str = r"(?:AKST|AKDT|EST|EDT|CST|CDT|MST|MDT|PST|PDT|HST|UTC|GMT|Z)\b";
const FULL_DATE: &str = r"\d{1,2}/\d{1,2}/(?:\d{4}|\d{2})";
const AMOUNT: &str = r"(?:\d+(?:\.\d+)?|\.\d+)(?:\s*(?:TO|-)\s*(?:\d+(?:\.\d+)?|\.\d+))?";
const LENGTH_UNIT: &str = r#"(?:INCHES|INCH|IN\b|CM\b|MM\b|FEET|FOOT|FT\b|")"#;

impl FieldExtractor {
    pub fn new() -> Result<Self, regex::Error> {
        let station_id = vec![
            Recognizer::narrative(r"(?i)\bSTATION(?:\s+ID)?\s*[:=]\s*(?P<value>[A-Z]{3,4})\b")?,
            Recognizer::narrative(r"^(?P<value>(?:[KP][A-Z]{3}|[A-Z]{3}))\s*\.{3}")?,
            Recognizer::metadata(Matcher::IssuingOffice),
        ];

        let location_name = vec![
            Recognizer::narrative(r"(?i)\bLOCATION\s*[:=]\s*(?P<value>[^.:,]+?)\s*(?:\.{3}|,|$)")?,
            Recognizer::narrative(r"(?i)\bCITY\s*[:=]\s*(?P<value>[^.:,]+?)\s*(?:\.{3}|,|$)")?,
            Recognizer::metadata(Matcher::Column(4)),
        ];

        let timestamp = vec![
            Recognizer::narrative(&format!(
                r"(?i)\bAS\s+OF\s+(?P<value>{TIME}(?:\s+{ZONE_ABBREV})??\s+(?:ON\s+)?{FULL_DATE})"
            ))?,
            Recognizer::narrative(&format!(
                r"(?i)(?P<value>\b{FULL_DATE}[ ,]+{TIME}(?:\s+{ZONE_ABBREV})?)"
            ))?,
            Recognizer::narrative(&format!(
                r"(?i)(?P<value>\b{TIME}\s+{ZONE_ABBREV}\s+[A-Z]{{3}}\s+[A-Z]{{3}}\s+\d{{1,2}}\s+\d{{4}})"
            ))?,
            Recognizer::narrative(&format!(
                r"(?i)(?P<value>\b{TIME}(?:\s+{ZONE_ABBREV})??\s+(?:ON\s+)?\d{{1,2}}/\d{{1,2}}(?:/(?:\d{{4}}|\d{{2}}))?)"
            ))?,
            Recognizer::metadata(Matcher::Columns(0, 1)),
        ];

        // A bare number after a label only counts when the clause ends there,
        // so durations such as `TOTAL 24 HOUR SNOWFALL` are passed over
        let measurement = vec![
            Recognizer::narrative(&format!(
                r"(?i)\b(?:SNOWFALL|SNOW|TOTAL|AMOUNT)\s*[:=]?\s*(?:OF\s+)?(?P<value>-?{AMOUNT}\s*{LENGTH_UNIT})"
            ))?,
            Recognizer::narrative(&format!(
                r"(?i)\b(?:SNOWFALL|SNOW|TOTAL|AMOUNT)\s*[:=]?\s*(?:OF\s+)?(?P<value>-?{AMOUNT})\s*(?:\.{{3}}|[,;]|$)"
            ))?,
            Recognizer::narrative(r"(?i)(?P<value>\bTRACE\b)")?,
            Recognizer::narrative(&format!(r"(?i)(?P<value>\b{AMOUNT}\s*{LENGTH_UNIT})"))?,
            Recognizer::metadata(Matcher::Columns(10, 11)),
        ];

        let event_code = vec![
            Recognizer::narrative(r"(?i)\bEVENT\s*[:=]\s*(?P<value>[A-Z_]+)")?,
            Recognizer::narrative(
                r"(?i)\b(?P<value>SNOW_24|SNOW|SLEET|FREEZING\s+RAIN|ICE|RAIN|PKGUST|FLOOD)\b",
            )?,
            Recognizer::metadata(Matcher::Column(9)),
        ];

        let latitude = vec![
            Recognizer::narrative(r"(?i)\b(?P<value>\d{1,2}\.\d+\s*[NS])\b")?,
            Recognizer::metadata(Matcher::Column(7)),
        ];

        let longitude = vec![
            Recognizer::narrative(r"(?i)\b(?P<value>\d{1,3}\.\d+\s*[EW])\b")?,
            Recognizer::metadata(Matcher::Column(8)),
        ];

        Ok(Self {
            station_id,
            location_name,
            timestamp,
            measurement,
            event_code,
            latitude,
            longitude,
        })
    }

    /// Extract every recognizable field from one block
    pub fn extract(&self, block: &RawBlock) -> ExtractedFields {
        let columns = match block.layout {
            BlockLayout::MetadataRow => split_metadata_row(&block.text),
            BlockLayout::Narrative => StringRecord::new(),
        };

        let fields = ExtractedFields {
            station_id: first_match(&self.station_id, block, &columns),
            location_name: first_match(&self.location_name, block, &columns),
            timestamp_raw: first_match(&self.timestamp, block, &columns),
            measurement_raw: first_match(&self.measurement, block, &columns),
            event_code: first_match(&self.event_code, block, &columns),
            latitude_raw: first_match(&self.latitude, block, &columns),
            longitude_raw: first_match(&self.longitude, block, &columns),
        };

        debug!(
            office_code = %block.office_code,
            block_index = block.index,
            ?fields,
            "Extracted block fields"
        );
        fields
    }
}

fn first_match(recognizers: &[Recognizer], block: &RawBlock, columns: &StringRecord) -> Option<String> {
    recognizers
        .iter()
        .find_map(|recognizer| recognizer.apply(block, columns))
}

/// Split a metadata row into its comma-separated cells
///
/// A row the CSV reader cannot make sense of yields no cells, which leaves
/// every column-based field absent.
fn split_metadata_row(row: &str) -> StringRecord {
    let row = row.trim().trim_start_matches(':');
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(row.as_bytes());

    let mut record = StringRecord::new();
    match reader.read_record(&mut record) {
        Ok(true) => record,
        Ok(false) => StringRecord::new(),
        Err(e) => {
            debug!("Unreadable metadata row: {}", e);
            StringRecord::new()
        }
    }
}
