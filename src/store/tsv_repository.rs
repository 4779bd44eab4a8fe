use chrono::{DateTime, FixedOffset};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use crate::pns::{Coordinates, ObservationRecord};
use crate::store::{MergedTable, StoreError};

pub const HEADER: [&str; 9] = [
    "station_id",
    "observed_at",
    "measurement",
    "location_name",
    "event_code",
    "source_office",
    "latitude",
    "longitude",
    "is_valid",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub rows: usize,
    pub loaded: usize,
    pub skipped_rows: usize,
}

/// One line of the store file, in [`HEADER`] order
#[derive(Debug, Serialize, Deserialize)]
struct StoreRow {
    station_id: String,
    observed_at: DateTime<FixedOffset>,
    measurement: f64,
    location_name: Option<String>,
    event_code: Option<String>,
    source_office: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    is_valid: bool,
}

impl From<&ObservationRecord> for StoreRow {
    fn from(record: &ObservationRecord) -> Self {
        Self {
            station_id: record.station_id.clone(),
            observed_at: record.observed_at,
            measurement: record.measurement,
            location_name: record.location_name.clone(),
            event_code: record.event_code.clone(),
            source_office: record.source_office.clone(),
            latitude: record.coordinates.map(|c| c.latitude),
            longitude: record.coordinates.map(|c| c.longitude),
            is_valid: true,
        }
    }
}

impl StoreRow {
    /// Rows flagged invalid yield `None`
    fn into_record(self) -> Result<Option<ObservationRecord>, String> {
        if !self.is_valid {
            return Ok(None);
        }
        if self.station_id.is_empty() {
            return Err("empty station_id".to_string());
        }
        if !self.measurement.is_finite() || self.measurement < 0.0 {
            return Err(format!("measurement out of range: {}", self.measurement));
        }

        let coordinates = match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates {
                latitude,
                longitude,
            }),
            _ => None,
        };

        Ok(Some(ObservationRecord {
            station_id: self.station_id,
            location_name: self.location_name,
            observed_at: self.observed_at,
            measurement: self.measurement,
            event_code: self.event_code,
            source_office: self.source_office,
            coordinates,
        }))
    }
}

/// Tab-delimited file holding the merged observation table
#[derive(Debug, Clone)]
pub struct TsvRepository {
    path: PathBuf,
}

impl TsvRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file into a table. A missing file is an empty table.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn load(&self) -> Result<(MergedTable, LoadReport), StoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Store file does not exist yet, starting empty");
                return Ok((MergedTable::new(), LoadReport::default()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .trim(Trim::All)
            .from_reader(file);

        let mut report = LoadReport::default();
        let mut records = Vec::new();

        for row in reader.deserialize::<StoreRow>() {
            report.rows += 1;

            match row.map_err(|e| e.to_string()).and_then(StoreRow::into_record) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => report.skipped_rows += 1,
                Err(e) => {
                    warn!("Failed to parse store row {}: {}", report.rows, e);
                    report.skipped_rows += 1;
                }
            }
        }

        let mut table = MergedTable::new();
        table.merge_records(&records);
        report.loaded = table.len();

        if report.skipped_rows > 0 {
            warn!(
                "Skipped {} unparseable rows out of {}",
                report.skipped_rows, report.rows
            );
        }
        debug!(?report, "Loaded store file");
        Ok((table, report))
    }

    /// Merge `table` over the file's current contents and atomically replace it
    #[instrument(skip(self, table), fields(path = %self.path.display(), records = table.len()))]
    pub fn save(&self, table: &MergedTable) -> Result<usize, StoreError> {
        let (on_disk, _) = self.load()?;
        let mut merged = table.clone();
        let report = merged.merge_records(on_disk.iter());
        debug!(from_disk = report.inserted, "Merged existing file rows");

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let tmp = NamedTempFile::new_in(&dir)?;
        {
            let mut writer = WriterBuilder::new()
                .delimiter(b'\t')
                .has_headers(false)
                .from_writer(tmp.as_file());
            writer.write_record(HEADER)?;
            for record in merged.iter() {
                writer.serialize(StoreRow::from(record))?;
            }
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;

        info!("Saved {} observations", merged.len());
        Ok(merged.len())
    }
}
