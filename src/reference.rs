/// Station reference table
///
/// Approximate coordinates per station, keyed by canonical station code.
/// Loaded from a tab-delimited file: `station_id  name  latitude  longitude`.
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::utils::canonical_station_code;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct StationInfo {
    pub station_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Default)]
pub struct StationDirectory {
    stations: HashMap<String, StationInfo>,
}

impl StationDirectory {
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let directory = Self::parse(&content);
        debug!(path = %path.display(), stations = directory.len(), "Loaded station reference table");
        Ok(directory)
    }

    pub fn parse(content: &str) -> Self {
        let mut stations = HashMap::new();
        let mut skipped_rows = 0;

        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("station_id") {
                continue;
            }

            let parts: Vec<&str> = trimmed.split('\t').map(str::trim).collect();
            let parsed = match parts.as_slice() {
                [code, name, lat, lon] => match (
                    canonical_station_code(code),
                    lat.parse::<f64>(),
                    lon.parse::<f64>(),
                ) {
                    (Some(station_id), Ok(latitude), Ok(longitude)) => Some(StationInfo {
                        station_id,
                        name: name.to_string(),
                        latitude,
                        longitude,
                    }),
                    _ => None,
                },
                _ => None,
            };

            match parsed {
                Some(info) => {
                    stations.insert(info.station_id.clone(), info);
                }
                None => {
                    debug!("Unparseable reference row: {}", trimmed);
                    skipped_rows += 1;
                }
            }
        }

        if skipped_rows > 0 {
            warn!("Skipped {} unparseable station reference rows", skipped_rows);
        }
        Self { stations }
    }

    pub fn get(&self, station_id: &str) -> Option<&StationInfo> {
        self.stations.get(station_id)
    }

    /// `(latitude, longitude)` for a station, if known
    pub fn coordinates(&self, station_id: &str) -> Option<(f64, f64)> {
        self.get(station_id).map(|s| (s.latitude, s.longitude))
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}
