use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use crate::fetcher::DEFAULT_BASE_URL;
use crate::pns::NormalizerConfig;
use crate::utils::{canonical_station_code, parse_office_codes};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid office code in {var}: '{value}'")]
    InvalidOffice { var: &'static str, value: String },
    #[error("Invalid UTC offset in {var}: '{value}'")]
    InvalidOffset { var: &'static str, value: String },
    #[error("{0} must list at least one office")]
    NoOffices(&'static str),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub pns_base_url: String,
    pub offices: Vec<String>,
    pub pages_per_office: u32,
    pub fetch_interval_minutes: u64,
    pub fetch_concurrency: usize,
    pub store_path: PathBuf,
    pub station_reference_path: PathBuf,
    pub default_utc_offset_hours: i32,
    pub office_utc_offsets: HashMap<String, i32>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let offices = parse_office_codes(
            &env::var("PNS_OFFICES").unwrap_or_else(|_| "OKX,ALY,BOX".to_string()),
        )
        .map_err(|value| ConfigError::InvalidOffice {
            var: "PNS_OFFICES",
            value,
        })?;
        if offices.is_empty() {
            return Err(ConfigError::NoOffices("PNS_OFFICES"));
        }

        let default_utc_offset_hours = match env::var("DEFAULT_UTC_OFFSET_HOURS") {
            Ok(value) => parse_offset(&value).ok_or(ConfigError::InvalidOffset {
                var: "DEFAULT_UTC_OFFSET_HOURS",
                value,
            })?,
            Err(_) => -5,
        };

        let office_utc_offsets =
            parse_office_offsets(&env::var("OFFICE_UTC_OFFSETS").unwrap_or_default())?;

        Ok(Config {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            pns_base_url: env::var("PNS_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            offices,
            pages_per_office: env::var("PNS_PAGES_PER_OFFICE")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .unwrap_or(1),
            fetch_interval_minutes: env::var("FETCH_INTERVAL_MINUTES")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .unwrap_or(60),
            fetch_concurrency: env::var("FETCH_CONCURRENCY")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .unwrap_or(4),
            store_path: env::var("STORE_PATH")
                .unwrap_or_else(|_| "data/observations.tsv".to_string())
                .into(),
            station_reference_path: env::var("STATION_REFERENCE_PATH")
                .unwrap_or_else(|_| "reference-data/stations.tsv".to_string())
                .into(),
            default_utc_offset_hours,
            office_utc_offsets,
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn normalizer_config(&self) -> NormalizerConfig {
        NormalizerConfig {
            default_utc_offset_hours: self.default_utc_offset_hours,
            office_utc_offsets: self.office_utc_offsets.clone(),
        }
    }
}

fn parse_offset(value: &str) -> Option<i32> {
    value
        .trim()
        .parse::<i32>()
        .ok()
        .filter(|hours| (-12..=14).contains(hours))
}

/// Parse `"ABQ:-7,BOU:-7"` into per-office offsets
fn parse_office_offsets(value: &str) -> Result<HashMap<String, i32>, ConfigError> {
    let mut offsets = HashMap::new();
    for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let invalid = || ConfigError::InvalidOffset {
            var: "OFFICE_UTC_OFFSETS",
            value: entry.to_string(),
        };
        let (office, hours) = entry.split_once(':').ok_or_else(invalid)?;
        let office = canonical_station_code(office).ok_or_else(invalid)?;
        let hours = parse_offset(hours).ok_or_else(invalid)?;
        offsets.insert(office, hours);
    }
    Ok(offsets)
}
