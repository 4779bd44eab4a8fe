/// Shared utility functions for the snow report service
///
/// Canonicalize a station or office identifier to its 3-letter form
///
/// PNS bulletins identify stations by 3-letter codes, but some reports use the
/// 4-letter ICAO form with a leading `K` (CONUS) or `P` (Pacific/Alaska).
/// Those are reduced to the 3-letter code. Anything else is rejected.
///
/// # Examples
///
/// ```
/// use snow_report_service::utils::canonical_station_code;
///
/// assert_eq!(canonical_station_code("ALY").unwrap(), "ALY");
/// assert_eq!(canonical_station_code("kbox").unwrap(), "BOX");
/// assert_eq!(canonical_station_code("PHNL").unwrap(), "HNL");
/// assert!(canonical_station_code("SNOW").is_none());
/// ```
pub fn canonical_station_code(value: &str) -> Option<String> {
    let code = value.trim().to_ascii_uppercase();
    if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    match code.len() {
        3 => Some(code),
        4 if code.starts_with('K') || code.starts_with('P') => Some(code[1..].to_string()),
        _ => None,
    }
}

/// Parse a comma-separated list of office codes, e.g. `"OKX, ALY,box"`
///
/// Empty entries are skipped. Returns the first entry that is not a valid code as the error.
pub fn parse_office_codes(value: &str) -> Result<Vec<String>, String> {
    let mut offices = Vec::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let code = canonical_station_code(part).ok_or_else(|| part.to_string())?;
        if !offices.contains(&code) {
            offices.push(code);
        }
    }
    Ok(offices)
}
