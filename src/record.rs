//! Parsing of tab-delimited device-install lines
//!
//! Each line carries five fields: device type, device id, latitude,
//! longitude and a comma-separated list of installed app ids.

use log::warn;
use thiserror::Error;

/// Number of tab-separated fields a record needs
pub const FIELD_COUNT: usize = 5;

/// One parsed device-install record
#[derive(Debug, Clone, PartialEq)]
pub struct AppsInstalled {
    pub dev_type: String,
    pub dev_id: String,
    pub lat: f64,
    pub lon: f64,
    pub apps: Vec<i64>,
}

/// Reasons a line yields no record at all
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedLine {
    #[error("expected {FIELD_COUNT} tab-separated fields, got {0}")]
    TooFewFields(usize),
    #[error("empty device type")]
    MissingDeviceType,
    #[error("empty device id")]
    MissingDeviceId,
}

/// Best-effort corrections applied while parsing a record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Corrections {
    /// Some app tokens were not integers and were dropped
    pub apps_filtered: bool,
    /// Latitude did not parse and was replaced with NaN
    pub bad_lat: bool,
    /// Longitude did not parse and was replaced with NaN
    pub bad_lon: bool,
}

impl Corrections {
    pub fn any(&self) -> bool {
        self.apps_filtered || self.bad_lat || self.bad_lon
    }
}

/// A record together with the corrections needed to produce it
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub record: AppsInstalled,
    pub corrections: Corrections,
}

/// Strip surrounding spaces and line endings. Tabs are field separators
/// and stay, so empty leading or trailing fields keep their position.
pub fn trim_line(line: &str) -> &str {
    line.trim_matches(|c| c == ' ' || c == '\r' || c == '\n')
}

/// Parse a trimmed line without logging.
pub fn parse_record(line: &str) -> Result<ParsedLine, MalformedLine> {
    let parts: Vec<&str> = trim_line(line).split('\t').collect();
    if parts.len() < FIELD_COUNT {
        return Err(MalformedLine::TooFewFields(parts.len()));
    }

    let (dev_type, dev_id) = (parts[0], parts[1]);
    if dev_type.is_empty() {
        return Err(MalformedLine::MissingDeviceType);
    }
    if dev_id.is_empty() {
        return Err(MalformedLine::MissingDeviceId);
    }

    let mut corrections = Corrections::default();

    let (apps, apps_filtered) = parse_apps(parts[4]);
    corrections.apps_filtered = apps_filtered;

    let lat = parts[2].trim().parse::<f64>().unwrap_or_else(|_| {
        corrections.bad_lat = true;
        f64::NAN
    });
    let lon = parts[3].trim().parse::<f64>().unwrap_or_else(|_| {
        corrections.bad_lon = true;
        f64::NAN
    });

    Ok(ParsedLine {
        record: AppsInstalled {
            dev_type: dev_type.to_string(),
            dev_id: dev_id.to_string(),
            lat,
            lon,
            apps,
        },
        corrections,
    })
}

/// Parse a line, logging recoverable corrections.
///
/// Returns `None` for malformed lines; those are not errors and are not
/// counted by the caller.
pub fn parse_line(line: &str) -> Option<AppsInstalled> {
    let parsed = parse_record(line).ok()?;
    log_corrections(line, &parsed.corrections);
    Some(parsed.record)
}

/// Warn about each correction applied to `line`.
pub fn log_corrections(line: &str, corrections: &Corrections) {
    if corrections.apps_filtered {
        warn!("Not all user apps are digits: `{}`", line);
    }
    if corrections.bad_lat || corrections.bad_lon {
        warn!("Invalid geo coords: `{}`", line);
    }
}

/// Returns the app list and whether any token had to be dropped.
fn parse_apps(raw: &str) -> (Vec<i64>, bool) {
    if raw.trim().is_empty() {
        return (Vec::new(), false);
    }

    let strict: Result<Vec<i64>, _> = raw.split(',').map(|a| a.trim().parse::<i64>()).collect();
    match strict {
        Ok(apps) => (apps, false),
        Err(_) => {
            let apps = raw
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty() && a.bytes().all(|b| b.is_ascii_digit()))
                .filter_map(|a| a.parse::<i64>().ok())
                .collect();
            (apps, true)
        }
    }
}
