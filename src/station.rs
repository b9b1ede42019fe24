//! Station metadata returned by the callbook and kept in the local store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Everything the filter chain and renderer know about one station.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StationRecord {
    pub call_sign: String,

    /// Maidenhead locator, 4 to 6 characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cq_zone: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itu_zone: Option<u8>,

    /// Operator name, only used by the cache dump.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

impl StationRecord {
    pub fn new(call_sign: impl Into<String>) -> Self {
        Self {
            call_sign: call_sign.into(),
            ..Default::default()
        }
    }

    /// The first two characters of the grid square, upper-cased.
    pub fn grid_prefix(&self) -> Option<String> {
        self.grid
            .as_deref()
            .and_then(|g| g.get(..2))
            .map(|p| p.to_ascii_uppercase())
    }

    /// Latitude and longitude, if both are known.
    pub fn position(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

impl fmt::Display for StationRecord {
    /// One line in the `CALL   name, city, state, country, grid` layout.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:6}  ", self.call_sign)?;
        let parts = [
            &self.name,
            &self.city,
            &self.state,
            &self.country,
            &self.grid,
        ];
        let fields: Vec<&str> = parts.iter().filter_map(|p| p.as_deref()).collect();
        f.write_str(&fields.join(", "))
    }
}

/// Outcome of resolving a call sign through the enrichment cache.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The station is known.
    Found(StationRecord),
    /// The callbook definitively has no record for this call sign.
    NotFound,
    /// The lookup failed; nothing was cached.
    Error(String),
}

impl Resolution {
    /// The record, if any. `NotFound` and `Error` both mean "no data".
    pub fn record(&self) -> Option<&StationRecord> {
        match self {
            Resolution::Found(record) => Some(record),
            Resolution::NotFound | Resolution::Error(_) => None,
        }
    }

    pub fn into_record(self) -> Option<StationRecord> {
        match self {
            Resolution::Found(record) => Some(record),
            Resolution::NotFound | Resolution::Error(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_prefix() {
        let mut record = StationRecord::new("W1AW");
        assert_eq!(record.grid_prefix(), None);

        record.grid = Some("fn31pr".to_string());
        assert_eq!(record.grid_prefix(), Some("FN".to_string()));

        record.grid = Some("F".to_string());
        assert_eq!(record.grid_prefix(), None);
    }

    #[test]
    fn test_position_requires_both() {
        let mut record = StationRecord::new("W1AW");
        record.latitude = Some(41.7);
        assert_eq!(record.position(), None);
        record.longitude = Some(-72.7);
        assert_eq!(record.position(), Some((41.7, -72.7)));
    }

    #[test]
    fn test_resolution_record() {
        let found = Resolution::Found(StationRecord::new("W1AW"));
        assert_eq!(found.record().map(|r| r.call_sign.as_str()), Some("W1AW"));
        assert!(Resolution::NotFound.record().is_none());
        assert!(Resolution::Error("timeout".to_string()).record().is_none());
    }

    #[test]
    fn test_display_skips_missing_fields() {
        let mut record = StationRecord::new("W1AW");
        record.state = Some("CT".to_string());
        record.grid = Some("FN31".to_string());
        assert_eq!(record.to_string(), "W1AW    CT, FN31");
    }
}
