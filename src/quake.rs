// 🌍 Quake records - raw feed entries and persisted entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// ============================================================================
// RAW RECORD
// ============================================================================

/// RawRecord - one decoded feed entry, before validation
///
/// Every field is optional: the feed may omit any of them, and the validator
/// decides whether the record becomes a [`Quake`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RawRecord {
    #[serde(default, rename = "mag")]
    pub magnitude: Option<f64>,

    #[serde(default)]
    pub place: Option<String>,

    /// Milliseconds since the Unix epoch, as the feed encodes it
    #[serde(default, rename = "time")]
    pub timestamp_millis: Option<f64>,

    #[serde(default)]
    pub code: Option<String>,
}

impl RawRecord {
    /// Fully populated record
    pub fn new(code: &str, magnitude: f64, place: &str, timestamp_millis: f64) -> Self {
        RawRecord {
            magnitude: Some(magnitude),
            place: Some(place.to_string()),
            timestamp_millis: Some(timestamp_millis),
            code: Some(code.to_string()),
        }
    }

    pub fn without_place(mut self) -> Self {
        self.place = None;
        self
    }

    pub fn without_magnitude(mut self) -> Self {
        self.magnitude = None;
        self
    }

    pub fn without_time(mut self) -> Self {
        self.timestamp_millis = None;
        self
    }

    pub fn without_code(mut self) -> Self {
        self.code = None;
        self
    }
}

// ============================================================================
// QUAKE ENTITY
// ============================================================================

/// Quake - a validated, persisted earthquake event
///
/// `code` is the unique key. All fields are always populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quake {
    pub code: String,
    pub magnitude: f32,
    pub place: String,
    pub time: DateTime<Utc>,
}

impl Quake {
    /// Seconds since the epoch, the unit the store indexes on
    pub fn epoch_seconds(&self) -> f64 {
        self.time.timestamp_millis() as f64 / 1000.0
    }

    /// Rebuild the timestamp from stored epoch seconds
    pub fn time_from_epoch_seconds(seconds: f64) -> Option<DateTime<Utc>> {
        if !seconds.is_finite() {
            return None;
        }
        DateTime::from_timestamp_millis((seconds * 1000.0).round() as i64)
    }

    /// Live view ordering: newest first, ties broken by code
    pub fn view_order(a: &Quake, b: &Quake) -> Ordering {
        b.time.cmp(&a.time).then_with(|| a.code.cmp(&b.code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quake(code: &str, millis: i64) -> Quake {
        Quake {
            code: code.to_string(),
            magnitude: 1.0,
            place: "Nowhere".to_string(),
            time: DateTime::from_timestamp_millis(millis).unwrap(),
        }
    }

    #[test]
    fn test_raw_record_deserializes_feed_property_names() {
        let json = r#"{"mag": 4.5, "place": "10km N of Somewhere", "time": 1700000000123, "code": "ak01"}"#;
        let raw: RawRecord = serde_json::from_str(json).unwrap();

        assert_eq!(raw.magnitude, Some(4.5));
        assert_eq!(raw.place.as_deref(), Some("10km N of Somewhere"));
        assert_eq!(raw.timestamp_millis, Some(1_700_000_000_123.0));
        assert_eq!(raw.code.as_deref(), Some("ak01"));
    }

    #[test]
    fn test_raw_record_tolerates_missing_and_null_fields() {
        let raw: RawRecord = serde_json::from_str(r#"{"mag": null, "code": "x"}"#).unwrap();

        assert_eq!(raw.magnitude, None);
        assert_eq!(raw.place, None);
        assert_eq!(raw.timestamp_millis, None);
        assert_eq!(raw.code.as_deref(), Some("x"));
    }

    #[test]
    fn test_epoch_seconds_round_trip() {
        let q = quake("a", 1_700_000_000_123);
        let secs = q.epoch_seconds();

        assert!((secs - 1_700_000_000.123).abs() < 1e-6);
        assert_eq!(Quake::time_from_epoch_seconds(secs), Some(q.time));
        assert_eq!(Quake::time_from_epoch_seconds(f64::NAN), None);
    }

    #[test]
    fn test_view_order_newest_first_then_code() {
        let mut quakes = vec![quake("b", 1_000), quake("c", 5_000), quake("a", 1_000)];
        quakes.sort_by(Quake::view_order);

        let codes: Vec<&str> = quakes.iter().map(|q| q.code.as_str()).collect();
        assert_eq!(codes, vec!["c", "a", "b"]);
    }
}
