// ✅ Entity Validator - RawRecord → Quake, or a Rejection
//
// A record becomes a Quake only when code, magnitude, place and time are all
// present. Rejections are recoverable: the importer reports them and moves on.

use crate::quake::{Quake, RawRecord};
use chrono::DateTime;
use serde::Serialize;
use std::fmt;

// ============================================================================
// REJECTION TYPES
// ============================================================================

/// Required feed fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Code,
    Magnitude,
    Place,
    Time,
}

impl Field {
    pub fn name(&self) -> &'static str {
        match self {
            Field::Code => "code",
            Field::Magnitude => "magnitude",
            Field::Place => "place",
            Field::Time => "time",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RejectReason {
    /// One or more required fields were absent
    MissingData(Vec<Field>),

    /// Timestamp present but not representable (NaN, infinite, out of range)
    InvalidTimestamp(f64),

    /// Magnitude present but not a finite `f32`
    InvalidMagnitude(f64),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::MissingData(fields) => {
                let names: Vec<&str> = fields.iter().map(Field::name).collect();
                write!(f, "missing data: {}", names.join(", "))
            }
            RejectReason::InvalidTimestamp(millis) => {
                write!(f, "invalid timestamp: {}", millis)
            }
            RejectReason::InvalidMagnitude(magnitude) => {
                write!(f, "invalid magnitude: {}", magnitude)
            }
        }
    }
}

/// Rejection - a record that could not become a Quake
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    /// Zero-based position of the record in the ingested sequence
    pub position: usize,

    /// Record code, when the feed provided one
    pub code: Option<String>,

    pub reason: RejectReason,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "record #{} ({}): {}",
            self.position,
            self.code.as_deref().unwrap_or("<no code>"),
            self.reason
        )
    }
}

impl std::error::Error for Rejection {}

// ============================================================================
// VALIDATION
// ============================================================================

/// Validate a raw record at `position` in its input sequence
pub fn validate(raw: &RawRecord, position: usize) -> Result<Quake, Rejection> {
    let reject = |reason| Rejection {
        position,
        code: raw.code.clone(),
        reason,
    };

    let (code, magnitude, place, millis) =
        match (&raw.code, raw.magnitude, &raw.place, raw.timestamp_millis) {
            (Some(code), Some(magnitude), Some(place), Some(millis)) => {
                (code, magnitude, place, millis)
            }
            _ => return Err(reject(RejectReason::MissingData(missing_fields(raw)))),
        };

    let stored_magnitude = magnitude as f32;
    if !stored_magnitude.is_finite() {
        return Err(reject(RejectReason::InvalidMagnitude(magnitude)));
    }

    // Feed encodes milliseconds; the entity keeps time = millis / 1000 seconds
    if !millis.is_finite() {
        return Err(reject(RejectReason::InvalidTimestamp(millis)));
    }
    let time = DateTime::from_timestamp_millis(millis.round() as i64)
        .ok_or_else(|| reject(RejectReason::InvalidTimestamp(millis)))?;

    Ok(Quake {
        code: code.clone(),
        magnitude: stored_magnitude,
        place: place.clone(),
        time,
    })
}

fn missing_fields(raw: &RawRecord) -> Vec<Field> {
    let mut missing = Vec::new();
    if raw.code.is_none() {
        missing.push(Field::Code);
    }
    if raw.magnitude.is_none() {
        missing.push(Field::Magnitude);
    }
    if raw.place.is_none() {
        missing.push(Field::Place);
    }
    if raw.timestamp_millis.is_none() {
        missing.push(Field::Time);
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> RawRecord {
        RawRecord::new("nc73", 3.2, "5km SW of Cobb, CA", 1_700_000_000_500.0)
    }

    #[test]
    fn test_valid_record_becomes_quake() {
        let quake = validate(&full(), 0).unwrap();

        assert_eq!(quake.code, "nc73");
        assert_eq!(quake.magnitude, 3.2_f32);
        assert_eq!(quake.place, "5km SW of Cobb, CA");
        assert_eq!(quake.time.timestamp(), 1_700_000_000);
        assert_eq!(quake.time.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_each_missing_field_is_rejected() {
        let cases = vec![
            (full().without_code(), Field::Code),
            (full().without_magnitude(), Field::Magnitude),
            (full().without_place(), Field::Place),
            (full().without_time(), Field::Time),
        ];

        for (raw, field) in cases {
            let rejection = validate(&raw, 7).unwrap_err();
            assert_eq!(rejection.position, 7);
            assert_eq!(rejection.reason, RejectReason::MissingData(vec![field]));
        }
    }

    #[test]
    fn test_rejection_lists_every_missing_field() {
        let raw = full().without_place().without_time();
        let rejection = validate(&raw, 2).unwrap_err();

        assert_eq!(rejection.code.as_deref(), Some("nc73"));
        assert_eq!(
            rejection.reason,
            RejectReason::MissingData(vec![Field::Place, Field::Time])
        );
        assert_eq!(
            rejection.to_string(),
            "record #2 (nc73): missing data: place, time"
        );
    }

    #[test]
    fn test_empty_record_has_no_code() {
        let rejection = validate(&RawRecord::default(), 0).unwrap_err();

        assert_eq!(rejection.code, None);
        assert!(rejection.to_string().contains("<no code>"));
    }

    #[test]
    fn test_unrepresentable_timestamp_is_rejected() {
        let mut raw = full();
        raw.timestamp_millis = Some(f64::INFINITY);
        assert!(matches!(
            validate(&raw, 0).unwrap_err().reason,
            RejectReason::InvalidTimestamp(_)
        ));

        raw.timestamp_millis = Some(1e30);
        assert!(matches!(
            validate(&raw, 0).unwrap_err().reason,
            RejectReason::InvalidTimestamp(_)
        ));
    }

    #[test]
    fn test_non_finite_magnitude_is_rejected() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 1e300] {
            let mut raw = full();
            raw.magnitude = Some(bad);

            let rejection = validate(&raw, 4).unwrap_err();
            assert_eq!(rejection.position, 4);
            assert!(matches!(rejection.reason, RejectReason::InvalidMagnitude(_)));
        }

        let mut raw = full();
        raw.magnitude = Some(-1.5);
        assert_eq!(validate(&raw, 0).unwrap().magnitude, -1.5_f32);
    }
}
