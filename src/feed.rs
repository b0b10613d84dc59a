// 📡 Feed decoding - USGS-style GeoJSON / CSV files → RawRecord
//
// This sits outside the engine: it turns feed bytes into RawRecords and
// leaves validation to the validator. Whole-file decode errors surface as
// `Err`; the engine reports them as SourceUnreadable.

use crate::quake::RawRecord;
use anyhow::{anyhow, Context, Result};
use chrono::DateTime;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::debug;

/// Decoded records, possibly still streaming from disk
pub type RecordStream = Box<dyn Iterator<Item = Result<RawRecord>>>;

// ============================================================================
// GEOJSON
// ============================================================================

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: RawRecord,
}

/// Decode a GeoJSON FeatureCollection; each feature's `properties` is one record
pub fn decode_geojson<R: Read>(reader: R) -> Result<Vec<RawRecord>> {
    let collection: FeatureCollection =
        serde_json::from_reader(reader).context("Failed to decode GeoJSON feed")?;

    Ok(collection
        .features
        .into_iter()
        .map(|feature| feature.properties)
        .collect())
}

// ============================================================================
// CSV
// ============================================================================

/// One CSV row. The feed keys rows by `id`; a `code` column wins when present.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    mag: Option<f64>,
    #[serde(default)]
    place: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl From<CsvRow> for RawRecord {
    fn from(row: CsvRow) -> Self {
        // An unparseable time is left empty; the validator rejects the record
        let timestamp_millis = row.time.as_deref().and_then(|t| {
            match DateTime::parse_from_rfc3339(t) {
                Ok(dt) => Some(dt.timestamp_millis() as f64),
                Err(e) => {
                    debug!(time = t, error = %e, "Unparseable CSV time");
                    None
                }
            }
        });

        RawRecord {
            magnitude: row.mag,
            place: row.place,
            timestamp_millis,
            code: row.code.or(row.id),
        }
    }
}

/// Decode CSV lazily, one record per row
pub fn decode_csv<R: Read + 'static>(reader: R) -> RecordStream {
    let rows = csv::Reader::from_reader(reader)
        .into_deserialize::<CsvRow>()
        .map(|row| {
            row.map(RawRecord::from)
                .context("Failed to decode CSV feed row")
        });
    Box::new(rows)
}

// ============================================================================
// FILES
// ============================================================================

/// Open a feed file, choosing the decoder from its extension
pub fn open_feed(path: &Path) -> Result<RecordStream> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let file = File::open(path)
        .with_context(|| format!("Failed to open feed file {}", path.display()))?;
    let reader = BufReader::new(file);

    debug!(path = %path.display(), format = %extension, "Opening feed");

    match extension.as_str() {
        "json" | "geojson" => {
            let records = decode_geojson(reader)?;
            Ok(Box::new(records.into_iter().map(Ok)))
        }
        "csv" => Ok(decode_csv(reader)),
        other => Err(anyhow!(
            "Unsupported feed format '{}' for {} (expected .geojson, .json or .csv)",
            other,
            path.display()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const GEOJSON: &str = r#"{
        "type": "FeatureCollection",
        "metadata": {"title": "USGS All Earthquakes, Past Hour"},
        "features": [
            {"type": "Feature", "id": "ak1",
             "properties": {"mag": 1.6, "place": "40 km SW of Talkeetna, Alaska", "time": 1700000000000, "code": "ak1", "tsunami": 0}},
            {"type": "Feature", "id": "nc2",
             "properties": {"mag": null, "place": "7 km NW of The Geysers, CA", "time": 1700000060000, "code": "nc2"}}
        ]
    }"#;

    const CSV: &str = "time,latitude,longitude,depth,mag,magType,id,place\n\
2023-11-14T22:13:20.000Z,61.9,-150.6,50.1,1.6,ml,ak1,\"40 km SW of Talkeetna, Alaska\"\n\
2023-11-14T22:14:20.000Z,38.8,-122.8,2.1,,md,nc2,\"7 km NW of The Geysers, CA\"\n\
not-a-time,38.8,-122.8,2.1,0.9,md,nc3,Somewhere\n";

    #[test]
    fn test_decode_geojson_properties() {
        let records = decode_geojson(GEOJSON.as_bytes()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0],
            RawRecord::new("ak1", 1.6, "40 km SW of Talkeetna, Alaska", 1_700_000_000_000.0)
        );
        assert_eq!(records[1].magnitude, None);
        assert_eq!(records[1].code.as_deref(), Some("nc2"));
    }

    #[test]
    fn test_decode_geojson_garbage_fails() {
        assert!(decode_geojson("{\"features\": [".as_bytes()).is_err());
    }

    #[test]
    fn test_decode_csv_rows() {
        let records: Vec<RawRecord> = decode_csv(CSV.as_bytes())
            .collect::<Result<Vec<_>>>()
            .unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(
            records[0],
            RawRecord::new("ak1", 1.6, "40 km SW of Talkeetna, Alaska", 1_700_000_000_000.0)
        );
        assert_eq!(records[1].magnitude, None);
        assert_eq!(records[2].timestamp_millis, None);
        assert_eq!(records[2].code.as_deref(), Some("nc3"));
    }

    #[test]
    fn test_decode_csv_ragged_row_is_an_error() {
        let ragged = "time,mag,place,id\n2023-11-14T22:13:20Z,1.0,Here,a1\n2023-11-14T22:13:20Z,1.0\n";
        let results: Vec<Result<RawRecord>> = decode_csv(ragged.as_bytes()).collect();

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }

    #[test]
    fn test_open_feed_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let geojson_path = dir.path().join("hour.geojson");
        File::create(&geojson_path)
            .unwrap()
            .write_all(GEOJSON.as_bytes())
            .unwrap();
        assert_eq!(open_feed(&geojson_path).unwrap().count(), 2);

        let csv_path = dir.path().join("hour.CSV");
        File::create(&csv_path).unwrap().write_all(CSV.as_bytes()).unwrap();
        assert_eq!(open_feed(&csv_path).unwrap().count(), 3);

        let xml_path = dir.path().join("hour.xml");
        File::create(&xml_path).unwrap();
        assert!(open_feed(&xml_path).is_err());

        assert!(open_feed(&dir.path().join("missing.csv")).is_err());
    }
}
