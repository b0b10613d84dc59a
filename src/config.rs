//! Environment-driven configuration.
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `QUAKES_DATABASE` | `quakes.db` | SQLite database file |
//! | `QUAKES_BATCH_SIZE` | `256` | records per committed batch (> 0) |
//! | `QUAKES_FEED` | unset | feed file the server refreshes from |
//! | `QUAKES_LOG` | `info` | `tracing` filter directives |
//! | `QUAKES_LOG_FORMAT` | `text` | `text` or `json` |

use crate::importer::DEFAULT_BATCH_SIZE;
use crate::logging::LogConfig;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub database_path: PathBuf,
    pub batch_size: usize,
    pub feed_path: Option<PathBuf>,
    pub log: LogConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            database_path: PathBuf::from("quakes.db"),
            batch_size: DEFAULT_BATCH_SIZE,
            feed_path: None,
            log: LogConfig::default(),
        }
    }
}

impl IngestConfig {
    /// Load from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key → value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("QUAKES_DATABASE") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(size) = lookup("QUAKES_BATCH_SIZE") {
            config.batch_size = size
                .trim()
                .parse()
                .with_context(|| format!("QUAKES_BATCH_SIZE is not a number: {}", size))?;
        }

        if let Some(feed) = lookup("QUAKES_FEED") {
            config.feed_path = Some(PathBuf::from(feed));
        }

        if let Some(filter) = lookup("QUAKES_LOG") {
            config.log.filter = filter;
        }

        if let Some(format) = lookup("QUAKES_LOG_FORMAT") {
            config.log.format = format.parse()?;
        }

        config.validated_batch_size()?;
        Ok(config)
    }

    pub fn validated_batch_size(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.batch_size).ok_or_else(|| anyhow!("batch size must be greater than 0"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogFormat;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = IngestConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config, IngestConfig::default());
        assert_eq!(config.validated_batch_size().unwrap().get(), 256);
    }

    #[test]
    fn test_env_overrides() {
        let config = IngestConfig::from_lookup(lookup(&[
            ("QUAKES_DATABASE", "/var/lib/quakes/q.db"),
            ("QUAKES_BATCH_SIZE", " 64 "),
            ("QUAKES_FEED", "all_month.geojson"),
            ("QUAKES_LOG", "debug"),
            ("QUAKES_LOG_FORMAT", "json"),
        ]))
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/var/lib/quakes/q.db"));
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.feed_path, Some(PathBuf::from("all_month.geojson")));
        assert_eq!(config.log.filter, "debug");
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn test_zero_or_garbage_batch_size_rejected() {
        assert!(IngestConfig::from_lookup(lookup(&[("QUAKES_BATCH_SIZE", "0")])).is_err());
        assert!(IngestConfig::from_lookup(lookup(&[("QUAKES_BATCH_SIZE", "lots")])).is_err());
    }

    #[test]
    fn test_deserializes_partial_json() {
        let config: IngestConfig = serde_json::from_str(r#"{"batch_size": 32}"#).unwrap();

        assert_eq!(config.batch_size, 32);
        assert_eq!(config.database_path, PathBuf::from("quakes.db"));
    }
}
