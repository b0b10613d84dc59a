// Quake Ingest - Core Library
// Batch ingestion + deduplication of earthquake feeds into SQLite,
// with a live, sorted view for concurrent readers

pub mod quake;
pub mod validator;
pub mod error;
pub mod store;
pub mod db;
pub mod importer;
pub mod view;
pub mod progress;
pub mod engine;
pub mod config;
pub mod logging;
pub mod feed;

// Re-export commonly used types
pub use quake::{Quake, RawRecord};
pub use validator::{validate, Field, RejectReason, Rejection};
pub use error::{IngestError, StoreError};
pub use store::{ChangeSet, CommitReceipt, QuakeStore, Upsert, WriteScope};
pub use db::{setup_database, SqliteStore};
pub use importer::{BatchImporter, ImportSummary, DEFAULT_BATCH_SIZE};
pub use view::{ChangeCallback, LiveView, Snapshot, ViewSync};
pub use progress::{
    IngestEvent, IngestReporter, RejectionCollector, SilentReporter, TracingReporter,
};
pub use engine::{IngestEngine, IngestSummary};
pub use config::IngestConfig;
pub use logging::{init_logging, LogConfig, LogFormat};
pub use feed::{decode_csv, decode_geojson, open_feed, RecordStream};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
