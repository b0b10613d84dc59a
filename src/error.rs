//! Error types for the ingestion engine

use thiserror::Error;

/// Errors raised by a [`QuakeStore`](crate::store::QuakeStore)
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Store not initialized: missing table `{0}`")]
    NotInitialized(&'static str),

    #[error("A write scope is already open")]
    ScopeAlreadyOpen,

    #[error("Write scope {0} does not belong to the open transaction")]
    UnknownScope(u64),
}

/// Terminal failure of an `ingest` call
///
/// Record-level rejections never appear here; they are reported through
/// [`IngestReporter`](crate::progress::IngestReporter).
#[derive(Error, Debug)]
pub enum IngestError {
    /// The store could not open a write scope
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// Batch `batch` (zero-based) could not be applied; earlier batches stay committed
    #[error("Batch {batch} failed to commit: {source}")]
    BatchCommitFailed {
        batch: usize,
        #[source]
        source: StoreError,
    },

    /// Upstream fetch/decode failure, passed through unchanged
    #[error("Feed source unreadable: {0:#}")]
    SourceUnreadable(anyhow::Error),
}

pub type Result<T> = std::result::Result<T, IngestError>;
