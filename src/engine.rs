//! Ingestion engine.
//!
//! [`IngestEngine`] owns the store, the batch importer and the view bridge,
//! and exposes them as a single `ingest` call. It is the only writer: every
//! method that touches the store takes `&mut self`. Readers use the
//! [`LiveView`] handle returned by [`IngestEngine::live_view`].
//!
//! # Example
//!
//! ```no_run
//! use quake_ingest::{IngestEngine, RawRecord, SqliteStore};
//!
//! # fn main() -> anyhow::Result<()> {
//! let store = SqliteStore::open(std::path::Path::new("quakes.db"))?;
//! let mut engine = IngestEngine::with_default_batch_size(store)?;
//! let view = engine.live_view();
//! engine.on_change(|| println!("view changed"));
//!
//! let summary = engine.ingest(vec![RawRecord::new("ci1", 2.4, "Ridgecrest", 1.7e12)])?;
//! println!("{} inserted, {} quakes visible", summary.inserted, view.len());
//! # Ok(())
//! # }
//! ```

use crate::error::IngestError;
use crate::importer::{BatchImporter, ImportSummary};
use crate::progress::{IngestEvent, IngestReporter, TracingReporter};
use crate::quake::RawRecord;
use crate::store::QuakeStore;
use crate::view::{LiveView, ViewSync};
use serde::Serialize;
use std::convert::Infallible;
use std::num::NonZeroUsize;
use tracing::info_span;
use uuid::Uuid;

/// Result of one successful `ingest` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub run_id: Uuid,
    pub records_seen: usize,
    pub batches_committed: usize,
    pub inserted: usize,
    pub replaced: usize,
    pub rejected: usize,
}

impl IngestSummary {
    fn new(run_id: Uuid, import: ImportSummary) -> Self {
        IngestSummary {
            run_id,
            records_seen: import.records_seen,
            batches_committed: import.batches_committed,
            inserted: import.inserted,
            replaced: import.replaced,
            rejected: import.rejected,
        }
    }
}

pub struct IngestEngine<S: QuakeStore> {
    store: S,
    importer: BatchImporter,
    sync: ViewSync,
}

impl<S: QuakeStore> IngestEngine<S> {
    /// Build an engine over `store`; the live view starts with the store's contents
    pub fn new(store: S, batch_size: NonZeroUsize) -> Result<Self, IngestError> {
        Self::with_importer(store, BatchImporter::new(batch_size))
    }

    pub fn with_default_batch_size(store: S) -> Result<Self, IngestError> {
        Self::with_importer(store, BatchImporter::default())
    }

    fn with_importer(store: S, importer: BatchImporter) -> Result<Self, IngestError> {
        let mut sync = ViewSync::new(LiveView::default());
        sync.propagate(&store)
            .map_err(IngestError::StoreUnavailable)?;

        Ok(IngestEngine {
            store,
            importer,
            sync,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.importer.batch_size()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reader handle; clone it freely and hand it to other threads
    pub fn live_view(&self) -> LiveView {
        self.sync.view().clone()
    }

    /// Called after every propagation that changed the live view
    pub fn on_change<F>(&mut self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.sync.on_change(Box::new(callback));
    }

    /// Ingest decoded records, logging progress through `tracing`
    pub fn ingest<I>(&mut self, records: I) -> Result<IngestSummary, IngestError>
    where
        I: IntoIterator<Item = RawRecord>,
    {
        self.ingest_with_reporter(records, &TracingReporter)
    }

    pub fn ingest_with_reporter<I, R>(
        &mut self,
        records: I,
        reporter: &R,
    ) -> Result<IngestSummary, IngestError>
    where
        I: IntoIterator<Item = RawRecord>,
        R: IngestReporter + ?Sized,
    {
        let records = records.into_iter().map(Ok::<_, Infallible>);
        self.ingest_fallible_with_reporter(records, reporter)
    }

    /// Ingest a stream whose items may carry upstream decode errors.
    ///
    /// The first `Err` ends the run with [`IngestError::SourceUnreadable`].
    pub fn ingest_fallible<I, E>(&mut self, records: I) -> Result<IngestSummary, IngestError>
    where
        I: IntoIterator<Item = Result<RawRecord, E>>,
        E: Into<anyhow::Error>,
    {
        self.ingest_fallible_with_reporter(records, &TracingReporter)
    }

    pub fn ingest_fallible_with_reporter<I, E, R>(
        &mut self,
        records: I,
        reporter: &R,
    ) -> Result<IngestSummary, IngestError>
    where
        I: IntoIterator<Item = Result<RawRecord, E>>,
        E: Into<anyhow::Error>,
        R: IngestReporter + ?Sized,
    {
        let run_id = Uuid::new_v4();
        let span = info_span!("ingest", %run_id, batch_size = self.importer.batch_size());
        let _entered = span.enter();

        reporter.report(IngestEvent::Started { run_id });

        let result =
            self.importer
                .import_all(&mut self.store, &mut self.sync, reporter, records);

        match result {
            Ok(import) => {
                let summary = IngestSummary::new(run_id, import);
                reporter.report(IngestEvent::Finished { summary: &summary });
                Ok(summary)
            }
            Err(e) => {
                let message = e.to_string();
                reporter.report(IngestEvent::Failed { error: &message });
                Err(e)
            }
        }
    }

    /// Fetch records from an external source, then ingest them.
    ///
    /// A failing `fetch` is reported as [`IngestError::SourceUnreadable`]
    /// before the store is touched.
    pub fn ingest_source<F, I>(&mut self, fetch: F) -> Result<IngestSummary, IngestError>
    where
        F: FnOnce() -> anyhow::Result<I>,
        I: IntoIterator<Item = anyhow::Result<RawRecord>>,
    {
        let records = fetch().map_err(IngestError::SourceUnreadable)?;
        self.ingest_fallible(records)
    }
}
