// 📦 Batch Importer - validate + commit raw records in bounded chunks
//
// Records are pulled lazily from the input, at most `batch_size` at a time.
// Each chunk is one write scope: rejected records are reported and skipped,
// valid ones are upserted, and the scope commits before the next chunk starts.
// A failed commit stops the import; earlier chunks stay committed.

use crate::error::IngestError;
use crate::progress::{IngestEvent, IngestReporter};
use crate::quake::RawRecord;
use crate::store::{CommitReceipt, QuakeStore};
use crate::validator::validate;
use crate::view::ViewSync;
use std::num::NonZeroUsize;
use tracing::{debug, warn};

/// Default chunk size: amortizes transaction overhead, bounds memory
pub const DEFAULT_BATCH_SIZE: usize = 256;

// ============================================================================
// IMPORT SUMMARY
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub records_seen: usize,
    pub batches_committed: usize,
    pub inserted: usize,
    pub replaced: usize,
    pub rejected: usize,
}

enum ChunkOutcome {
    Committed {
        receipt: CommitReceipt,
        rejected: usize,
    },
    /// Every record in the chunk was rejected
    Empty { rejected: usize },
}

// ============================================================================
// BATCH IMPORTER
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct BatchImporter {
    batch_size: NonZeroUsize,
}

impl BatchImporter {
    pub fn new(batch_size: NonZeroUsize) -> Self {
        BatchImporter { batch_size }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.get()
    }

    /// Import every record, one committed chunk at a time.
    ///
    /// An `Err` item from `records` stops the import with
    /// [`IngestError::SourceUnreadable`]; the chunk it interrupted is not
    /// committed. After each commit the store's working set is reset and
    /// `sync` propagates before the next chunk begins.
    pub fn import_all<S, R, I, E>(
        &self,
        store: &mut S,
        sync: &mut ViewSync,
        reporter: &R,
        records: I,
    ) -> Result<ImportSummary, IngestError>
    where
        S: QuakeStore + ?Sized,
        R: IngestReporter + ?Sized,
        I: IntoIterator<Item = Result<RawRecord, E>>,
        E: Into<anyhow::Error>,
    {
        let mut records = records.into_iter();
        let mut summary = ImportSummary::default();
        let mut chunk: Vec<RawRecord> = Vec::with_capacity(self.batch_size());
        let mut batch = 0;

        loop {
            chunk.clear();
            for item in records.by_ref().take(self.batch_size()) {
                chunk.push(item.map_err(|e| IngestError::SourceUnreadable(e.into()))?);
            }
            if chunk.is_empty() {
                break;
            }

            let first_position = summary.records_seen;
            summary.records_seen += chunk.len();

            match self.import_chunk(store, reporter, &chunk, first_position, batch)? {
                ChunkOutcome::Committed { receipt, rejected } => {
                    summary.batches_committed += 1;
                    summary.inserted += receipt.inserted;
                    summary.replaced += receipt.replaced;
                    summary.rejected += rejected;

                    reporter.report(IngestEvent::BatchCommitted {
                        batch,
                        entities: receipt.entities(),
                        seq: receipt.seq,
                    });

                    if let Err(e) = store.reset() {
                        warn!(batch, error = %e, "Working set reset failed");
                    }

                    // A failed pull leaves last_seq untouched; the next propagation retries it
                    match sync.propagate(&*store) {
                        Ok(true) => reporter.report(IngestEvent::ViewPropagated {
                            total: sync.view().len(),
                        }),
                        Ok(false) => {}
                        Err(e) => warn!(batch, error = %e, "View propagation failed"),
                    }
                }
                ChunkOutcome::Empty { rejected } => {
                    summary.rejected += rejected;
                    reporter.report(IngestEvent::BatchSkipped { batch, rejected });
                }
            }

            batch += 1;
        }

        Ok(summary)
    }

    fn import_chunk<S, R>(
        &self,
        store: &mut S,
        reporter: &R,
        chunk: &[RawRecord],
        first_position: usize,
        batch: usize,
    ) -> Result<ChunkOutcome, IngestError>
    where
        S: QuakeStore + ?Sized,
        R: IngestReporter + ?Sized,
    {
        let mut scope = store.begin().map_err(IngestError::StoreUnavailable)?;
        let mut rejected = 0;

        for (offset, raw) in chunk.iter().enumerate() {
            match validate(raw, first_position + offset) {
                Ok(quake) => {
                    if let Err(source) = store.upsert(&mut scope, &quake) {
                        store.rollback(scope);
                        return Err(IngestError::BatchCommitFailed { batch, source });
                    }
                }
                Err(rejection) => {
                    rejected += 1;
                    reporter.report(IngestEvent::RecordRejected {
                        rejection: &rejection,
                    });
                }
            }
        }

        if !scope.has_changes() {
            store.rollback(scope);
            return Ok(ChunkOutcome::Empty { rejected });
        }

        debug!(batch, staged = scope.staged(), rejected, "Committing batch");
        let receipt = store
            .commit(scope)
            .map_err(|source| IngestError::BatchCommitFailed { batch, source })?;

        Ok(ChunkOutcome::Committed { receipt, rejected })
    }
}

impl Default for BatchImporter {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_BATCH_SIZE).unwrap_or(NonZeroUsize::MIN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::progress::{RejectionCollector, SilentReporter};
    use crate::view::LiveView;
    use std::convert::Infallible;

    fn records(count: usize) -> Vec<Result<RawRecord, Infallible>> {
        (0..count)
            .map(|i| {
                Ok(RawRecord::new(
                    &format!("ev{:04}", i),
                    1.0 + (i % 7) as f64,
                    "Somewhere",
                    1_600_000_000_000.0 + (i as f64) * 1_000.0,
                ))
            })
            .collect()
    }

    fn importer(size: usize) -> BatchImporter {
        BatchImporter::new(NonZeroUsize::new(size).unwrap())
    }

    #[test]
    fn test_empty_input_never_touches_store() {
        // An uninitialized store would fail `begin`; empty input must not call it
        let mut store = SqliteStore::from_connection(rusqlite::Connection::open_in_memory().unwrap());
        let mut sync = ViewSync::new(LiveView::default());

        let summary = importer(4)
            .import_all(&mut store, &mut sync, &SilentReporter, records(0))
            .unwrap();

        assert_eq!(summary, ImportSummary::default());
    }

    #[test]
    fn test_batch_boundaries() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut sync = ViewSync::new(LiveView::default());

        let summary = importer(4)
            .import_all(&mut store, &mut sync, &SilentReporter, records(10))
            .unwrap();

        // ceil(10 / 4) = 3 commits: 4 + 4 + 2
        assert_eq!(summary.batches_committed, 3);
        assert_eq!(summary.inserted, 10);
        assert_eq!(store.commit_count().unwrap(), 3);
        assert_eq!(sync.view().len(), 10);
    }

    #[test]
    fn test_exact_multiple_has_no_trailing_batch() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut sync = ViewSync::new(LiveView::default());

        let summary = importer(5)
            .import_all(&mut store, &mut sync, &SilentReporter, records(10))
            .unwrap();

        assert_eq!(summary.batches_committed, 2);
    }

    #[test]
    fn test_rejections_reported_with_input_positions() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut sync = ViewSync::new(LiveView::default());
        let collector = RejectionCollector::new();

        let mut input = records(6);
        input[1] = Ok(RawRecord::new("bad1", 1.0, "x", 1.0).without_magnitude());
        input[4] = Ok(RawRecord::default());

        let summary = importer(3)
            .import_all(&mut store, &mut sync, &collector, input)
            .unwrap();

        let positions: Vec<usize> = collector.rejections().iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![1, 4]);
        assert_eq!(summary.rejected, 2);
        assert_eq!(summary.inserted, 4);
        assert_eq!(store.count().unwrap(), 4);
    }

    #[test]
    fn test_all_rejected_chunk_commits_nothing() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut sync = ViewSync::new(LiveView::default());

        let input: Vec<Result<RawRecord, Infallible>> =
            vec![Ok(RawRecord::default()), Ok(RawRecord::default())];
        let summary = importer(2)
            .import_all(&mut store, &mut sync, &SilentReporter, input)
            .unwrap();

        assert_eq!(summary.batches_committed, 0);
        assert_eq!(summary.rejected, 2);
        assert_eq!(store.commit_count().unwrap(), 0);
    }

    #[test]
    fn test_source_error_keeps_prior_batches() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut sync = ViewSync::new(LiveView::default());

        let mut input: Vec<Result<RawRecord, anyhow::Error>> = records(5)
            .into_iter()
            .map(|r| r.map_err(anyhow::Error::from))
            .collect();
        input.push(Err(anyhow::anyhow!("truncated feed")));
        input.extend(records(3).into_iter().map(|r| r.map_err(anyhow::Error::from)));

        let err = importer(2)
            .import_all(&mut store, &mut sync, &SilentReporter, input)
            .unwrap_err();

        assert!(matches!(err, IngestError::SourceUnreadable(_)));
        assert!(err.to_string().contains("truncated feed"));
        // Batches [0,1] and [2,3] committed; [4, <error>] was interrupted
        assert_eq!(store.count().unwrap(), 4);
        assert_eq!(sync.view().len(), 4);
    }
}
