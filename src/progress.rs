//! Progress reporting for ingest runs.
//!
//! The importer emits [`IngestEvent`]s through an [`IngestReporter`]. This is
//! also the per-record rejection stream: rejected records never fail an
//! ingest, they only show up here.

use crate::engine::IngestSummary;
use crate::validator::Rejection;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// Events emitted while an ingest run is in progress
#[derive(Debug, Clone)]
pub enum IngestEvent<'a> {
    /// Run starting
    Started { run_id: Uuid },

    /// A record failed validation and was skipped
    RecordRejected { rejection: &'a Rejection },

    /// A batch was committed to the store
    BatchCommitted {
        /// Zero-based batch index
        batch: usize,
        /// Entities written by the batch
        entities: usize,
        /// Commit sequence number
        seq: u64,
    },

    /// A batch had no valid records, so nothing was committed
    BatchSkipped { batch: usize, rejected: usize },

    /// The live view picked up committed changes
    ViewPropagated { total: usize },

    /// Run finished without a terminal error
    Finished { summary: &'a IngestSummary },

    /// Run stopped on a terminal error
    Failed { error: &'a str },
}

/// Receives [`IngestEvent`]s.
///
/// The default implementation ignores everything.
pub trait IngestReporter: Send + Sync {
    fn report(&self, event: IngestEvent<'_>) {
        let _ = event;
    }
}

/// Drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl IngestReporter for SilentReporter {}

/// Logs events using the `tracing` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl IngestReporter for TracingReporter {
    fn report(&self, event: IngestEvent<'_>) {
        use tracing::{debug, error, info, warn};

        match event {
            IngestEvent::Started { run_id } => {
                info!(%run_id, "Ingest started");
            }
            IngestEvent::RecordRejected { rejection } => {
                warn!(
                    position = rejection.position,
                    code = rejection.code.as_deref().unwrap_or(""),
                    reason = %rejection.reason,
                    "Record rejected"
                );
            }
            IngestEvent::BatchCommitted {
                batch,
                entities,
                seq,
            } => {
                info!(batch, entities, seq, "Batch committed");
            }
            IngestEvent::BatchSkipped { batch, rejected } => {
                info!(batch, rejected, "Batch had no valid records");
            }
            IngestEvent::ViewPropagated { total } => {
                debug!(total, "Live view updated");
            }
            IngestEvent::Finished { summary } => {
                info!(
                    run_id = %summary.run_id,
                    records = summary.records_seen,
                    batches = summary.batches_committed,
                    inserted = summary.inserted,
                    replaced = summary.replaced,
                    rejected = summary.rejected,
                    "Ingest finished"
                );
            }
            IngestEvent::Failed { error } => {
                error!(error, "Ingest failed");
            }
        }
    }
}

/// Keeps every rejection it sees; handy for callers that want the full list
#[derive(Debug, Default)]
pub struct RejectionCollector {
    rejections: Mutex<Vec<Rejection>>,
}

impl RejectionCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejections(&self) -> Vec<Rejection> {
        self.rejections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl IngestReporter for RejectionCollector {
    fn report(&self, event: IngestEvent<'_>) {
        if let IngestEvent::RecordRejected { rejection } = event {
            self.rejections
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(rejection.clone());
        }
    }
}
