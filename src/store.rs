//! Persistent store abstraction.
//!
//! The importer and the view bridge only talk to a [`QuakeStore`]. The SQLite
//! implementation lives in [`crate::db`]; tests wrap it to inject failures.

use crate::error::StoreError;
use crate::quake::Quake;

/// Outcome of a single upsert under the trump policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// No row with this code existed
    Inserted,
    /// An existing row (committed or staged) was overwritten in full
    Replaced,
}

/// Handle for one open write transaction.
///
/// Obtained from [`QuakeStore::begin`] and consumed by `commit` or `rollback`.
#[derive(Debug)]
pub struct WriteScope {
    seq: u64,
    inserted: usize,
    replaced: usize,
}

impl WriteScope {
    pub(crate) fn new(seq: u64) -> Self {
        WriteScope {
            seq,
            inserted: 0,
            replaced: 0,
        }
    }

    /// Commit sequence number this scope will publish under
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Number of upserts staged so far
    pub fn staged(&self) -> usize {
        self.inserted + self.replaced
    }

    pub fn has_changes(&self) -> bool {
        self.staged() > 0
    }

    pub(crate) fn record(&mut self, outcome: Upsert) {
        match outcome {
            Upsert::Inserted => self.inserted += 1,
            Upsert::Replaced => self.replaced += 1,
        }
    }

    pub(crate) fn into_receipt(self) -> CommitReceipt {
        CommitReceipt {
            seq: self.seq,
            inserted: self.inserted,
            replaced: self.replaced,
        }
    }
}

/// What a successful commit applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReceipt {
    pub seq: u64,
    pub inserted: usize,
    pub replaced: usize,
}

impl CommitReceipt {
    pub fn entities(&self) -> usize {
        self.inserted + self.replaced
    }
}

/// Committed entities written after some commit sequence number
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    /// Highest commit sequence included (0 when empty)
    pub through_seq: u64,
    pub quakes: Vec<Quake>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.quakes.is_empty()
    }
}

/// Durable keyed storage for quakes with a uniqueness constraint on `code`.
///
/// At most one [`WriteScope`] is open at a time. Writes staged in a scope are
/// invisible to [`changes_since`](QuakeStore::changes_since) until committed.
pub trait QuakeStore: Send {
    /// Open a write transaction
    fn begin(&mut self) -> Result<WriteScope, StoreError>;

    /// Stage `quake`: overwrite the row with the same code, or insert a new one
    fn upsert(&mut self, scope: &mut WriteScope, quake: &Quake) -> Result<Upsert, StoreError>;

    /// Durably apply every staged upsert
    fn commit(&mut self, scope: WriteScope) -> Result<CommitReceipt, StoreError>;

    /// Discard every staged upsert
    fn rollback(&mut self, scope: WriteScope);

    /// Release cached working-set memory; committed data is unaffected
    fn reset(&mut self) -> Result<(), StoreError>;

    /// Committed quakes last written by a commit with sequence > `seq`
    fn changes_since(&self, seq: u64) -> Result<ChangeSet, StoreError>;
}
