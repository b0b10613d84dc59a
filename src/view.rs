//! Live view and the bridge that keeps it in sync with the store.
//!
//! The writer publishes through [`ViewSync::propagate`], which pulls committed
//! changes from a [`QuakeStore`] and swaps a new sorted [`Snapshot`] into the
//! [`LiveView`]. Readers hold a cloned `Arc<Snapshot>` and never observe a
//! partially applied batch.

use crate::error::StoreError;
use crate::quake::Quake;
use crate::store::QuakeStore;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Callback fired once per propagation that changed the view
pub type ChangeCallback = Box<dyn Fn() + Send + Sync>;

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Immutable view contents as of one propagation
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    quakes: Vec<Quake>,
    /// code → position in `quakes`
    index: HashMap<String, usize>,
    generation: u64,
}

impl Snapshot {
    /// Quakes sorted newest first
    pub fn quakes(&self) -> &[Quake] {
        &self.quakes
    }

    /// Number of propagations that produced this snapshot
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.quakes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quakes.is_empty()
    }

    pub fn get(&self, code: &str) -> Option<&Quake> {
        self.index.get(code).map(|&i| &self.quakes[i])
    }

    /// New snapshot with `changes` merged in: same code replaces, new code is added
    ///
    /// Untouched entries keep their relative order, so only the changes are
    /// sorted before a single merge pass.
    fn merged(&self, changes: Vec<Quake>) -> Snapshot {
        // Later changes for the same code win
        let mut latest: HashMap<String, Quake> = HashMap::with_capacity(changes.len());
        for quake in changes {
            latest.insert(quake.code.clone(), quake);
        }
        let mut incoming: Vec<Quake> = latest.into_values().collect();
        incoming.sort_by(Quake::view_order);

        let changed: HashSet<&str> = incoming.iter().map(|q| q.code.as_str()).collect();
        let mut quakes = Vec::with_capacity(self.quakes.len() + incoming.len());

        let mut retained = self
            .quakes
            .iter()
            .filter(|q| !changed.contains(q.code.as_str()))
            .peekable();
        let mut incoming = incoming.iter().peekable();

        loop {
            let next = match (retained.peek(), incoming.peek()) {
                (Some(old), Some(new)) => {
                    if Quake::view_order(new, old).is_lt() {
                        incoming.next()
                    } else {
                        retained.next()
                    }
                }
                (Some(_), None) => retained.next(),
                (None, Some(_)) => incoming.next(),
                (None, None) => None,
            };
            match next {
                Some(quake) => quakes.push(quake.clone()),
                None => break,
            }
        }

        let index = quakes
            .iter()
            .enumerate()
            .map(|(i, q)| (q.code.clone(), i))
            .collect();

        Snapshot {
            quakes,
            index,
            generation: self.generation + 1,
        }
    }
}

// ============================================================================
// LIVE VIEW (reader side)
// ============================================================================

/// Read-only handle on the committed quakes; cheap to clone across threads
#[derive(Debug, Clone, Default)]
pub struct LiveView {
    current: Arc<RwLock<Arc<Snapshot>>>,
}

impl LiveView {
    /// Current snapshot; stays valid while later propagations swap in new ones
    pub fn snapshot(&self) -> Arc<Snapshot> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    fn publish(&self, snapshot: Snapshot) {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(snapshot);
    }
}

// ============================================================================
// VIEW SYNC BRIDGE (writer side)
// ============================================================================

pub struct ViewSync {
    view: LiveView,
    last_seq: u64,
    on_change: Option<ChangeCallback>,
}

impl ViewSync {
    pub fn new(view: LiveView) -> Self {
        ViewSync {
            view,
            last_seq: 0,
            on_change: None,
        }
    }

    pub fn view(&self) -> &LiveView {
        &self.view
    }

    /// Highest commit sequence merged into the view
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Register the "view changed" callback, replacing any previous one
    pub fn on_change(&mut self, callback: ChangeCallback) {
        self.on_change = Some(callback);
    }

    /// Merge commits newer than the last propagation into the view.
    ///
    /// Returns `true` when the view changed (and the callback fired). With no
    /// new commits this is a no-op returning `false`.
    pub fn propagate<S: QuakeStore + ?Sized>(&mut self, store: &S) -> Result<bool, StoreError> {
        let changes = store.changes_since(self.last_seq)?;
        if changes.is_empty() {
            return Ok(false);
        }

        let changed = changes.quakes.len();
        let next = self.view.snapshot().merged(changes.quakes);
        let total = next.len();
        self.view.publish(next);
        self.last_seq = changes.through_seq;

        debug!(changed, total, seq = self.last_seq, "View propagated");

        if let Some(callback) = &self.on_change {
            callback();
        }
        Ok(true)
    }
}
