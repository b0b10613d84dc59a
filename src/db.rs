// 🗄️ SQLite store - quakes keyed by code, WAL journal, commit sequence log

use crate::error::StoreError;
use crate::quake::Quake;
use crate::store::{ChangeSet, CommitReceipt, QuakeStore, Upsert, WriteScope};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::{debug, warn};

const QUAKE_COLUMNS: &str = "code, magnitude, place, time, commit_seq";

pub fn setup_database(conn: &Connection) -> Result<(), StoreError> {
    // Enable WAL mode so readers never block on the writer
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    debug!(journal_mode = %mode, "Journal mode configured");

    // ==========================================================================
    // Quakes Table (unique on code, one row per event)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS quakes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT UNIQUE NOT NULL,
            magnitude REAL NOT NULL,
            place TEXT NOT NULL,
            time REAL NOT NULL,
            commit_seq INTEGER NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Commits Table (one row per committed batch, seq is monotonic)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS commits (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            committed_at TEXT,
            entity_count INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_quakes_time ON quakes(time DESC)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_quakes_commit_seq ON quakes(commit_seq)",
        [],
    )?;

    Ok(())
}

fn quake_from_row(row: &Row<'_>) -> rusqlite::Result<(Quake, u64)> {
    let magnitude: f64 = row.get(1)?;
    let seconds: f64 = row.get(3)?;
    let time = Quake::time_from_epoch_seconds(seconds)
        .ok_or_else(|| rusqlite::Error::InvalidColumnType(3, "time".to_string(), Type::Real))?;
    let seq: i64 = row.get(4)?;

    Ok((
        Quake {
            code: row.get(0)?,
            magnitude: magnitude as f32,
            place: row.get(2)?,
            time,
        },
        seq as u64,
    ))
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// SqliteStore - the durable [`QuakeStore`]
///
/// Write scopes map onto `BEGIN IMMEDIATE` / `COMMIT` on the owned
/// connection. Each scope reserves a row in `commits`; its `seq` tags every
/// row the scope writes so the view bridge can pull changes in commit order.
pub struct SqliteStore {
    conn: Connection,
    open_seq: Option<u64>,
}

impl SqliteStore {
    /// Open (or create) a database file and set up the schema
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        setup_database(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap a connection as-is; `begin` fails until the schema exists
    pub fn from_connection(conn: Connection) -> Self {
        SqliteStore {
            conn,
            open_seq: None,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM quakes", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Number of batches that reached COMMIT
    pub fn commit_count(&self) -> Result<i64, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM commits WHERE committed_at IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn get(&self, code: &str) -> Result<Option<Quake>, StoreError> {
        let sql = format!("SELECT {} FROM quakes WHERE code = ?1", QUAKE_COLUMNS);
        let found = self
            .conn
            .query_row(&sql, params![code], quake_from_row)
            .optional()?;
        Ok(found.map(|(quake, _)| quake))
    }

    /// Committed quakes, newest first
    pub fn all_by_time_desc(&self, limit: Option<usize>) -> Result<Vec<Quake>, StoreError> {
        let sql = format!(
            "SELECT {} FROM quakes ORDER BY time DESC, code ASC LIMIT ?1",
            QUAKE_COLUMNS
        );
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        let mut stmt = self.conn.prepare(&sql)?;
        let quakes = stmt
            .query_map(params![limit], quake_from_row)?
            .map(|row| row.map(|(quake, _)| quake))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(quakes)
    }

    fn ensure_initialized(&self) -> Result<(), StoreError> {
        for table in ["quakes", "commits"] {
            let found: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get(0),
            )?;
            if found == 0 {
                return Err(StoreError::NotInitialized(table));
            }
        }
        Ok(())
    }

    fn check_scope(&self, scope: &WriteScope) -> Result<(), StoreError> {
        match self.open_seq {
            Some(seq) if seq == scope.seq() => Ok(()),
            _ => Err(StoreError::UnknownScope(scope.seq())),
        }
    }

    /// Roll back whatever transaction is still open on the connection
    fn abort(&mut self) {
        self.open_seq = None;
        if self.conn.is_autocommit() {
            return;
        }
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            warn!(error = %e, "Rollback failed");
        }
    }
}

impl QuakeStore for SqliteStore {
    fn begin(&mut self) -> Result<WriteScope, StoreError> {
        if self.open_seq.is_some() {
            return Err(StoreError::ScopeAlreadyOpen);
        }
        self.ensure_initialized()?;

        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        let reserved = self.conn.execute(
            "INSERT INTO commits (started_at) VALUES (?1)",
            params![Utc::now().to_rfc3339()],
        );
        if let Err(e) = reserved {
            self.abort();
            return Err(e.into());
        }

        let seq = self.conn.last_insert_rowid() as u64;
        self.open_seq = Some(seq);
        debug!(seq, "Write scope opened");

        Ok(WriteScope::new(seq))
    }

    fn upsert(&mut self, scope: &mut WriteScope, quake: &Quake) -> Result<Upsert, StoreError> {
        self.check_scope(scope)?;
        let seq = scope.seq() as i64;

        // Conflict policy: same code → the incoming record replaces every field
        let existing: Option<i64> = {
            let mut stmt = self.conn.prepare_cached("SELECT id FROM quakes WHERE code = ?1")?;
            stmt.query_row(params![quake.code], |row| row.get(0))
                .optional()?
        };

        let outcome = match existing {
            Some(id) => {
                let mut stmt = self.conn.prepare_cached(
                    "UPDATE quakes
                     SET magnitude = ?1, place = ?2, time = ?3, commit_seq = ?4
                     WHERE id = ?5",
                )?;
                stmt.execute(params![
                    quake.magnitude as f64,
                    quake.place,
                    quake.epoch_seconds(),
                    seq,
                    id,
                ])?;
                Upsert::Replaced
            }
            None => {
                let mut stmt = self.conn.prepare_cached(
                    "INSERT INTO quakes (code, magnitude, place, time, commit_seq)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                stmt.execute(params![
                    quake.code,
                    quake.magnitude as f64,
                    quake.place,
                    quake.epoch_seconds(),
                    seq,
                ])?;
                Upsert::Inserted
            }
        };

        scope.record(outcome);
        Ok(outcome)
    }

    fn commit(&mut self, scope: WriteScope) -> Result<CommitReceipt, StoreError> {
        self.check_scope(&scope)?;
        let receipt = scope.into_receipt();

        let result = self
            .conn
            .execute(
                "UPDATE commits SET committed_at = ?1, entity_count = ?2 WHERE seq = ?3",
                params![
                    Utc::now().to_rfc3339(),
                    receipt.entities() as i64,
                    receipt.seq as i64
                ],
            )
            .and_then(|_| self.conn.execute_batch("COMMIT"));

        if let Err(e) = result {
            self.abort();
            return Err(e.into());
        }

        self.open_seq = None;
        debug!(
            seq = receipt.seq,
            inserted = receipt.inserted,
            replaced = receipt.replaced,
            "Write scope committed"
        );
        Ok(receipt)
    }

    fn rollback(&mut self, scope: WriteScope) {
        if self.check_scope(&scope).is_err() {
            warn!(seq = scope.seq(), "Rollback requested for unknown write scope");
            return;
        }
        self.abort();
        debug!(seq = scope.seq(), "Write scope rolled back");
    }

    fn reset(&mut self) -> Result<(), StoreError> {
        self.conn.flush_prepared_statement_cache();
        self.conn.execute_batch("PRAGMA shrink_memory")?;
        Ok(())
    }

    fn changes_since(&self, seq: u64) -> Result<ChangeSet, StoreError> {
        // Staged rows share the connection; refuse to read them
        if self.open_seq.is_some() {
            return Err(StoreError::ScopeAlreadyOpen);
        }

        let sql = format!(
            "SELECT {} FROM quakes WHERE commit_seq > ?1 ORDER BY commit_seq, code",
            QUAKE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![seq as i64], quake_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut changes = ChangeSet::default();
        for (quake, row_seq) in rows {
            changes.through_seq = changes.through_seq.max(row_seq);
            changes.quakes.push(quake);
        }

        Ok(changes)
    }
}
