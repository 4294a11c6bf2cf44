//! SQLite-backed tiddler store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use super::{NextRevision, TiddlerStore, check_successor};
use crate::error::Result;
use crate::tiddler::TiddlerRecord;

/// How long a writer waits for another process holding the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
-- Current state, one row per title
CREATE TABLE IF NOT EXISTS tiddlers (
    title TEXT PRIMARY KEY,
    revision INTEGER NOT NULL,
    meta TEXT NOT NULL,
    text TEXT NOT NULL
);

-- Immutable snapshots, one row per revision
CREATE TABLE IF NOT EXISTS tiddler_history (
    title TEXT NOT NULL,
    revision INTEGER NOT NULL,
    meta TEXT NOT NULL,
    text TEXT NOT NULL,
    recorded_at INTEGER NOT NULL,
    PRIMARY KEY (title, revision)
);
"#;

/// SQLite-backed tiddler store.
///
/// The connection is wrapped in a `Mutex`; the API server and the mirror job
/// may open the same file from separate processes, so writes take an
/// IMMEDIATE transaction and wait out a busy database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        Self::with_connection(conn)
    }

    /// Create an in-memory database for testing.
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TiddlerRecord> {
    Ok(TiddlerRecord {
        title: row.get(0)?,
        revision: row.get::<_, i64>(1)?.max(0) as u64,
        meta: row.get(2)?,
        text: row.get(3)?,
    })
}

impl TiddlerStore for SqliteStore {
    fn get(&self, title: &str) -> Result<Option<TiddlerRecord>> {
        let conn = self.lock();
        let record = conn
            .query_row(
                "SELECT title, revision, meta, text FROM tiddlers WHERE title = ?",
                [title],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn scan(&self) -> Result<Vec<TiddlerRecord>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT title, revision, meta, text FROM tiddlers ORDER BY rowid")?;
        let records = stmt
            .query_map([], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn apply(&self, title: &str, next: &mut NextRevision<'_>) -> Result<u64> {
        let mut conn = self.lock();
        // IMMEDIATE takes the write lock before the read, so no other
        // connection can slip a revision in between.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = tx
            .query_row(
                "SELECT title, revision, meta, text FROM tiddlers WHERE title = ?",
                [title],
                row_to_record,
            )
            .optional()?;
        let record = next(current.as_ref())?;
        check_successor(title, current.as_ref(), &record)?;

        let revision = record.revision as i64;

        // Upsert keeps the rowid stable, which keeps scan order stable.
        tx.execute(
            "INSERT INTO tiddlers (title, revision, meta, text) VALUES (?, ?, ?, ?)
             ON CONFLICT(title) DO UPDATE SET
                revision = excluded.revision,
                meta = excluded.meta,
                text = excluded.text",
            params![record.title, revision, record.meta, record.text],
        )?;

        tx.execute(
            "INSERT INTO tiddler_history (title, revision, meta, text, recorded_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                record.title,
                revision,
                record.meta,
                record.text,
                chrono::Utc::now().timestamp_millis()
            ],
        )?;

        tx.commit()?;
        Ok(record.revision)
    }

    fn history(&self, title: &str) -> Result<Vec<TiddlerRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT title, revision, meta, text FROM tiddler_history
             WHERE title = ? ORDER BY revision ASC",
        )?;
        let records = stmt
            .query_map([title], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}
