//! Storage abstraction for tiddler persistence.
//!
//! This module defines the [`TiddlerStore`] trait which abstracts over the
//! storage backends (SQLite, in-memory) holding current tiddlers and their
//! history.
//!
//! # Storage Model
//!
//! The store maintains two kinds of data:
//! 1. **Current records**: one row per title, the latest revision
//! 2. **History log**: one immutable row per (title, revision)
//!
//! Both are written by [`TiddlerStore::apply`] as a single unit: the read of
//! the current revision and the write of the next one happen inside one
//! transaction, so concurrent writers to a title cannot lose updates.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::{Result, TiddlyError};
use crate::tiddler::TiddlerRecord;

/// Builds the next record from the current one inside [`TiddlerStore::apply`].
pub type NextRevision<'a> = dyn FnMut(Option<&TiddlerRecord>) -> Result<TiddlerRecord> + 'a;

/// Check that `record` is the direct successor of `current`.
fn check_successor(title: &str, current: Option<&TiddlerRecord>, record: &TiddlerRecord) -> Result<()> {
    let actual = current.map_or(0, |r| r.revision);
    let expected = record.revision.saturating_sub(1);
    if record.title != title || actual != expected {
        return Err(TiddlyError::RevisionConflict {
            title: record.title.clone(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Trait for tiddler storage backends.
pub trait TiddlerStore: Send + Sync {
    /// Load the current record for a title.
    ///
    /// Returns `None` if the title has never been written.
    fn get(&self, title: &str) -> Result<Option<TiddlerRecord>>;

    /// Load every current record, tombstones included, in storage order.
    fn scan(&self) -> Result<Vec<TiddlerRecord>>;

    /// Atomically read the current record for `title`, build the next one
    /// with `next`, and store it as both the current record and a history
    /// entry. Returns the revision written.
    ///
    /// `next` receives `None` for a title that was never written. Whatever
    /// it returns must carry `title` and exactly the current revision plus
    /// one; if `next` fails, nothing is written.
    ///
    /// # Errors
    ///
    /// [`TiddlyError::RevisionConflict`] if the built record does not
    /// follow the stored revision, or any error `next` returns.
    fn apply(&self, title: &str, next: &mut NextRevision<'_>) -> Result<u64>;

    /// Store `record` if, and only if, it is the direct successor of the
    /// stored revision (absent counts as revision 0).
    fn commit_revision(&self, record: &TiddlerRecord) -> Result<()> {
        let mut next = |_: Option<&TiddlerRecord>| -> Result<TiddlerRecord> { Ok(record.clone()) };
        self.apply(&record.title, &mut next)?;
        Ok(())
    }

    /// Every history entry for a title, oldest first.
    ///
    /// Only recovery tooling reads this; the live system never does.
    fn history(&self, title: &str) -> Result<Vec<TiddlerRecord>>;
}
