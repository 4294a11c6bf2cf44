//! In-memory store for tests and development.

use std::sync::{PoisonError, RwLock};

use indexmap::IndexMap;

use super::{NextRevision, TiddlerStore, check_successor};
use crate::error::Result;
use crate::tiddler::TiddlerRecord;

/// In-memory tiddler store.
///
/// Current records keep first-insertion order, like the SQLite rowid order.
/// Data is lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    current: IndexMap<String, TiddlerRecord>,
    history: Vec<TiddlerRecord>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TiddlerStore for MemoryStore {
    fn get(&self, title: &str) -> Result<Option<TiddlerRecord>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.current.get(title).cloned())
    }

    fn scan(&self) -> Result<Vec<TiddlerRecord>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.current.values().cloned().collect())
    }

    fn apply(&self, title: &str, next: &mut NextRevision<'_>) -> Result<u64> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        let current = inner.current.get(title);
        let record = next(current)?;
        check_successor(title, current, &record)?;

        let revision = record.revision;
        inner.history.push(record.clone());
        inner.current.insert(record.title.clone(), record);
        Ok(revision)
    }

    fn history(&self, title: &str) -> Result<Vec<TiddlerRecord>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner
            .history
            .iter()
            .filter(|r| r.title == title)
            .cloned()
            .collect())
    }
}
