//! The revision protocol: reads, writes and tombstones on top of a
//! [`TiddlerStore`].
//!
//! Every write is a read-modify-write run through [`TiddlerStore::apply`]:
//! the store reads the current revision, this module builds the next record,
//! and the store writes it as the current record and a history entry in the
//! same transaction. A write therefore always builds on the revision
//! immediately preceding it, even with concurrent writers.

use std::sync::Arc;

use indexmap::IndexMap;
use log::info;
use serde_json::Value;

use crate::error::{Result, TiddlyError};
use crate::fingerprint::{Fingerprint, etag};
use crate::listing::Listing;
use crate::store::TiddlerStore;
use crate::tiddler::{Metadata, Tiddler, TiddlerRecord};

/// Result of a successful [`Wiki::put`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutcome {
    /// Revision assigned to the write.
    pub revision: u64,
    /// Hash of the raw payload.
    pub fingerprint: Fingerprint,
    /// Etag header value for this write.
    pub etag: String,
}

/// Precondition for a write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Expect {
    /// Overwrite whatever is there.
    #[default]
    Any,
    /// Only write if the current revision is exactly this (0 = never written).
    Revision(u64),
}

/// Tiddler service over a shared store.
#[derive(Clone)]
pub struct Wiki {
    store: Arc<dyn TiddlerStore>,
}

impl Wiki {
    /// Create a service over the given store.
    pub fn new(store: Arc<dyn TiddlerStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn TiddlerStore> {
        &self.store
    }

    /// Look up the current state of a tiddler.
    ///
    /// Tombstoned tiddlers are returned (with empty metadata and text); only a
    /// title that was never written is `NotFound`.
    pub fn get(&self, title: &str) -> Result<Tiddler> {
        let record = self
            .store
            .get(title)?
            .ok_or_else(|| TiddlyError::NotFound(title.to_string()))?;
        Tiddler::try_from(record)
    }

    /// Write a tiddler from a raw JSON object payload.
    pub fn put(&self, title: &str, payload: &[u8], expect: Expect) -> Result<PutOutcome> {
        let fields: IndexMap<String, Value> = serde_json::from_slice(payload)
            .map_err(|e| TiddlyError::BadRequest(format!("payload must be a JSON object: {e}")))?;
        let fingerprint = Fingerprint::of(payload);

        let revision = self.advance(title, expect, |current| {
            let revision = current.map_or(0, |r| r.revision) + 1;
            let (meta, text) = Metadata::from_fields(fields.clone(), revision)?;
            Ok(Some(TiddlerRecord {
                title: title.to_string(),
                revision,
                meta: meta.to_json()?,
                text,
            }))
        })?;

        info!("Stored '{}' at revision {}", title, revision);
        Ok(PutOutcome {
            revision,
            etag: etag(title, revision, &fingerprint),
            fingerprint,
        })
    }

    /// Tombstone a tiddler, returning the revision of the tombstone.
    pub fn delete(&self, title: &str) -> Result<u64> {
        let revision = self.advance(title, Expect::Any, |current| {
            Ok(current.map(|r| TiddlerRecord::tombstone(title, r.revision + 1)))
        })?;

        info!("Deleted '{}' at revision {}", title, revision);
        Ok(revision)
    }

    /// All live tiddlers as the client listing.
    pub fn list(&self) -> Result<Listing> {
        Ok(Listing::new(self.store.scan()?))
    }

    /// Run one read-modify-write, checking `expect` against the revision
    /// read inside the store's transaction.
    ///
    /// `next` sees the current record and returns the record to commit, or
    /// `None` if the title does not exist and the operation needs it to.
    fn advance<F>(&self, title: &str, expect: Expect, mut next: F) -> Result<u64>
    where
        F: FnMut(Option<&TiddlerRecord>) -> Result<Option<TiddlerRecord>>,
    {
        let mut build = |current: Option<&TiddlerRecord>| -> Result<TiddlerRecord> {
            let actual = current.map_or(0, |r| r.revision);
            if let Expect::Revision(expected) = expect
                && expected != actual
            {
                return Err(TiddlyError::PreconditionFailed {
                    title: title.to_string(),
                    expected,
                    actual,
                });
            }
            next(current)?.ok_or_else(|| TiddlyError::NotFound(title.to_string()))
        };
        self.store.apply(title, &mut build)
    }
}

impl std::fmt::Debug for Wiki {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wiki").finish_non_exhaustive()
    }
}
