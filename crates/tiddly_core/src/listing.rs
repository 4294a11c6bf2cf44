//! Listing projection: the "skinny" tiddler list the client shell loads at
//! startup.
//!
//! Bodies are left out, except for macro tiddlers: macros only take effect
//! once loaded, so their text ships with the list.
//!
//! Stored metadata that fails to parse is skipped with a warning instead of
//! failing the whole listing.

use log::warn;
use serde_json::{Map, Value};

use crate::tiddler::{TEXT_FIELD, TiddlerRecord};

/// Lazy iterator over listing entries, in store order.
#[derive(Debug)]
pub struct Listing {
    records: std::vec::IntoIter<TiddlerRecord>,
}

impl Listing {
    /// Project a scanned snapshot.
    pub fn new(records: Vec<TiddlerRecord>) -> Self {
        Self {
            records: records.into_iter(),
        }
    }
}

impl Iterator for Listing {
    type Item = Map<String, Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.by_ref().find_map(|record| project(&record))
    }
}

/// Listing entry for one record, or `None` if it is a tombstone or corrupt.
pub fn project(record: &TiddlerRecord) -> Option<Map<String, Value>> {
    let meta = match record.metadata() {
        Ok(Some(meta)) => meta,
        Ok(None) => return None,
        Err(e) => {
            warn!("Skipping '{}' in listing: {}", record.title, e);
            return None;
        }
    };

    let mut entry = meta.to_object();
    if meta.is_macro() {
        entry.insert(TEXT_FIELD.to_string(), Value::String(record.text.clone()));
    }
    Some(entry)
}
