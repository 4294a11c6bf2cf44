//! Tiddler data model.
//!
//! A tiddler is stored as a raw [`TiddlerRecord`]: the metadata stays a JSON
//! string so that a corrupt blob only affects the reader that touches it.
//! [`Metadata`] is the typed view of that string: a few fields the system
//! interprets, plus every caller-supplied field carried through untouched.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, TiddlyError};

/// Ownership label injected into every written tiddler.
pub const BAG: &str = "bag";

/// Tag marking tiddlers whose body must ship with the listing.
pub const MACRO_TAG: &str = "$:/tags/Macro";

/// Name of the body field in request payloads and API responses.
pub const TEXT_FIELD: &str = "text";

/// Current or historical state of one tiddler, as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TiddlerRecord {
    /// Unique key.
    pub title: String,
    /// Number of writes and deletes applied to this title so far.
    pub revision: u64,
    /// Serialized [`Metadata`]; empty for a tombstone.
    pub meta: String,
    /// Body text; empty for a tombstone.
    pub text: String,
}

impl TiddlerRecord {
    /// Record representing the deletion of `title` at `revision`.
    pub fn tombstone(title: impl Into<String>, revision: u64) -> Self {
        Self {
            title: title.into(),
            revision,
            meta: String::new(),
            text: String::new(),
        }
    }

    /// A tombstone (or a never-written placeholder) has no metadata.
    pub fn is_tombstone(&self) -> bool {
        self.meta.is_empty()
    }

    /// Parse the stored metadata. `None` for tombstones.
    pub fn metadata(&self) -> Result<Option<Metadata>> {
        if self.is_tombstone() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&self.meta)?))
    }
}

/// Typed tiddler metadata.
///
/// Field order on output is `bag`, `revision`, `tags`, then the caller's
/// fields in the order they were received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Ownership label, always [`BAG`] for written tiddlers.
    pub bag: String,
    /// Revision this metadata was written at.
    pub revision: u64,
    /// Tags in the order the client sent them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Every other caller-supplied field, uninterpreted.
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl Metadata {
    /// Build metadata from a client payload, returning it with the body.
    ///
    /// `bag` and `revision` are overwritten; `text` is moved out; every other
    /// field passes through unchanged.
    pub fn from_fields(mut fields: IndexMap<String, Value>, revision: u64) -> Result<(Self, String)> {
        let text = match fields.shift_remove(TEXT_FIELD) {
            Some(Value::String(s)) => s,
            _ => String::new(),
        };
        fields.shift_remove("bag");
        fields.shift_remove("revision");

        let tags = fields
            .shift_remove("tags")
            .filter(|v| !v.is_null())
            .map(serde_json::from_value::<Vec<String>>)
            .transpose()
            .map_err(|e| TiddlyError::BadRequest(format!("tags must be a list of strings: {e}")))?;

        let meta = Metadata {
            bag: BAG.to_string(),
            revision,
            tags,
            extra: fields,
        };
        Ok((meta, text))
    }

    /// Whether this tiddler carries the macro tag.
    pub fn is_macro(&self) -> bool {
        self.tags
            .as_ref()
            .is_some_and(|tags| tags.iter().any(|t| t == MACRO_TAG))
    }

    /// Flatten into a JSON object.
    pub fn to_object(&self) -> Map<String, Value> {
        let mut object = Map::new();
        object.insert("bag".to_string(), Value::String(self.bag.clone()));
        object.insert("revision".to_string(), Value::from(self.revision));
        if let Some(tags) = &self.tags {
            object.insert("tags".to_string(), Value::from(tags.clone()));
        }
        for (key, value) in &self.extra {
            object.insert(key.clone(), value.clone());
        }
        object
    }

    /// Serialize for storage.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Current state of a tiddler as returned by a lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct Tiddler {
    /// Unique key.
    pub title: String,
    /// Current revision.
    pub revision: u64,
    /// `None` once the tiddler has been deleted.
    pub meta: Option<Metadata>,
    /// Body text; empty once deleted.
    pub text: String,
}

impl Tiddler {
    /// Whether this tiddler has been deleted.
    pub fn is_tombstone(&self) -> bool {
        self.meta.is_none()
    }

    /// Metadata with the body merged in under `text`, the shape the client
    /// shell expects from a single-tiddler fetch.
    pub fn to_json_object(&self) -> Map<String, Value> {
        let mut object = self
            .meta
            .as_ref()
            .map(Metadata::to_object)
            .unwrap_or_default();
        object.insert(TEXT_FIELD.to_string(), Value::String(self.text.clone()));
        object
    }
}

impl TryFrom<TiddlerRecord> for Tiddler {
    type Error = TiddlyError;

    fn try_from(record: TiddlerRecord) -> Result<Self> {
        let meta = record.metadata()?;
        Ok(Tiddler {
            title: record.title,
            revision: record.revision,
            meta,
            text: record.text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> IndexMap<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_from_fields_extracts_text_and_injects_bag() {
        let (meta, text) = Metadata::from_fields(
            fields(json!({"title": "A", "text": "body", "bag": "other", "revision": 99})),
            3,
        )
        .unwrap();

        assert_eq!(text, "body");
        assert_eq!(meta.bag, BAG);
        assert_eq!(meta.revision, 3);
        assert_eq!(meta.extra.get("title"), Some(&json!("A")));
        assert!(!meta.extra.contains_key("text"));
    }

    #[test]
    fn test_from_fields_keeps_unknown_fields() {
        let (meta, _) = Metadata::from_fields(
            fields(json!({"custom": {"nested": [1, 2]}, "created": "20240101"})),
            1,
        )
        .unwrap();
        assert_eq!(meta.extra.get("custom"), Some(&json!({"nested": [1, 2]})));
        assert_eq!(meta.extra.get("created"), Some(&json!("20240101")));
    }

    #[test]
    fn test_from_fields_rejects_bad_tags() {
        let result = Metadata::from_fields(fields(json!({"tags": "not a list"})), 1);
        assert!(matches!(result, Err(TiddlyError::BadRequest(_))));
    }

    #[test]
    fn test_non_string_text_is_dropped() {
        let (meta, text) = Metadata::from_fields(fields(json!({"text": 5})), 1).unwrap();
        assert_eq!(text, "");
        assert!(!meta.extra.contains_key("text"));
    }

    #[test]
    fn test_metadata_json_round_trip_preserves_extra() {
        let (meta, _) = Metadata::from_fields(
            fields(json!({"tags": ["x", "y"], "zeta": 1, "alpha": true})),
            2,
        )
        .unwrap();
        let stored = meta.to_json().unwrap();
        let parsed: Metadata = serde_json::from_str(&stored).unwrap();
        assert_eq!(parsed, meta);
        let keys: Vec<_> = parsed.extra.keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_is_macro() {
        let (meta, _) =
            Metadata::from_fields(fields(json!({"tags": ["x", MACRO_TAG]})), 1).unwrap();
        assert!(meta.is_macro());
        let (meta, _) = Metadata::from_fields(fields(json!({"tags": ["x"]})), 1).unwrap();
        assert!(!meta.is_macro());
    }

    #[test]
    fn test_tombstone_record() {
        let record = TiddlerRecord::tombstone("A", 4);
        assert!(record.is_tombstone());
        assert!(record.metadata().unwrap().is_none());

        let tiddler = Tiddler::try_from(record).unwrap();
        assert!(tiddler.is_tombstone());
        assert_eq!(tiddler.to_json_object().get("text"), Some(&json!("")));
    }
}
