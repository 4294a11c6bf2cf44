#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Error (common error types)
pub mod error;

/// Tiddler data model
pub mod tiddler;

/// Storage backends for current tiddlers and their history
pub mod store;

/// Payload fingerprints and Etags
pub mod fingerprint;

/// Revision protocol (get, put, delete)
pub mod wiki;

/// Listing projection for the client shell
pub mod listing;

/// `.tid` rendering
pub mod render;

/// Git mirror of the store
pub mod mirror;

pub use error::{Result, TiddlyError};
pub use mirror::{Credentials, MirrorEngine, MirrorReport, MirrorSettings};
pub use store::{MemoryStore, SqliteStore, TiddlerStore};
pub use tiddler::{Metadata, Tiddler, TiddlerRecord};
pub use wiki::{Expect, PutOutcome, Wiki};
