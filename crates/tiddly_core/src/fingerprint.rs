//! Write fingerprints and the Etag format built from them.
//!
//! An Etag looks like `"bag/<url-escaped-title>/<revision>:<hex hash>"`. The
//! hash covers the raw request payload, not the stored form; it only serves
//! as a cache validator.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::error::{Result, TiddlyError};
use crate::tiddler::BAG;

/// Content hash of a raw write payload, as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hash a payload.
    pub fn of(payload: &[u8]) -> Self {
        Fingerprint(hex::encode(Sha256::digest(payload)))
    }

    /// Hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Format the Etag returned for a successful write.
pub fn etag(title: &str, revision: u64, fingerprint: &Fingerprint) -> String {
    format!(
        "\"{}/{}/{}:{}\"",
        BAG,
        urlencoding::encode(title),
        revision,
        fingerprint
    )
}

/// Parse an Etag previously issued by [`etag`].
///
/// Returns the title and revision it names. Weak validators (`W/"..."`) are
/// accepted since the revision is all that matters.
pub fn parse_etag(value: &str) -> Result<(String, u64)> {
    let bad = || TiddlyError::BadRequest(format!("malformed Etag: {value}"));

    let inner = value.trim();
    let inner = inner.strip_prefix("W/").unwrap_or(inner);
    let inner = inner
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(bad)?;

    let rest = inner
        .strip_prefix(BAG)
        .and_then(|s| s.strip_prefix('/'))
        .ok_or_else(bad)?;
    let (escaped_title, tail) = rest.rsplit_once('/').ok_or_else(bad)?;
    let (revision, _hash) = tail.split_once(':').ok_or_else(bad)?;

    let title = urlencoding::decode(escaped_title).map_err(|_| bad())?;
    let revision = revision.parse().map_err(|_| bad())?;
    Ok((title.into_owned(), revision))
}
