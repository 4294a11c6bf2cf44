//! `.tid` file rendering for the git mirror.
//!
//! A `.tid` file is one `field: value` line per metadata field, sorted by
//! field name, a blank line, then the body verbatim. Sorting makes the
//! output a pure function of the content, so unchanged tiddlers produce
//! unchanged files and git sees no diff.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::tiddler::{Metadata, TEXT_FIELD};

/// File extension for mirrored tiddlers.
pub const TID_EXTENSION: &str = "tid";

/// Render a tiddler as `.tid` file content.
pub fn render_tid(meta: &Metadata, text: &str) -> String {
    let fields = sort_alphabetically(meta.to_object());

    let mut out = String::new();
    for (key, value) in &fields {
        if key == TEXT_FIELD {
            continue;
        }
        let rendered = if key == "tags" {
            match render_tags(value) {
                Some(tags) => tags,
                None => continue,
            }
        } else {
            render_value(value)
        };
        out.push_str(key);
        out.push_str(": ");
        out.push_str(&rendered);
        out.push('\n');
    }

    out.push('\n');
    out.push_str(text);
    out
}

/// Longest escaped title kept verbatim in a file name, in bytes. Longer
/// titles are cut and get a hash suffix, keeping names under `NAME_MAX`.
const MAX_STEM_BYTES: usize = 200;

/// Hex digits of the title hash appended to shortened names.
const HASH_SUFFIX_LEN: usize = 16;

/// File name for a tiddler title.
///
/// Distinct titles always get distinct names. `%` and the characters that
/// cannot appear in a file name on common filesystems are percent-escaped,
/// so `a/b`, `a:b` and `a_b` stay apart. A title whose escaped form is too
/// long is cut at a character boundary and suffixed with `~` and a prefix
/// of its SHA-256; a shortened name is always longer than any unshortened
/// one, so the two kinds never meet.
pub fn file_name(title: &str) -> String {
    let mut stem = String::with_capacity(title.len());
    for c in title.chars() {
        match c {
            '%' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => {
                escape_char(&mut stem, c)
            }
            c if c.is_control() => escape_char(&mut stem, c),
            c => stem.push(c),
        }
    }

    if stem.len() > MAX_STEM_BYTES {
        let mut cut = MAX_STEM_BYTES;
        while !stem.is_char_boundary(cut) {
            cut -= 1;
        }
        stem.truncate(cut);
        let digest = hex::encode(Sha256::digest(title.as_bytes()));
        stem.push('~');
        stem.push_str(&digest[..HASH_SUFFIX_LEN]);
    }

    format!("{stem}.{TID_EXTENSION}")
}

fn escape_char(out: &mut String, c: char) {
    let mut buf = [0; 4];
    for byte in c.encode_utf8(&mut buf).bytes() {
        out.push_str(&format!("%{byte:02X}"));
    }
}

fn sort_alphabetically(fields: Map<String, Value>) -> Vec<(String, Value)> {
    let mut pairs: Vec<_> = fields.into_iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    pairs
}

/// Tags joined by single spaces, or `None` when there are none.
fn render_tags(value: &Value) -> Option<String> {
    match value {
        Value::Array(tags) if tags.is_empty() => None,
        Value::Array(tags) => Some(
            tags.iter()
                .map(render_value)
                .collect::<Vec<_>>()
                .join(" "),
        ),
        Value::Null => None,
        other => Some(render_value(other)),
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
