//! JSON codec for the index file.
//!
//! Decoding runs in stages, each with its own [`FormatError`]: UTF-8, JSON
//! syntax, then shape (`subdirs` must be present and an array). Elements of
//! `subdirs` without a string `id` are dropped, not rejected.

use serde_json::Value;

use crate::error::{FormatError, FormatResult};
use crate::file::{IndexFile, IndexSnapshot};
use crate::subdir::Subdir;

const SUBDIRS_FIELD: &str = "subdirs";
const COMMENT_FIELD: &str = "comment";

/// Serialize an index file to bytes.
///
/// Pretty output ends with a newline so the file reads well in an editor.
pub fn encode(file: &IndexFile, pretty: bool) -> FormatResult<Vec<u8>> {
    let mut bytes = if pretty {
        serde_json::to_vec_pretty(file)
    } else {
        serde_json::to_vec(file)
    }
    .map_err(|e| FormatError::Serialization(e.to_string()))?;
    if pretty {
        bytes.push(b'\n');
    }
    Ok(bytes)
}

/// Decode file bytes into a snapshot.
pub fn decode(bytes: &[u8]) -> FormatResult<IndexSnapshot> {
    let text = std::str::from_utf8(bytes)?;
    let value: Value =
        serde_json::from_str(text).map_err(|e| FormatError::Syntax(e.to_string()))?;

    let Value::Object(mut root) = value else {
        return Err(FormatError::NotAnObject);
    };

    let subdirs = match root.remove(SUBDIRS_FIELD) {
        None => return Err(FormatError::MissingSubdirs),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(FormatError::SubdirsNotArray),
    };

    // Anything other than a string is treated as no comment at all.
    let comment = match root.remove(COMMENT_FIELD) {
        Some(Value::String(comment)) => Some(comment),
        _ => None,
    };

    let entries = subdirs.into_iter().filter_map(Subdir::from_value);
    Ok(IndexSnapshot::from_entries(entries, comment))
}
