// File: src/error.rs
// Purpose: Library error types (form misuse and lookup transport failures)

use thiserror::Error;

use crate::array::EntryKey;
use crate::path::FieldPath;

/// Errors returned by form operations.
///
/// Validation failures are not errors in this sense; they land in the
/// [`ErrorMap`](crate::ErrorMap) as data.
#[derive(Debug, Error)]
pub enum FormError {
    #[error("Invalid field path: {0:?}")]
    InvalidPath(String),

    #[error("Field {0} is disabled")]
    Disabled(FieldPath),

    #[error("Field {0} is not an array")]
    NotAnArray(FieldPath),

    #[error("No entry {key} in {array}")]
    UnknownEntry { array: FieldPath, key: EntryKey },

    #[error("Index {index} is out of range for {array}")]
    IndexOutOfRange { array: FieldPath, index: usize },

    #[error("{option:?} is not an option of {field}")]
    UnknownOption { field: FieldPath, option: String },

    #[error("Failed to decode submitted record: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Failures talking to the external lookup service
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Lookup request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Lookup returned HTTP {0}")]
    Status(u16),

    #[error("Lookup response was malformed: {0}")]
    Malformed(String),
}
