//! Collection validation functions
//!
//! Length bounds are inclusive. Callers supply the message shown to the user
//! because array-level errors read differently per collection ("Add at least one witness.").

use alloc::format;
use alloc::string::{String, ToString};

/// Validates minimum number of items in a collection
pub fn validate_min_items(len: usize, min: usize, message: Option<&str>) -> Result<(), String> {
    if len >= min {
        Ok(())
    } else {
        Err(message
            .map(ToString::to_string)
            .unwrap_or_else(|| format!("Must have at least {} items", min)))
    }
}

/// Validates maximum number of items in a collection
pub fn validate_max_items(len: usize, max: usize, message: Option<&str>) -> Result<(), String> {
    if len <= max {
        Ok(())
    } else {
        Err(message
            .map(ToString::to_string)
            .unwrap_or_else(|| format!("Must have at most {} items", max)))
    }
}
