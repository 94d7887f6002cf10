//! Numeric validation functions
//!
//! Messages name the field, e.g. `amount must be less than or equal to 300`.
//! Bounds are inclusive on both ends.

use alloc::format;
use alloc::string::String;

/// Validates minimum value for numeric types
pub fn validate_min<T: PartialOrd + core::fmt::Display>(
    label: &str,
    value: T,
    min: T,
) -> Result<(), String> {
    if value >= min {
        Ok(())
    } else {
        Err(format!("{} must be greater than or equal to {}", label, min))
    }
}

/// Validates maximum value for numeric types
pub fn validate_max<T: PartialOrd + core::fmt::Display>(
    label: &str,
    value: T,
    max: T,
) -> Result<(), String> {
    if value <= max {
        Ok(())
    } else {
        Err(format!("{} must be less than or equal to {}", label, max))
    }
}

/// Parses a numeric input the way a number input reports it.
///
/// Returns `None` for text that is not a finite number.
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Message for a value that is present but not numeric
pub fn not_a_number(label: &str) -> String {
    format!("{} must be a number", label)
}
