//! Email validation functions

use alloc::string::{String, ToString};

/// Message used when an address fails the format check
pub const INVALID_EMAIL: &str = "Must be a valid email.";

#[cfg(feature = "std")]
static EMAIL_REGEX: once_cell::sync::Lazy<Option<regex::Regex>> = once_cell::sync::Lazy::new(|| {
    regex::Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9-]+(\.[a-zA-Z0-9-]+)*\.[a-zA-Z]{2,}$").ok()
});

/// Validates basic email format
#[cfg(feature = "std")]
pub fn is_valid_email(email: &str) -> bool {
    match EMAIL_REGEX.as_ref() {
        Some(regex) => regex.is_match(email),
        None => is_structurally_valid(email),
    }
}

/// Validates basic email format
#[cfg(not(feature = "std"))]
pub fn is_valid_email(email: &str) -> bool {
    is_structurally_valid(email)
}

/// Checks for exactly one '@', a non-empty local part, and a dotted domain
fn is_structurally_valid(email: &str) -> bool {
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };

    if local.is_empty() || local.len() > 64 || domain.len() > 255 {
        return false;
    }

    if !domain.contains('.') || domain.contains("..") {
        return false;
    }

    if domain.starts_with('.') || domain.ends_with('.')
        || domain.starts_with('-') || domain.ends_with('-') {
        return false;
    }

    local.chars().all(|c| c.is_alphanumeric() || ".+_-%".contains(c))
        && domain.chars().all(|c| c.is_alphanumeric() || c == '.' || c == '-')
}

/// Email format check returning the standard message
///
/// Empty input is not a format error; presence is checked separately.
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() || is_valid_email(email) {
        Ok(())
    } else {
        Err(INVALID_EMAIL.to_string())
    }
}
