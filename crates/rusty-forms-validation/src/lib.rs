//! Rusty-Forms-Validation Core
//!
//! Pure Rust validation functions compatible with both std and no_std environments.
//! The form engine in `rusty-forms` calls these for every synchronous schema rule.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod collection;
pub mod email;
pub mod numeric;

// Re-export all validators
pub use collection::*;
pub use email::*;
pub use numeric::*;
