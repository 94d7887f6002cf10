//! # rusty-forms
//!
//! Form-state engine: a field store addressed by paths, dependent-field watchers,
//! keyed field arrays, and async validation that never lets a stale result win.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rusty_forms::{ClaimSession, FormConfig, HttpLookup};
//! use std::sync::Arc;
//!
//! let config = FormConfig::load_default()?;
//! let lookup = Arc::new(HttpLookup::new(config.lookup.clone())?);
//! let mut session = ClaimSession::start(&config, lookup).await?;
//!
//! session.form_mut().set("amount", 120)?;
//! session.form_mut().set("witnesses[1].email", "new@example.com")?;
//!
//! // Idle point of the event loop: validate what changed
//! session.form_mut().tick();
//!
//! let (state, record) = session.submit().await?;
//! ```
//!
//! ## Architecture
//!
//! - **`FieldStore`** - the record, per-field metadata, and entry keys for arrays
//! - **`DependencyWatcher`** - effects that run when a source path changes
//! - **`ArrayController`** - append/remove by stable key instead of position
//! - **`ValidationEngine`** - synchronous schema rules over a scope of paths
//! - **`AsyncRuleRunner`** - at most one live evaluation per field, latest wins
//! - **`SubmissionController`** - Idle -> Validating -> Accepted | Rejected
//!
//! Errors, metadata and async evaluations are keyed by [`StablePath`], which names
//! array entries by key. Removing an entry therefore cannot shift anyone else's
//! error onto the wrong row; positions are computed only when reading.

pub mod array;
pub mod claim;
pub mod config;
pub mod error;
pub mod error_map;
pub mod form;
pub mod lookup;
pub mod path;
pub mod runner;
pub mod schema;
pub mod store;
pub mod submit;
pub mod validation;
pub mod value;
pub mod watch;

pub use array::{ArrayController, ArrayField, EntryKey, RemovedEntry};
pub use claim::{claim_schema, initial_values, ClaimRecord, ClaimSession, Witness, DAMAGED_PARTS};
pub use config::{FormConfig, LookupConfig, SchemaConfig};
pub use error::{FormError, LookupError};
pub use error_map::{ErrorKind, ErrorMap, FieldError};
pub use form::Form;
pub use lookup::{
    load_category_options, Category, CategoryOption, HttpLookup, LookupService, UniqueEmail, User,
    UserSearch,
};
pub use path::{FieldPath, StablePath};
pub use runner::{AsyncRule, AsyncRuleRunner, Dispatch, RuleOutcome};
pub use schema::{ArrayRules, FieldRules, Schema};
pub use store::{FieldMeta, FieldStore};
pub use submit::{SubmissionController, SubmitRequest, SubmitState};
pub use validation::{Scope, ValidationEngine};
pub use value::Value;
pub use watch::{DependencyWatcher, SubscriptionId};

// Re-export validation functions
pub use rusty_forms_validation as validators;
