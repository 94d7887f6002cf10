// File: src/error_map.rs
// Purpose: Field errors, their taxonomy, and the path-keyed map shown to the user

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::array::EntryKey;
use crate::path::{FieldPath, StablePath};
use crate::store::FieldStore;

/// Where a field error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Synchronous bound or shape failure (numeric range, array length, format)
    SchemaViolation,
    /// Remote predicate said no (e.g. duplicate found)
    AsyncRuleFailure,
    /// Remote predicate could not be evaluated (transport or parse failure)
    LookupError,
}

/// A single human-readable error attached to a field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub kind: ErrorKind,
    pub message: String,
}

impl FieldError {
    pub fn schema(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::SchemaViolation,
            message: message.into(),
        }
    }

    pub fn async_failure(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::AsyncRuleFailure,
            message: message.into(),
        }
    }

    pub fn lookup(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::LookupError,
            message: message.into(),
        }
    }
}

/// Errors keyed by stable path, as the form stores them
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ErrorTable {
    entries: HashMap<StablePath, FieldError>,
}

impl ErrorTable {
    pub fn insert(&mut self, path: StablePath, error: FieldError) {
        self.entries.insert(path, error);
    }

    pub fn remove(&mut self, path: &StablePath) -> Option<FieldError> {
        self.entries.remove(path)
    }

    /// Drop every error belonging to a removed entry
    pub fn forget_entry(&mut self, key: EntryKey) {
        self.entries.retain(|path, _| !path.passes_through(key));
    }

    /// Positional view at this moment. Errors whose entry is gone are left out.
    pub fn project(&self, store: &FieldStore) -> ErrorMap {
        let entries = self
            .entries
            .iter()
            .filter_map(|(stable, error)| Some((store.project(stable)?, error.clone())))
            .collect();
        ErrorMap { entries }
    }
}

/// Field errors keyed by current positional path, e.g. `witnesses[1].email`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ErrorMap {
    entries: BTreeMap<FieldPath, FieldError>,
}

impl ErrorMap {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Error for a path given in text form. Unparseable paths have no error.
    pub fn get(&self, path: &str) -> Option<&FieldError> {
        FieldPath::parse(path)
            .ok()
            .and_then(|path| self.entries.get(&path))
    }

    pub fn get_path(&self, path: &FieldPath) -> Option<&FieldError> {
        self.entries.get(path)
    }

    /// Message for a path, the way a template shows it
    pub fn message(&self, path: &str) -> Option<&str> {
        self.get(path).map(|error| error.message.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldPath, &FieldError)> {
        self.entries.iter()
    }
}
