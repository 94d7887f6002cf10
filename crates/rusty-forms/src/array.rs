// File: src/array.rs
// Purpose: Keyed field arrays (append/remove with stable synthetic entry keys)

use serde::Serialize;
use std::fmt;

use crate::error::FormError;
use crate::path::FieldPath;
use crate::runner::AsyncRuleRunner;
use crate::store::FieldStore;
use crate::value::Value;

/// Synthetic identity of an array entry.
///
/// Assigned once when the entry enters the store and never reused, so it survives
/// removal of siblings while the entry's position does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EntryKey(u64);

impl EntryKey {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An entry as the presentation layer iterates it: stable key plus current position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArrayField {
    pub key: EntryKey,
    pub index: usize,
}

/// Result of removing an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovedEntry {
    pub key: EntryKey,
    /// Position the entry held before removal
    pub index: usize,
    /// Async evaluations discarded because they belonged to the entry
    pub cancelled: usize,
}

/// Handle for one array field of the store, e.g. `witnesses`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayController {
    path: FieldPath,
}

impl ArrayController {
    pub fn new(path: FieldPath) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    /// Entries in current order, each with its key and position
    pub fn fields(&self, store: &FieldStore) -> Vec<ArrayField> {
        store
            .entry_keys(&self.path)
            .iter()
            .enumerate()
            .map(|(index, &key)| ArrayField { key, index })
            .collect()
    }

    pub fn len(&self, store: &FieldStore) -> usize {
        store.entry_keys(&self.path).len()
    }

    pub fn is_empty(&self, store: &FieldStore) -> bool {
        self.len(store) == 0
    }

    /// Current position of an entry
    pub fn position(&self, store: &FieldStore, key: EntryKey) -> Option<usize> {
        store.entry_keys(&self.path).iter().position(|&k| k == key)
    }

    /// Key of the entry currently at `index`
    pub fn key_at(&self, store: &FieldStore, index: usize) -> Result<EntryKey, FormError> {
        store
            .entry_keys(&self.path)
            .get(index)
            .copied()
            .ok_or_else(|| FormError::IndexOutOfRange {
                array: self.path.clone(),
                index,
            })
    }

    /// Insert `entry` at the end under a fresh key
    pub fn append(&self, store: &mut FieldStore, entry: Value) -> Result<EntryKey, FormError> {
        let key = store.push_entry(&self.path, entry)?;
        tracing::debug!("Appended entry {} to {}", key, self.path);
        Ok(key)
    }

    /// Delete the entry with `key`; later entries shift down one position.
    ///
    /// Any in-flight async evaluation whose subject lives under the entry is
    /// cancelled, so its result can never be written back.
    pub fn remove(
        &self,
        store: &mut FieldStore,
        runner: &mut AsyncRuleRunner,
        key: EntryKey,
    ) -> Result<RemovedEntry, FormError> {
        let index = store.remove_entry(&self.path, key)?;
        let cancelled = runner.cancel_entry(key);
        tracing::debug!(
            "Removed entry {} from {} at position {} ({} evaluations cancelled)",
            key,
            self.path,
            index,
            cancelled
        );
        Ok(RemovedEntry { key, index, cancelled })
    }
}
