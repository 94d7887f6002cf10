// File: src/store.rs
// Purpose: FieldStore - current values, per-field metadata, and array entry keys

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::array::EntryKey;
use crate::error::FormError;
use crate::path::{Anchor, FieldPath, Segment, StablePath};
use crate::value::Value;
use crate::watch::{Registry, SubscriptionId};

/// Per-field state alongside the value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FieldMeta {
    /// The user has left the field at least once
    pub touched: bool,
    /// Current value differs from the session default
    pub dirty: bool,
    /// Input is not interactable; writes are rejected and the field is not submitted
    pub disabled: bool,
}

/// Outcome of a store write, consumed by the form to keep errors and async work in step
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Write {
    pub path: StablePath,
    /// Entries that no longer exist because the write replaced their array
    pub dropped: Vec<EntryKey>,
}

type Listener = Box<dyn FnMut(&Value)>;

/// Holds the record being edited.
///
/// Values live in a positional tree; each array additionally has a parallel list of
/// [`EntryKey`]s so metadata can be kept per entry instead of per position.
pub struct FieldStore {
    values: Value,
    defaults: Value,
    keys: HashMap<StablePath, Vec<EntryKey>>,
    default_keys: HashMap<StablePath, Vec<EntryKey>>,
    meta: HashMap<StablePath, FieldMeta>,
    next_key: u64,
    listeners: Registry<Listener>,
}

impl fmt::Debug for FieldStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldStore")
            .field("values", &self.values)
            .field("meta", &self.meta)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl FieldStore {
    /// Create a store whose defaults (for dirty tracking) are `initial`
    pub fn new(initial: Value) -> Self {
        let values = match initial {
            Value::Object(_) => initial,
            _ => Value::object(),
        };

        let mut keys = HashMap::new();
        let mut next_key = 0;
        assign_keys(&mut keys, &mut next_key, &StablePath::root(), &values);

        Self {
            defaults: values.clone(),
            default_keys: keys.clone(),
            values,
            keys,
            meta: HashMap::new(),
            next_key,
            listeners: Registry::new(),
        }
    }

    /// The whole record
    pub fn values(&self) -> &Value {
        &self.values
    }

    pub fn defaults(&self) -> &Value {
        &self.defaults
    }

    /// True when anything differs from the session defaults
    pub fn is_dirty(&self) -> bool {
        self.values != self.defaults
    }

    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        self.values.lookup(path)
    }

    pub fn get_stable(&self, path: &StablePath) -> Option<&Value> {
        walk(&self.values, &self.keys, path)
    }

    /// Write `value` at `path`, creating intermediate objects and array entries as needed.
    ///
    /// Writing past the end of an array extends it with null entries, each under a fresh key.
    pub fn set(&mut self, path: &FieldPath, value: Value) -> Result<(), FormError> {
        self.write(path, value).map(|_| ())
    }

    pub(crate) fn write(&mut self, path: &FieldPath, value: Value) -> Result<Write, FormError> {
        if path.is_root() {
            return Err(FormError::InvalidPath(String::new()));
        }
        if self.is_disabled(path) {
            return Err(FormError::Disabled(path.clone()));
        }

        let Self {
            values,
            keys,
            next_key,
            ..
        } = self;

        let mut stable = StablePath::root();
        let mut dropped = Vec::new();
        let mut current = values;

        for segment in path.segments() {
            match segment {
                Segment::Key(name) => {
                    if !matches!(current, Value::Object(_)) {
                        dropped.extend(drop_keys_under(keys, &stable));
                        *current = Value::object();
                    }
                    let Value::Object(map) = current else {
                        return Err(FormError::InvalidPath(path.to_string()));
                    };
                    current = map.entry(name.clone()).or_insert(Value::Null);
                    stable.push(Anchor::Key(name.clone()));
                }
                Segment::Index(index) => {
                    if !matches!(current, Value::Array(_)) {
                        dropped.extend(drop_keys_under(keys, &stable));
                        *current = Value::Array(Vec::new());
                    }
                    let Value::Array(items) = current else {
                        return Err(FormError::InvalidPath(path.to_string()));
                    };
                    let list = keys.entry(stable.clone()).or_default();
                    while items.len() <= *index {
                        items.push(Value::Null);
                        *next_key += 1;
                        list.push(EntryKey::new(*next_key));
                    }
                    let key = list[*index];
                    current = &mut items[*index];
                    stable.push(Anchor::Entry(key));
                }
            }
        }

        // Anything keyed beneath the old value goes away with it
        dropped.extend(drop_keys_under(keys, &stable));
        assign_keys(keys, next_key, &stable, &value);
        *current = value;

        if !dropped.is_empty() {
            self.meta
                .retain(|path, _| !dropped.iter().any(|key| path.passes_through(*key)));
        }

        let dirty = walk(&self.defaults, &self.default_keys, &stable) != self.get_stable(&stable);
        self.meta.entry(stable.clone()).or_default().dirty = dirty;

        tracing::debug!("Set {} (dirty: {})", path, dirty);
        self.notify(path);

        Ok(Write {
            path: stable,
            dropped,
        })
    }

    /// Map a positional path to its stable twin. `None` if an index is out of range.
    pub fn resolve(&self, path: &FieldPath) -> Option<StablePath> {
        let mut stable = StablePath::root();
        for segment in path.segments() {
            match segment {
                Segment::Key(name) => stable.push(Anchor::Key(name.clone())),
                Segment::Index(index) => {
                    let key = *self.keys.get(&stable)?.get(*index)?;
                    stable.push(Anchor::Entry(key));
                }
            }
        }
        Some(stable)
    }

    /// Map a stable path to current positions. `None` if an entry on the way is gone.
    pub fn project(&self, stable: &StablePath) -> Option<FieldPath> {
        let mut prefix = StablePath::root();
        let mut path = FieldPath::root();
        for anchor in stable.anchors() {
            path = match anchor {
                Anchor::Key(name) => path.key(name.clone()),
                Anchor::Entry(key) => {
                    let index = self.keys.get(&prefix)?.iter().position(|k| k == key)?;
                    path.index(index)
                }
            };
            prefix.push(anchor.clone());
        }
        Some(path)
    }

    /// Entry keys of the array at `path`, in order. Empty if it is not an array.
    pub fn entry_keys(&self, path: &FieldPath) -> &[EntryKey] {
        self.resolve(path)
            .map(|stable| self.entry_keys_stable(&stable))
            .unwrap_or(&[])
    }

    pub fn entry_keys_stable(&self, path: &StablePath) -> &[EntryKey] {
        self.keys.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn push_entry(&mut self, array: &FieldPath, entry: Value) -> Result<EntryKey, FormError> {
        let len = match self.get(array) {
            None | Some(Value::Null) => 0,
            Some(Value::Array(items)) => items.len(),
            Some(_) => return Err(FormError::NotAnArray(array.clone())),
        };

        let write = self.write(&array.clone().index(len), entry)?;
        match write.path.anchors().last() {
            Some(Anchor::Entry(key)) => Ok(*key),
            _ => Err(FormError::NotAnArray(array.clone())),
        }
    }

    /// Delete an entry by key, returning the position it held
    pub(crate) fn remove_entry(&mut self, array: &FieldPath, key: EntryKey) -> Result<usize, FormError> {
        if self.is_disabled(array) {
            return Err(FormError::Disabled(array.clone()));
        }

        let stable = self
            .resolve(array)
            .ok_or_else(|| FormError::NotAnArray(array.clone()))?;
        let unknown = || FormError::UnknownEntry {
            array: array.clone(),
            key,
        };

        let index = self
            .keys
            .get(&stable)
            .and_then(|list| list.iter().position(|k| *k == key))
            .ok_or_else(unknown)?;

        match value_at_mut(&mut self.values, array) {
            Some(Value::Array(items)) if index < items.len() => {
                items.remove(index);
            }
            _ => return Err(FormError::NotAnArray(array.clone())),
        }

        if let Some(list) = self.keys.get_mut(&stable) {
            list.remove(index);
        }
        let nested = drop_keys_under(&mut self.keys, &stable.clone().entry(key));
        self.meta.retain(|path, _| {
            !path.passes_through(key) && !nested.iter().any(|k| path.passes_through(*k))
        });

        let dirty = walk(&self.defaults, &self.default_keys, &stable) != self.get_stable(&stable);
        self.meta.entry(stable).or_default().dirty = dirty;

        self.notify(array);
        Ok(index)
    }

    /// Register a listener for writes at, above, or below `path`
    pub fn subscribe(&mut self, path: FieldPath, listener: impl FnMut(&Value) + 'static) -> SubscriptionId {
        self.listeners.insert(path, Box::new(listener))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.listeners.remove(id)
    }

    fn notify(&mut self, changed: &FieldPath) {
        let values = &self.values;
        for (watched, listener) in self.listeners.related_mut(changed) {
            let current = values.lookup(watched).cloned().unwrap_or_default();
            listener(&current);
        }
    }

    pub fn meta(&self, path: &FieldPath) -> FieldMeta {
        let mut meta = self
            .resolve(path)
            .and_then(|stable| self.meta.get(&stable).copied())
            .unwrap_or_default();
        meta.disabled = self.is_disabled(path);
        meta
    }

    /// Record that the user left the field
    pub fn mark_touched(&mut self, path: &FieldPath) -> Result<(), FormError> {
        let stable = self
            .resolve(path)
            .ok_or_else(|| FormError::InvalidPath(path.to_string()))?;
        self.meta.entry(stable).or_default().touched = true;
        Ok(())
    }

    /// Enable or disable a field. Returns true if the state changed.
    pub fn set_disabled(&mut self, path: &FieldPath, disabled: bool) -> bool {
        let Some(stable) = self.resolve(path) else {
            return false;
        };
        let meta = self.meta.entry(stable).or_default();
        let changed = meta.disabled != disabled;
        meta.disabled = disabled;
        if changed {
            tracing::debug!("{} {}", path, if disabled { "disabled" } else { "enabled" });
        }
        changed
    }

    /// True if the field or any field containing it is disabled
    pub fn is_disabled(&self, path: &FieldPath) -> bool {
        (1..=path.segments().len())
            .map_while(|len| self.resolve(&path.prefix(len)))
            .any(|stable| self.meta.get(&stable).is_some_and(|meta| meta.disabled))
    }

    pub fn is_disabled_stable(&self, path: &StablePath) -> bool {
        self.meta
            .iter()
            .any(|(candidate, meta)| meta.disabled && path.starts_with(candidate))
    }

    /// The record minus disabled fields, as handed to a submit callback
    pub fn enabled_values(&self) -> Value {
        let mut values = self.values.clone();
        let mut disabled: Vec<FieldPath> = self
            .meta
            .iter()
            .filter(|(_, meta)| meta.disabled)
            .filter_map(|(stable, _)| self.project(stable))
            .collect();
        // Deepest first so removing a parent never invalidates a later path
        disabled.sort_by_key(|path| std::cmp::Reverse(path.segments().len()));

        for path in disabled {
            let Some((Segment::Key(name), parent)) = path.segments().split_last() else {
                continue;
            };
            let parent = path.prefix(parent.len());
            if let Some(Value::Object(map)) = value_at_mut(&mut values, &parent) {
                map.remove(name);
            }
        }
        values
    }
}

/// Give every array inside `value` (at `at`) a fresh key list
fn assign_keys(
    keys: &mut HashMap<StablePath, Vec<EntryKey>>,
    next_key: &mut u64,
    at: &StablePath,
    value: &Value,
) {
    match value {
        Value::Array(items) => {
            let fresh: Vec<EntryKey> = items
                .iter()
                .map(|_| {
                    *next_key += 1;
                    EntryKey::new(*next_key)
                })
                .collect();
            for (item, key) in items.iter().zip(&fresh) {
                assign_keys(keys, next_key, &at.clone().entry(*key), item);
            }
            keys.insert(at.clone(), fresh);
        }
        Value::Object(map) => {
            for (name, item) in map {
                assign_keys(keys, next_key, &at.clone().key(name.clone()), item);
            }
        }
        _ => {}
    }
}

/// Remove key lists at or below `prefix`, returning the entries they held
fn drop_keys_under(keys: &mut HashMap<StablePath, Vec<EntryKey>>, prefix: &StablePath) -> Vec<EntryKey> {
    let doomed: Vec<StablePath> = keys
        .keys()
        .filter(|path| path.starts_with(prefix))
        .cloned()
        .collect();
    doomed
        .into_iter()
        .filter_map(|path| keys.remove(&path))
        .flatten()
        .collect()
}

fn walk<'a>(
    root: &'a Value,
    keys: &HashMap<StablePath, Vec<EntryKey>>,
    stable: &StablePath,
) -> Option<&'a Value> {
    let mut prefix = StablePath::root();
    let mut current = root;
    for anchor in stable.anchors() {
        current = match (anchor, current) {
            (Anchor::Key(name), Value::Object(map)) => map.get(name)?,
            (Anchor::Entry(key), Value::Array(items)) => {
                let index = keys.get(&prefix)?.iter().position(|k| k == key)?;
                items.get(index)?
            }
            _ => return None,
        };
        prefix.push(anchor.clone());
    }
    Some(current)
}

fn value_at_mut<'a>(root: &'a mut Value, path: &FieldPath) -> Option<&'a mut Value> {
    path.segments()
        .iter()
        .try_fold(root, |current, segment| match (segment, current) {
            (Segment::Key(name), Value::Object(map)) => map.get_mut(name),
            (Segment::Index(index), Value::Array(items)) => items.get_mut(*index),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    fn path(raw: &str) -> FieldPath {
        FieldPath::parse(raw).unwrap()
    }

    fn object(pairs: &[(&str, Value)]) -> Value {
        Value::Object(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    fn store() -> FieldStore {
        FieldStore::new(Value::from(json!({
            "amount": 250,
            "allocation": 140,
            "witnesses": [{ "name": "Marek", "email": "marek@email.cz" }]
        })))
    }

    #[test]
    fn test_get_and_set() {
        let mut store = store();
        assert_eq!(store.get(&path("amount")), Some(&Value::Number(250.0)));

        store.set(&path("amount"), Value::from(100)).unwrap();
        assert_eq!(store.get(&path("amount")), Some(&Value::Number(100.0)));
        assert_eq!(store.get(&path("missing")), None);
    }

    #[test]
    fn test_set_past_end_extends_array() {
        let mut store = store();
        store.set(&path("witnesses[2].email"), Value::from("x@y.cz")).unwrap();

        assert_eq!(store.entry_keys(&path("witnesses")).len(), 3);
        assert_eq!(store.get(&path("witnesses[1]")), Some(&Value::Null));
        assert_eq!(
            store.get(&path("witnesses[2].email")),
            Some(&Value::from("x@y.cz"))
        );
    }

    #[test]
    fn test_set_on_missing_path_creates_structure() {
        let mut store = store();
        store.set(&path("extra.notes[0]"), Value::from("first")).unwrap();
        assert_eq!(store.get(&path("extra.notes[0]")), Some(&Value::from("first")));
        assert_eq!(store.entry_keys(&path("extra.notes")).len(), 1);
    }

    #[test]
    fn test_write_through_scalar_replaces_it() {
        let mut store = store();
        store.set(&path("amount.note"), Value::from("estimate")).unwrap();
        assert_eq!(store.get(&path("amount.note")), Some(&Value::from("estimate")));

        store.set(&path("allocation[1]"), Value::from(40)).unwrap();
        assert_eq!(store.get(&path("allocation[0]")), Some(&Value::Null));
        assert_eq!(store.entry_keys(&path("allocation")).len(), 2);
    }

    #[test]
    fn test_dirty_tracks_defaults() {
        let mut store = store();
        store.set(&path("amount"), Value::from(10)).unwrap();
        assert!(store.meta(&path("amount")).dirty);
        assert!(store.is_dirty());

        store.set(&path("amount"), Value::from(250)).unwrap();
        assert!(!store.meta(&path("amount")).dirty);
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_resolve_and_project_follow_entry_keys() {
        let mut store = store();
        store.set(&path("witnesses[1].email"), Value::from("b@b.cz")).unwrap();
        let stable = store.resolve(&path("witnesses[1].email")).unwrap();

        let first = store.entry_keys(&path("witnesses"))[0];
        store.remove_entry(&path("witnesses"), first).unwrap();

        assert_eq!(store.project(&stable), Some(path("witnesses[0].email")));
        assert_eq!(store.get_stable(&stable), Some(&Value::from("b@b.cz")));
    }

    #[test]
    fn test_disabled_field_rejects_writes() {
        let mut store = store();
        assert!(store.set_disabled(&path("allocation"), true));

        let result = store.set(&path("allocation"), Value::from(10));
        assert!(matches!(result, Err(FormError::Disabled(_))));
        assert_eq!(store.get(&path("allocation")), Some(&Value::Number(140.0)));
        assert!(store.meta(&path("allocation")).disabled);
    }

    #[test]
    fn test_enabled_values_omit_disabled_fields() {
        let mut store = store();
        store.set_disabled(&path("allocation"), true);

        let submitted = store.enabled_values();
        assert_eq!(submitted.lookup(&path("allocation")), None);
        assert_eq!(submitted.lookup(&path("amount")), Some(&Value::Number(250.0)));
    }

    #[test]
    fn test_subscribers_only_hear_related_writes() {
        let mut store = store();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let id = store.subscribe(path("amount"), move |value| sink.borrow_mut().push(value.clone()));

        store.set(&path("allocation"), Value::from(1)).unwrap();
        store.set(&path("amount"), Value::from(2)).unwrap();
        assert_eq!(*seen.borrow(), vec![Value::Number(2.0)]);

        assert!(store.unsubscribe(id));
        store.set(&path("amount"), Value::from(3)).unwrap();
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_replacing_array_drops_old_entries() {
        let mut store = store();
        let old = store.entry_keys(&path("witnesses"))[0];
        let write = store
            .write(&path("witnesses"), Value::Array(vec![object(&[("name", Value::from("New"))])]))
            .unwrap();

        assert_eq!(write.dropped, vec![old]);
        assert_ne!(store.entry_keys(&path("witnesses"))[0], old);
    }
}
