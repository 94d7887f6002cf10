// File: src/watch.rs
// Purpose: Publish/subscribe table keyed by field path, and the dependent-field watcher built on it

use std::fmt;

use crate::path::FieldPath;
use crate::store::FieldStore;
use crate::value::Value;

/// Handle returned by `subscribe`/`watch`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Callbacks registered against field paths.
///
/// A write at path P reaches every callback whose path is P, an ancestor of P,
/// or a descendant of P. Writes to unrelated paths reach nobody.
pub struct Registry<F> {
    next_id: u64,
    entries: Vec<(SubscriptionId, FieldPath, F)>,
}

impl<F> Registry<F> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }

    pub fn insert(&mut self, path: FieldPath, callback: F) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.entries.push((id, path, callback));
        id
    }

    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _, _)| *entry_id != id);
        self.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Callbacks affected by a write at `changed`, in registration order
    pub fn related_mut<'a>(
        &'a mut self,
        changed: &'a FieldPath,
    ) -> impl Iterator<Item = (&'a FieldPath, &'a mut F)> + 'a {
        self.entries
            .iter_mut()
            .filter(move |(_, path, _)| path.is_related(changed))
            .map(|(_, path, callback)| (&*path, callback))
    }
}

impl<F> Default for Registry<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> fmt::Debug for Registry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("subscriptions", &self.entries.len())
            .finish()
    }
}

/// Effect run when a watched value changes. It may adjust other fields' state.
pub type Effect = Box<dyn FnMut(&Value, &mut FieldStore)>;

/// Runs effects when specific source paths change, e.g. enabling `allocation`
/// only while `amount` is truthy.
#[derive(Debug, Default)]
pub struct DependencyWatcher {
    effects: Registry<Effect>,
}

impl DependencyWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch `source`. The effect runs once immediately with the current value.
    pub fn watch(
        &mut self,
        source: FieldPath,
        effect: impl FnMut(&Value, &mut FieldStore) + 'static,
        store: &mut FieldStore,
    ) -> SubscriptionId {
        let mut effect: Effect = Box::new(effect);
        let current = store.get(&source).cloned().unwrap_or_default();
        effect(&current, store);
        self.effects.insert(source, effect)
    }

    pub fn unwatch(&mut self, id: SubscriptionId) -> bool {
        self.effects.remove(id)
    }

    /// Run every effect related to a write at `changed`. Returns how many ran.
    pub fn notify(&mut self, changed: &FieldPath, store: &mut FieldStore) -> usize {
        let mut fired = 0;
        for (source, effect) in self.effects.related_mut(changed) {
            let current = store.get(source).cloned().unwrap_or_default();
            effect(&current, store);
            fired += 1;
        }
        if fired > 0 {
            tracing::debug!("Write to {} fired {} watcher(s)", changed, fired);
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    fn path(raw: &str) -> FieldPath {
        FieldPath::parse(raw).unwrap()
    }

    fn gate_allocation(value: &Value, store: &mut FieldStore) {
        store.set_disabled(&FieldPath::parse("allocation").unwrap(), !value.is_truthy());
    }

    #[test]
    fn test_watch_fires_on_mount() {
        let mut store = FieldStore::new(Value::from(json!({ "amount": 0, "allocation": 5 })));
        let mut watcher = DependencyWatcher::new();

        watcher.watch(path("amount"), gate_allocation, &mut store);

        assert!(store.is_disabled(&path("allocation")));
    }

    #[test]
    fn test_watch_follows_source_changes() {
        let mut store = FieldStore::new(Value::from(json!({ "amount": 250, "allocation": 5 })));
        let mut watcher = DependencyWatcher::new();
        watcher.watch(path("amount"), gate_allocation, &mut store);
        assert!(!store.is_disabled(&path("allocation")));

        store.set(&path("amount"), Value::Null).unwrap();
        watcher.notify(&path("amount"), &mut store);
        assert!(store.is_disabled(&path("allocation")));

        store.set(&path("amount"), Value::from(10)).unwrap();
        watcher.notify(&path("amount"), &mut store);
        assert!(!store.is_disabled(&path("allocation")));
    }

    #[test]
    fn test_unrelated_writes_do_not_fire() {
        let mut store = FieldStore::new(Value::from(json!({ "amount": 1, "category": "x" })));
        let mut watcher = DependencyWatcher::new();
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        watcher.watch(path("amount"), move |_, _| counter.set(counter.get() + 1), &mut store);
        assert_eq!(calls.get(), 1);

        assert_eq!(watcher.notify(&path("category"), &mut store), 0);
        assert_eq!(watcher.notify(&path("amount"), &mut store), 1);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_unwatch_stops_effect() {
        let mut store = FieldStore::new(Value::object());
        let mut watcher = DependencyWatcher::new();
        let id = watcher.watch(path("amount"), |_, _| {}, &mut store);

        assert!(watcher.unwatch(id));
        assert!(!watcher.unwatch(id));
        assert_eq!(watcher.notify(&path("amount"), &mut store), 0);
    }
}
