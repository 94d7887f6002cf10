// File: src/form.rs
// Purpose: Form - ties store, watchers, arrays, validation, async runner and submission together

use serde::de::DeserializeOwned;
use std::collections::BTreeSet;

use crate::array::{ArrayController, ArrayField, EntryKey, RemovedEntry};
use crate::error::FormError;
use crate::error_map::{ErrorMap, ErrorTable};
use crate::path::{FieldPath, StablePath};
use crate::runner::{AsyncRuleRunner, Dispatch, RuleOutcome};
use crate::schema::Schema;
use crate::store::{FieldMeta, FieldStore};
use crate::submit::{SubmissionController, SubmitRequest, SubmitState};
use crate::validation::{Scope, ValidationEngine};
use crate::value::Value;
use crate::watch::{DependencyWatcher, SubscriptionId};

/// One editing session of a record.
///
/// All mutation happens through `&mut self` on a single task; async rule
/// evaluations run elsewhere and only ever report back through the runner,
/// which discards anything superseded. Writes never validate synchronously:
/// they schedule the affected paths, and the next [`tick`](Form::tick) (the
/// idle point of the caller's event loop) validates whatever was written last.
#[derive(Debug)]
pub struct Form {
    store: FieldStore,
    watcher: DependencyWatcher,
    engine: ValidationEngine,
    runner: AsyncRuleRunner,
    errors: ErrorTable,
    scheduled: BTreeSet<StablePath>,
    submission: SubmissionController,
}

impl Form {
    pub fn new(schema: Schema, defaults: Value) -> Self {
        Self {
            store: FieldStore::new(defaults),
            watcher: DependencyWatcher::new(),
            engine: ValidationEngine::new(schema),
            runner: AsyncRuleRunner::new(),
            errors: ErrorTable::default(),
            scheduled: BTreeSet::new(),
            submission: SubmissionController::new(),
        }
    }

    pub fn store(&self) -> &FieldStore {
        &self.store
    }

    pub fn values(&self) -> &Value {
        self.store.values()
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        FieldPath::parse(path).ok().and_then(|path| self.store.get(&path))
    }

    /// Write a value. Watchers of related paths run immediately; validation of the
    /// path and its declared dependents is deferred to the next tick.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<(), FormError> {
        self.set_path(&FieldPath::parse(path)?, value.into())
    }

    pub fn set_path(&mut self, path: &FieldPath, value: Value) -> Result<(), FormError> {
        let write = self.store.write(path, value)?;
        for key in &write.dropped {
            self.runner.cancel_entry(*key);
            self.errors.forget_entry(*key);
        }
        // A check started for the previous value must not land after this write
        self.runner.cancel_related(&write.path);
        self.watcher.notify(path, &mut self.store);
        self.schedule(path, write.path);
        Ok(())
    }

    fn schedule(&mut self, path: &FieldPath, stable: StablePath) {
        let dependents: Vec<StablePath> = self
            .engine
            .schema()
            .dependents_of(path)
            .filter_map(|dependent| self.store.resolve(dependent))
            .collect();
        self.scheduled.insert(stable);
        self.scheduled.extend(dependents);
    }

    /// Run `effect` now with the current value of `source`, and again whenever it changes
    pub fn watch(
        &mut self,
        source: &str,
        effect: impl FnMut(&Value, &mut FieldStore) + 'static,
    ) -> Result<SubscriptionId, FormError> {
        let source = FieldPath::parse(source)?;
        Ok(self.watcher.watch(source, effect, &mut self.store))
    }

    pub fn unwatch(&mut self, id: SubscriptionId) -> bool {
        self.watcher.unwatch(id)
    }

    /// Plain value listener; does not run on registration
    pub fn subscribe(
        &mut self,
        path: &str,
        listener: impl FnMut(&Value) + 'static,
    ) -> Result<SubscriptionId, FormError> {
        Ok(self.store.subscribe(FieldPath::parse(path)?, listener))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.store.unsubscribe(id)
    }

    pub fn field_array(&self, path: &str) -> Result<ArrayController, FormError> {
        Ok(ArrayController::new(FieldPath::parse(path)?))
    }

    pub fn fields(&self, array: &str) -> Result<Vec<ArrayField>, FormError> {
        Ok(self.field_array(array)?.fields(&self.store))
    }

    /// Append an entry under a fresh key
    pub fn append(&mut self, array: &str, entry: impl Into<Value>) -> Result<EntryKey, FormError> {
        let controller = self.field_array(array)?;
        let key = controller.append(&mut self.store, entry.into())?;
        self.watcher.notify(controller.path(), &mut self.store);
        if let Some(stable) = self.store.resolve(controller.path()) {
            self.schedule(controller.path(), stable);
        }
        Ok(key)
    }

    /// Remove an entry by key. Its errors and in-flight evaluations go with it;
    /// errors of surviving entries are untouched and simply project to new positions.
    pub fn remove(&mut self, array: &str, key: EntryKey) -> Result<RemovedEntry, FormError> {
        let controller = self.field_array(array)?;
        let removed = controller.remove(&mut self.store, &mut self.runner, key)?;
        self.errors.forget_entry(key);
        self.scheduled.retain(|path| !path.passes_through(key));
        self.watcher.notify(controller.path(), &mut self.store);
        if let Some(stable) = self.store.resolve(controller.path()) {
            // Only the length rule can change for the array itself
            self.scheduled.insert(stable);
        }
        Ok(removed)
    }

    pub fn meta(&self, path: &str) -> FieldMeta {
        FieldPath::parse(path)
            .map(|path| self.store.meta(&path))
            .unwrap_or_default()
    }

    pub fn mark_touched(&mut self, path: &str) -> Result<(), FormError> {
        self.store.mark_touched(&FieldPath::parse(path)?)
    }

    pub fn is_disabled(&self, path: &str) -> bool {
        FieldPath::parse(path)
            .map(|path| self.store.is_disabled(&path))
            .unwrap_or(false)
    }

    /// True if writes are waiting for the next tick
    pub fn is_validation_scheduled(&self) -> bool {
        !self.scheduled.is_empty()
    }

    pub fn pending_async(&self) -> usize {
        self.runner.pending_count()
    }

    /// Current errors keyed by positional path
    pub fn errors(&self) -> ErrorMap {
        self.errors.project(&self.store)
    }

    /// No errors, nothing scheduled, nothing in flight
    pub fn is_valid(&self) -> bool {
        self.scheduled.is_empty() && self.runner.pending_count() == 0 && self.errors().is_empty()
    }

    /// Idle point: apply async results that have arrived, then validate what was
    /// written since the last tick. Returns true if a pass ran.
    pub fn tick(&mut self) -> bool {
        self.poll_async();
        if self.scheduled.is_empty() {
            return false;
        }
        let scope = Scope::Paths(std::mem::take(&mut self.scheduled));
        self.run_pass(&scope);
        true
    }

    /// Apply async results that have already arrived. Returns how many were applied.
    pub fn poll_async(&mut self) -> usize {
        let ready = self.runner.drain_ready();
        let applied = ready.len();
        for outcome in ready {
            self.apply(outcome);
        }
        applied
    }

    /// Tick, then wait until every pending async evaluation has settled
    pub async fn settle(&mut self) {
        self.tick();
        while let Some(outcome) = self.runner.next_settled().await {
            self.apply(outcome);
        }
    }

    /// Full synchronous pass over every rule, dispatching every async rule
    pub fn validate_all(&mut self) {
        self.scheduled.clear();
        self.run_pass(&Scope::All);
    }

    fn run_pass(&mut self, scope: &Scope) {
        let pass = self.engine.run(&self.store, scope);

        for target in &pass.evaluated {
            self.errors.remove(target);
        }
        for target in &pass.cancelled {
            self.runner.cancel(target);
        }
        for (target, error) in pass.errors {
            self.errors.insert(target, error);
        }
        for job in pass.async_jobs {
            let subject = job.subject.clone();
            if let Dispatch::Settled(Some(error)) = self.runner.run_rule(job.subject, &job.value, job.rule) {
                self.errors.insert(subject, error);
            }
        }
    }

    fn apply(&mut self, outcome: RuleOutcome) {
        // An entry removed after dispatch has no path any more
        if self.store.project(&outcome.subject).is_none() {
            return;
        }
        match outcome.error {
            Some(error) => self.errors.insert(outcome.subject, error),
            None => {
                self.errors.remove(&outcome.subject);
            }
        }
    }

    pub fn submit_state(&self) -> SubmitState {
        self.submission.state()
    }

    pub fn submission(&self) -> &SubmissionController {
        &self.submission
    }

    /// Start a submission: full synchronous pass plus dispatch of every async rule.
    /// A request while one is already validating joins it instead.
    pub fn begin_submit(&mut self) -> SubmitRequest {
        let request = self.submission.request();
        if request == SubmitRequest::Started {
            self.validate_all();
        }
        request
    }

    /// Wait for every pending evaluation, then accept or reject.
    ///
    /// On acceptance `on_valid` receives the record with disabled fields left out.
    /// It is never called while any error remains.
    pub async fn finish_submit<R, F>(&mut self, on_valid: F) -> Result<SubmitState, FormError>
    where
        R: DeserializeOwned,
        F: FnOnce(R),
    {
        if !self.submission.is_validating() {
            return Ok(self.submission.state());
        }

        self.settle().await;
        let errors = self.errors();
        if errors.is_empty() {
            // Decode before deciding so a shape mismatch never reads as accepted
            let record = serde_json::from_value::<R>(serde_json::to_value(self.store.enabled_values())?);
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    self.submission.decide(1);
                    return Err(FormError::Decode(e));
                }
            };
            let state = self.submission.decide(0);
            on_valid(record);
            Ok(state)
        } else {
            Ok(self.submission.decide(errors.len()))
        }
    }

    /// `begin_submit` followed by `finish_submit`
    pub async fn submit<R, F>(&mut self, on_valid: F) -> Result<SubmitState, FormError>
    where
        R: DeserializeOwned,
        F: FnOnce(R),
    {
        self.begin_submit();
        self.finish_submit(on_valid).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ArrayRules, FieldRules};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn form() -> Form {
        let schema = Schema::new()
            .field("amount", FieldRules::number().min(0.0).max(300.0))
            .unwrap()
            .field("allocation", FieldRules::number().min(0.0).max(300.0))
            .unwrap()
            .array(
                "witnesses",
                ArrayRules::new()
                    .min(1, "Add at least one witness.")
                    .max(5, "Max 5 witnesses.")
                    .item("email", FieldRules::string().email())
                    .unwrap(),
            )
            .unwrap()
            .depends_on("allocation", "amount")
            .unwrap();
        Form::new(
            schema,
            Value::from(json!({
                "amount": 250,
                "allocation": 140,
                "witnesses": [{ "name": "Marek", "email": "marek@email.cz" }]
            })),
        )
    }

    #[test]
    fn test_set_defers_validation_to_tick() {
        let mut form = form();
        form.set("amount", 400).unwrap();

        assert!(form.errors().is_empty());
        assert!(form.is_validation_scheduled());

        assert!(form.tick());
        assert_eq!(
            form.errors().message("amount"),
            Some("amount must be less than or equal to 300")
        );
        assert!(!form.tick());
    }

    #[test]
    fn test_last_write_before_tick_wins() {
        let mut form = form();
        for value in [900, 800, 700, 120] {
            form.set("amount", value).unwrap();
        }
        form.tick();
        assert!(form.errors().is_empty());
    }

    #[test]
    fn test_selective_revalidation_leaves_other_errors() {
        let mut form = form();
        form.set("amount", -5).unwrap();
        form.set("allocation", 500).unwrap();
        form.tick();
        assert_eq!(form.errors().len(), 2);

        form.set("allocation", 10).unwrap();
        form.tick();
        let errors = form.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors.get("amount").is_some());
    }

    #[test]
    fn test_remove_keeps_survivor_errors_aligned() {
        let mut form = form();
        form.append("witnesses", json!({ "name": "B", "email": "not-an-email" })).unwrap();
        form.append("witnesses", json!({ "name": "C", "email": "also-bad" })).unwrap();
        form.tick();
        assert_eq!(form.errors().len(), 2);

        let second = form.fields("witnesses").unwrap()[1].key;
        form.remove("witnesses", second).unwrap();
        form.tick();

        let errors = form.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.message("witnesses[1].email"), Some("Must be a valid email."));
        assert_eq!(form.get("witnesses[1].name"), Some(&Value::from("C")));
    }

    #[test]
    fn test_removing_last_witness_reports_length() {
        let mut form = form();
        let only = form.fields("witnesses").unwrap()[0].key;
        form.remove("witnesses", only).unwrap();
        form.tick();
        assert_eq!(form.errors().message("witnesses"), Some("Add at least one witness."));
    }

    #[tokio::test]
    async fn test_submit_rejects_and_keeps_errors() {
        let mut form = form();
        form.set("amount", 301).unwrap();

        let mut called = false;
        let state = form
            .submit(|_: serde_json::Value| called = true)
            .await
            .unwrap();

        assert_eq!(state, SubmitState::Rejected);
        assert!(!called);
        assert!(form.errors().get("amount").is_some());
    }

    #[tokio::test]
    async fn test_submit_accepts_valid_record() {
        let mut form = form();
        let mut submitted = None;
        let state = form
            .submit(|record: serde_json::Value| submitted = Some(record))
            .await
            .unwrap();

        assert_eq!(state, SubmitState::Accepted);
        assert_eq!(
            submitted,
            Some(json!({
                "amount": 250.0,
                "allocation": 140.0,
                "witnesses": [{ "name": "Marek", "email": "marek@email.cz" }]
            }))
        );
    }

    #[test]
    fn test_bad_path_is_an_error() {
        let mut form = form();
        assert!(matches!(form.set("amount..", 1), Err(FormError::InvalidPath(_))));
        assert_eq!(form.get("amount.."), None);
    }
}
