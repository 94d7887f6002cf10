// File: src/validation.rs
// Purpose: ValidationEngine - evaluate the schema against the store, collect sync errors and async jobs

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use rusty_forms_validation::{
    not_a_number, parse_number, validate_email, validate_max, validate_max_items, validate_min,
    validate_min_items,
};

use crate::error_map::FieldError;
use crate::path::{FieldPath, Segment, StablePath};
use crate::runner::AsyncRule;
use crate::schema::{ArrayRules, FieldRules, Schema};
use crate::store::FieldStore;
use crate::value::Value;

/// Which rule targets a pass evaluates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    /// Targets related (ancestor, descendant, or equal) to any of these paths
    Paths(BTreeSet<StablePath>),
}

impl Scope {
    pub fn covers(&self, target: &StablePath) -> bool {
        match self {
            Scope::All => true,
            Scope::Paths(paths) => paths.iter().any(|path| path.is_related(target)),
        }
    }
}

/// An async rule the pass wants run for a field instance
#[derive(Clone)]
pub struct AsyncJob {
    pub subject: StablePath,
    pub value: String,
    pub rule: Arc<dyn AsyncRule>,
}

impl fmt::Debug for AsyncJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncJob")
            .field("subject", &self.subject)
            .field("value", &self.value)
            .field("rule", &self.rule.name())
            .finish()
    }
}

/// Result of one synchronous pass
#[derive(Debug, Default)]
pub struct SyncPass {
    /// Every target evaluated; their previous errors are replaced by this pass
    pub evaluated: Vec<StablePath>,
    pub errors: Vec<(StablePath, FieldError)>,
    pub async_jobs: Vec<AsyncJob>,
    /// Async targets that must not keep a pending evaluation (sync failure or disabled)
    pub cancelled: Vec<StablePath>,
}

/// Evaluates a [`Schema`] against a [`FieldStore`] snapshot
#[derive(Debug, Clone, Default)]
pub struct ValidationEngine {
    schema: Schema,
}

impl ValidationEngine {
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Run every synchronous rule in `scope`. Disabled fields produce no errors.
    pub fn run(&self, store: &FieldStore, scope: &Scope) -> SyncPass {
        let mut pass = SyncPass::default();

        for (path, rules) in &self.schema.fields {
            if let Some(target) = store.resolve(path) {
                check_field(store, scope, target, &label_for(path, rules), rules, &mut pass);
            }
        }

        for (path, array) in &self.schema.arrays {
            let Some(stable) = store.resolve(path) else {
                continue;
            };
            check_length(store, scope, &stable, path, array, &mut pass);

            for &key in store.entry_keys_stable(&stable) {
                let entry = stable.clone().entry(key);
                // Item rules only describe object entries; other entries just lose stale results
                let is_object = matches!(store.get_stable(&entry), Some(Value::Object(_)));
                for (relative, rules) in &array.items {
                    let Some(target) = extend(&entry, relative) else {
                        continue;
                    };
                    if is_object {
                        check_field(store, scope, target, &label_for(relative, rules), rules, &mut pass);
                    } else {
                        clear_field(scope, target, rules, &mut pass);
                    }
                }
            }
        }

        tracing::debug!(
            "Validation pass: {} evaluated, {} errors, {} async",
            pass.evaluated.len(),
            pass.errors.len(),
            pass.async_jobs.len()
        );
        pass
    }
}

/// Mark a target evaluated without checking it, dropping any pending async run
fn clear_field(scope: &Scope, target: StablePath, rules: &FieldRules, pass: &mut SyncPass) {
    if !scope.covers(&target) {
        return;
    }
    pass.evaluated.push(target.clone());
    if rules.async_rule.is_some() {
        pass.cancelled.push(target);
    }
}

fn check_field(
    store: &FieldStore,
    scope: &Scope,
    target: StablePath,
    label: &str,
    rules: &FieldRules,
    pass: &mut SyncPass,
) {
    if !scope.covers(&target) {
        return;
    }
    pass.evaluated.push(target.clone());

    if store.is_disabled_stable(&target) {
        if rules.async_rule.is_some() {
            pass.cancelled.push(target);
        }
        return;
    }

    let value = store.get_stable(&target).cloned().unwrap_or_default();
    if let Err(message) = check_sync(label, rules, &value) {
        if rules.async_rule.is_some() {
            pass.cancelled.push(target.clone());
        }
        pass.errors.push((target, FieldError::schema(message)));
        return;
    }

    if let Some(rule) = &rules.async_rule {
        pass.async_jobs.push(AsyncJob {
            subject: target,
            value: text_of(&value),
            rule: rule.clone(),
        });
    }
}

fn check_length(
    store: &FieldStore,
    scope: &Scope,
    stable: &StablePath,
    path: &FieldPath,
    array: &ArrayRules,
    pass: &mut SyncPass,
) {
    if !scope.covers(stable) {
        return;
    }
    pass.evaluated.push(stable.clone());
    if store.is_disabled_stable(stable) {
        return;
    }

    let len = store.entry_keys_stable(stable).len();
    let result = array
        .min_len
        .as_ref()
        .map_or(Ok(()), |(min, message)| validate_min_items(len, *min, message.as_deref()))
        .and_then(|_| {
            array
                .max_len
                .as_ref()
                .map_or(Ok(()), |(max, message)| validate_max_items(len, *max, message.as_deref()))
        });

    if let Err(message) = result {
        tracing::debug!("{} has {} entries: {}", path, len, message);
        pass.errors.push((stable.clone(), FieldError::schema(message)));
    }
}

/// Synchronous rules for one value, first failure wins
fn check_sync(label: &str, rules: &FieldRules, value: &Value) -> Result<(), String> {
    if let Some(bounds) = rules.number {
        let number = match value {
            Value::Number(n) => Some(*n),
            Value::String(s) if !s.trim().is_empty() => {
                Some(parse_number(s).ok_or_else(|| not_a_number(label))?)
            }
            v if v.is_blank() => None,
            _ => return Err(not_a_number(label)),
        };
        if let Some(n) = number {
            if let Some(min) = bounds.min {
                validate_min(label, n, min)?;
            }
            if let Some(max) = bounds.max {
                validate_max(label, n, max)?;
            }
        }
    }

    if rules.email && !value.is_blank() {
        match value.as_str() {
            Some(text) => validate_email(text.trim())?,
            None => validate_email(&value.to_string())?,
        }
    }

    Ok(())
}

fn label_for(path: &FieldPath, rules: &FieldRules) -> String {
    rules.label.clone().unwrap_or_else(|| {
        path.segments()
            .iter()
            .rev()
            .find_map(|segment| match segment {
                Segment::Key(name) => Some(name.clone()),
                Segment::Index(_) => None,
            })
            .unwrap_or_default()
    })
}

/// Stable path of a member inside an entry. Relative paths may only name keys.
fn extend(entry: &StablePath, relative: &FieldPath) -> Option<StablePath> {
    relative
        .segments()
        .iter()
        .try_fold(entry.clone(), |path, segment| match segment {
            Segment::Key(name) => Some(path.key(name.clone())),
            Segment::Index(_) => None,
        })
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ArrayRules;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn engine() -> ValidationEngine {
        ValidationEngine::new(
            Schema::new()
                .field("amount", FieldRules::number().min(0.0).max(300.0))
                .unwrap()
                .array(
                    "witnesses",
                    ArrayRules::new()
                        .min(1, "Add at least one witness.")
                        .max(5, "Max 5 witnesses.")
                        .item("email", FieldRules::string().email())
                        .unwrap(),
                )
                .unwrap(),
        )
    }

    fn messages(store: &FieldStore, pass: &SyncPass) -> Vec<(String, String)> {
        let mut out: Vec<_> = pass
            .errors
            .iter()
            .map(|(path, error)| (store.project(path).unwrap().to_string(), error.message.clone()))
            .collect();
        out.sort();
        out
    }

    fn witnesses(count: usize) -> serde_json::Value {
        json!((0..count).map(|i| json!({ "name": format!("W{i}"), "email": format!("w{i}@x.cz") })).collect::<Vec<_>>())
    }

    #[rstest]
    #[case(json!(-1), Some("amount must be greater than or equal to 0"))]
    #[case(json!(0), None)]
    #[case(json!(300), None)]
    #[case(json!(301), Some("amount must be less than or equal to 300"))]
    #[case(json!("120"), None)]
    #[case(json!("abc"), Some("amount must be a number"))]
    #[case(json!(""), None)]
    #[case(json!(null), None)]
    fn test_amount_bounds(#[case] amount: serde_json::Value, #[case] expected: Option<&str>) {
        let store = FieldStore::new(Value::from(json!({ "amount": amount, "witnesses": witnesses(1) })));
        let pass = engine().run(&store, &Scope::All);
        let errors = messages(&store, &pass);
        let amount_error = errors.iter().find(|(path, _)| path == "amount").map(|(_, m)| m.as_str());
        assert_eq!(amount_error, expected);
    }

    #[rstest]
    #[case(0, Some("Add at least one witness."))]
    #[case(1, None)]
    #[case(5, None)]
    #[case(6, Some("Max 5 witnesses."))]
    fn test_witness_count_bounds(#[case] count: usize, #[case] expected: Option<&str>) {
        let store = FieldStore::new(Value::from(json!({ "amount": 1, "witnesses": witnesses(count) })));
        let pass = engine().run(&store, &Scope::All);
        let errors = messages(&store, &pass);
        let length_error = errors.iter().find(|(path, _)| path == "witnesses").map(|(_, m)| m.as_str());
        assert_eq!(length_error, expected);
    }

    #[test]
    fn test_item_rules_apply_to_every_entry() {
        let store = FieldStore::new(Value::from(json!({
            "witnesses": [
                { "name": "A", "email": "bad" },
                { "name": "B", "email": "ok@x.cz" },
                { "name": "C", "email": "also bad" }
            ]
        })));
        let pass = engine().run(&store, &Scope::All);
        assert_eq!(
            messages(&store, &pass),
            vec![
                ("witnesses[0].email".to_string(), "Must be a valid email.".to_string()),
                ("witnesses[2].email".to_string(), "Must be a valid email.".to_string()),
            ]
        );
    }

    #[test]
    fn test_field_without_rules_never_errors() {
        let store = FieldStore::new(Value::from(json!({
            "amount": 1,
            "category": 12345,
            "witnesses": [{ "name": null, "email": "a@b.cz" }]
        })));
        let pass = engine().run(&store, &Scope::All);
        assert!(pass.errors.is_empty());
    }

    #[test]
    fn test_scope_limits_evaluation() {
        let store = FieldStore::new(Value::from(json!({ "amount": 999, "witnesses": [] })));
        let amount = store.resolve(&FieldPath::parse("amount").unwrap()).unwrap();
        let scope = Scope::Paths(BTreeSet::from([amount.clone()]));

        let pass = engine().run(&store, &scope);

        assert_eq!(pass.evaluated, vec![amount]);
        assert_eq!(pass.errors.len(), 1);
    }

    #[test]
    fn test_disabled_field_is_skipped() {
        let mut store = FieldStore::new(Value::from(json!({ "amount": 999, "witnesses": witnesses(1) })));
        store.set_disabled(&FieldPath::parse("amount").unwrap(), true);

        let pass = engine().run(&store, &Scope::All);

        assert!(pass.errors.is_empty());
        assert!(pass
            .evaluated
            .contains(&store.resolve(&FieldPath::parse("amount").unwrap()).unwrap()));
    }

    struct AlwaysFree;

    #[async_trait::async_trait]
    impl AsyncRule for AlwaysFree {
        fn name(&self) -> &str {
            "alwaysFree"
        }

        async fn check(&self, _value: &str) -> Result<Option<String>, crate::error::LookupError> {
            Ok(None)
        }
    }

    #[test]
    fn test_non_object_entries_skip_item_rules() {
        let engine = ValidationEngine::new(
            Schema::new()
                .array(
                    "witnesses",
                    ArrayRules::new()
                        .min(1, "Add at least one witness.")
                        .item("email", FieldRules::string().email().test(Arc::new(AlwaysFree)))
                        .unwrap(),
                )
                .unwrap(),
        );
        let store = FieldStore::new(Value::from(json!({
            "witnesses": [{ "name": "A", "email": "a@x.cz" }, null, "loose"]
        })));
        let email_at = |i: usize| store.resolve(&FieldPath::parse(&format!("witnesses[{i}].email")).unwrap()).unwrap();

        let pass = engine.run(&store, &Scope::All);

        assert!(pass.errors.is_empty());
        let jobs: Vec<_> = pass.async_jobs.iter().map(|job| job.subject.clone()).collect();
        assert_eq!(jobs, vec![email_at(0)]);
        assert_eq!(pass.cancelled, vec![email_at(1), email_at(2)]);
        assert!(pass.evaluated.contains(&email_at(1)));
    }
}
