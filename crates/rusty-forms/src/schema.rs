// File: src/schema.rs
// Purpose: Declarative validation schema (per-field rules, array bounds, item sub-schemas)

use std::fmt;
use std::sync::Arc;

use crate::error::FormError;
use crate::path::FieldPath;
use crate::runner::AsyncRule;

/// Inclusive numeric bounds
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NumberBounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Rules for a single field. A field with no rules always validates.
#[derive(Clone, Default)]
pub struct FieldRules {
    /// Name used in messages; defaults to the field's last path segment
    pub label: Option<String>,
    pub number: Option<NumberBounds>,
    pub email: bool,
    pub async_rule: Option<Arc<dyn AsyncRule>>,
}

impl fmt::Debug for FieldRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldRules")
            .field("label", &self.label)
            .field("number", &self.number)
            .field("email", &self.email)
            .field("async_rule", &self.async_rule.as_ref().map(|rule| rule.name().to_string()))
            .finish()
    }
}

impl FieldRules {
    /// A numeric field with no bounds yet
    pub fn number() -> Self {
        Self {
            number: Some(NumberBounds::default()),
            ..Self::default()
        }
    }

    /// A text field with no rules yet
    pub fn string() -> Self {
        Self::default()
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.number.get_or_insert_with(NumberBounds::default).min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.number.get_or_insert_with(NumberBounds::default).max = Some(max);
        self
    }

    /// Require a syntactically valid email address (empty passes)
    pub fn email(mut self) -> Self {
        self.email = true;
        self
    }

    /// Attach an async predicate, evaluated once the synchronous rules pass
    pub fn test(mut self, rule: Arc<dyn AsyncRule>) -> Self {
        self.async_rule = Some(rule);
        self
    }

    pub fn has_sync_rules(&self) -> bool {
        self.number.is_some() || self.email
    }
}

/// Rules for an array field
#[derive(Debug, Clone, Default)]
pub struct ArrayRules {
    pub label: Option<String>,
    pub min_len: Option<(usize, Option<String>)>,
    pub max_len: Option<(usize, Option<String>)>,
    /// Rules applied to every entry, keyed by path relative to the entry
    pub items: Vec<(FieldPath, FieldRules)>,
}

impl ArrayRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min(mut self, min: usize, message: impl Into<String>) -> Self {
        self.min_len = Some((min, Some(message.into())));
        self
    }

    pub fn max(mut self, max: usize, message: impl Into<String>) -> Self {
        self.max_len = Some((max, Some(message.into())));
        self
    }

    /// Rules for a member of each entry, e.g. `item("email", ...)`
    pub fn item(mut self, relative: &str, rules: FieldRules) -> Result<Self, FormError> {
        self.items.push((FieldPath::parse(relative)?, rules));
        Ok(self)
    }
}

/// The full set of rules for a record
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub(crate) fields: Vec<(FieldPath, FieldRules)>,
    pub(crate) arrays: Vec<(FieldPath, ArrayRules)>,
    /// `(dependent, source)`: re-validate `dependent` whenever `source` changes
    pub(crate) dependencies: Vec<(FieldPath, FieldPath)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, path: &str, rules: FieldRules) -> Result<Self, FormError> {
        self.fields.push((FieldPath::parse(path)?, rules));
        Ok(self)
    }

    pub fn array(mut self, path: &str, rules: ArrayRules) -> Result<Self, FormError> {
        self.arrays.push((FieldPath::parse(path)?, rules));
        Ok(self)
    }

    /// Declare that `dependent` must be re-validated when `source` changes
    pub fn depends_on(mut self, dependent: &str, source: &str) -> Result<Self, FormError> {
        self.dependencies
            .push((FieldPath::parse(dependent)?, FieldPath::parse(source)?));
        Ok(self)
    }

    /// Paths declared dependent on a write at `changed`
    pub fn dependents_of<'a>(&'a self, changed: &'a FieldPath) -> impl Iterator<Item = &'a FieldPath> + 'a {
        self.dependencies
            .iter()
            .filter(move |(_, source)| source.is_related(changed))
            .map(|(dependent, _)| dependent)
    }

    pub fn has_async_rules(&self) -> bool {
        self.fields.iter().any(|(_, rules)| rules.async_rule.is_some())
            || self
                .arrays
                .iter()
                .flat_map(|(_, array)| &array.items)
                .any(|(_, rules)| rules.async_rule.is_some())
    }
}
