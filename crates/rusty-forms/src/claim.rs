// File: src/claim.rs
// Purpose: The insurance claim form - schema, initial record, allocation gating and session helpers

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::array::{EntryKey, RemovedEntry};
use crate::config::{FormConfig, SchemaConfig};
use crate::error::FormError;
use crate::form::Form;
use crate::lookup::{load_category_options, CategoryOption, LookupService, UniqueEmail};
use crate::path::FieldPath;
use crate::schema::{ArrayRules, FieldRules, Schema};
use crate::submit::SubmitState;
use crate::value::Value;

/// Parts a claim may mark as damaged, in display order
pub const DAMAGED_PARTS: [&str; 4] = ["roof", "front", "side", "rear"];

/// A witness entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    #[serde(default, deserialize_with = "text")]
    pub name: String,
    #[serde(default, deserialize_with = "text")]
    pub email: String,
}

impl Witness {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// The record handed to the submit callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRecord {
    #[serde(default, deserialize_with = "number")]
    pub amount: Option<f64>,
    /// Absent while allocation is disabled
    #[serde(default, deserialize_with = "number", skip_serializing_if = "Option::is_none")]
    pub allocation: Option<f64>,
    #[serde(default)]
    pub damaged_parts: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub witnesses: Vec<Witness>,
}

/// Inputs hold numbers as text until parsed; accept either
fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
        Null,
    }

    match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Raw::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("{s:?} is not a number"))),
        Some(Raw::Null) | None => Ok(None),
    }
}

fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// The record a new claim starts from
pub fn initial_values() -> Value {
    Value::from(json!({
        "amount": 250,
        "allocation": 140,
        "damagedParts": ["side", "rear"],
        "category": "kitchen-accessories",
        "witnesses": [
            { "name": "Marek", "email": "marek@email.cz" },
            { "name": "Emily", "email": "emily.johnson@x.dummyjson.com" }
        ]
    }))
}

pub fn claim_schema(bounds: &SchemaConfig, lookup: Arc<dyn LookupService>) -> Result<Schema, FormError> {
    let witnesses_min = bounds.witnesses_min;
    let witnesses_max = bounds.witnesses_max;

    Schema::new()
        .field(
            "amount",
            FieldRules::number().min(bounds.amount_min).max(bounds.amount_max),
        )?
        .field(
            "allocation",
            FieldRules::number()
                .min(bounds.allocation_min)
                .max(bounds.allocation_max),
        )?
        .array(
            "witnesses",
            ArrayRules::new()
                .min(witnesses_min, min_witnesses_message(witnesses_min))
                .max(witnesses_max, format!("Max {witnesses_max} witnesses."))
                .item(
                    "email",
                    FieldRules::string()
                        .email()
                        .test(Arc::new(UniqueEmail::new(lookup))),
                )?,
        )?
        .depends_on("allocation", "amount")
}

fn min_witnesses_message(min: usize) -> String {
    if min == 1 {
        "Add at least one witness.".to_string()
    } else {
        format!("Add at least {min} witnesses.")
    }
}

/// One claim being edited, with its category options
#[derive(Debug)]
pub struct ClaimSession {
    form: Form,
    categories: Vec<CategoryOption>,
}

impl ClaimSession {
    /// Load category options, build the form and gate `allocation` on `amount`
    pub async fn start(config: &FormConfig, lookup: Arc<dyn LookupService>) -> Result<Self, FormError> {
        let categories = load_category_options(lookup.as_ref()).await;
        let mut form = Form::new(claim_schema(&config.schema, lookup)?, initial_values());

        let allocation = FieldPath::parse("allocation")?;
        form.watch("amount", move |amount, store| {
            store.set_disabled(&allocation, !amount.is_truthy());
        })?;

        tracing::info!("Claim session started with {} categories", categories.len());
        Ok(Self { form, categories })
    }

    pub fn form(&self) -> &Form {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut Form {
        &mut self.form
    }

    pub fn categories(&self) -> &[CategoryOption] {
        &self.categories
    }

    pub fn allocation_enabled(&self) -> bool {
        !self.form.is_disabled("allocation")
    }

    /// Add `part` to the damaged parts if absent, remove it otherwise
    pub fn toggle_damaged_part(&mut self, part: &str) -> Result<(), FormError> {
        if !DAMAGED_PARTS.contains(&part) {
            return Err(FormError::UnknownOption {
                field: FieldPath::parse("damagedParts")?,
                option: part.to_string(),
            });
        }

        let mut parts: Vec<Value> = self
            .form
            .get("damagedParts")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        match parts.iter().position(|p| p.as_str() == Some(part)) {
            Some(index) => {
                parts.remove(index);
            }
            None => parts.push(Value::from(part)),
        }
        self.form.set("damagedParts", parts)
    }

    pub fn add_witness(&mut self, witness: Witness) -> Result<EntryKey, FormError> {
        self.form.append(
            "witnesses",
            json!({ "name": witness.name, "email": witness.email }),
        )
    }

    /// Remove the witness currently shown at `index`
    pub fn remove_witness(&mut self, index: usize) -> Result<RemovedEntry, FormError> {
        let key = self
            .form
            .field_array("witnesses")?
            .key_at(self.form.store(), index)?;
        self.form.remove("witnesses", key)
    }

    /// Submit and return the record if it was accepted
    pub async fn submit(&mut self) -> Result<(SubmitState, Option<ClaimRecord>), FormError> {
        let mut accepted = None;
        let state = self
            .form
            .submit(|record: ClaimRecord| accepted = Some(record))
            .await?;
        Ok((state, accepted))
    }
}
