// File: src/runner.rs
// Purpose: AsyncRuleRunner - one in-flight async evaluation per subject, stale results dropped

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::array::EntryKey;
use crate::error::LookupError;
use crate::error_map::{ErrorKind, FieldError};
use crate::path::StablePath;

/// An asynchronous validation predicate, e.g. "no user has this email"
#[async_trait]
pub trait AsyncRule: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// `Ok(None)` passes, `Ok(Some(message))` fails, `Err` is inconclusive
    async fn check(&self, value: &str) -> Result<Option<String>, LookupError>;

    /// Reported for empty input; the check itself is never called with an empty value
    fn empty_message(&self) -> &str {
        "This field is required."
    }

    /// Reported when `check` returns `Err`
    fn inconclusive_message(&self) -> &str {
        "Could not be verified."
    }
}

impl fmt::Debug for dyn AsyncRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AsyncRule({})", self.name())
    }
}

/// Result of an async evaluation, tagged with the generation that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    pub subject: StablePath,
    pub generation: u64,
    pub error: Option<FieldError>,
}

/// What `run_rule` did with a request
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Evaluation is running under this generation; the result arrives later
    Pending(u64),
    /// The answer is already known (empty input, or this exact value already settled)
    Settled(Option<FieldError>),
}

/// Executes async rules and guarantees that, per subject, only the result of the
/// latest-issued evaluation is ever accepted.
///
/// Each subject has a generation counter bumped on every new evaluation or cancel.
/// Results travel back over a channel and are compared against the generation still
/// in flight; anything else is dropped on arrival. Underlying requests are never
/// aborted, only ignored.
pub struct AsyncRuleRunner {
    generations: HashMap<StablePath, u64>,
    in_flight: HashMap<StablePath, (u64, String)>,
    settled: HashMap<StablePath, (String, Option<FieldError>)>,
    tx: mpsc::UnboundedSender<RuleOutcome>,
    rx: mpsc::UnboundedReceiver<RuleOutcome>,
}

impl fmt::Debug for AsyncRuleRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncRuleRunner")
            .field("in_flight", &self.in_flight.len())
            .field("settled", &self.settled.len())
            .finish()
    }
}

impl Default for AsyncRuleRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncRuleRunner {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            generations: HashMap::new(),
            in_flight: HashMap::new(),
            settled: HashMap::new(),
            tx,
            rx,
        }
    }

    fn bump(&mut self, subject: &StablePath) -> u64 {
        let generation = self.generations.entry(subject.clone()).or_insert(0);
        *generation += 1;
        *generation
    }

    /// Current generation of a subject (0 if never evaluated)
    pub fn generation(&self, subject: &StablePath) -> u64 {
        self.generations.get(subject).copied().unwrap_or(0)
    }

    /// Start evaluating `rule` against `value` for `subject`, superseding any
    /// evaluation still pending for the same subject.
    ///
    /// Must be called inside a Tokio runtime when a lookup is actually needed.
    pub fn run_rule(&mut self, subject: StablePath, value: &str, rule: Arc<dyn AsyncRule>) -> Dispatch {
        if let Some((generation, pending)) = self.in_flight.get(&subject) {
            if pending == value {
                return Dispatch::Pending(*generation);
            }
        }
        if let Some((settled, error)) = self.settled.get(&subject) {
            let inconclusive = error.as_ref().is_some_and(|e| e.kind == ErrorKind::LookupError);
            if settled == value && !inconclusive {
                return Dispatch::Settled(error.clone());
            }
        }

        let generation = self.bump(&subject);
        self.in_flight.remove(&subject);
        self.settled.remove(&subject);

        if value.trim().is_empty() {
            let error = Some(FieldError::schema(rule.empty_message()));
            self.settled.insert(subject, (value.to_string(), error.clone()));
            return Dispatch::Settled(error);
        }

        tracing::debug!("Dispatching {} for {} (generation {})", rule.name(), subject, generation);
        self.in_flight.insert(subject.clone(), (generation, value.to_string()));

        let tx = self.tx.clone();
        let value = value.to_string();
        tokio::spawn(async move {
            let error = match rule.check(&value).await {
                Ok(None) => None,
                Ok(Some(message)) => Some(FieldError::async_failure(message)),
                Err(e) => {
                    tracing::warn!("{} lookup failed for {}: {}", rule.name(), subject, e);
                    Some(FieldError::lookup(rule.inconclusive_message()))
                }
            };
            // Receiver gone means the form was dropped; nothing to report to
            let _ = tx.send(RuleOutcome {
                subject,
                generation,
                error,
            });
        });

        Dispatch::Pending(generation)
    }

    /// Forget the subject's pending evaluation and any settled answer
    pub fn cancel(&mut self, subject: &StablePath) -> bool {
        let was_pending = self.in_flight.remove(subject).is_some();
        self.settled.remove(subject);
        if was_pending {
            self.bump(subject);
            tracing::debug!("Cancelled pending evaluation for {}", subject);
        }
        was_pending
    }

    /// Supersede pending evaluations at, above, or below a path that was just written.
    /// Settled answers stay cached by value. Returns how many were pending.
    pub fn cancel_related(&mut self, path: &StablePath) -> usize {
        let stale: Vec<StablePath> = self
            .in_flight
            .keys()
            .filter(|subject| subject.is_related(path))
            .cloned()
            .collect();
        for subject in &stale {
            self.in_flight.remove(subject);
            self.bump(subject);
            tracing::debug!("Superseded pending evaluation for {}", subject);
        }
        stale.len()
    }

    /// Cancel every subject under a removed array entry. Returns how many were pending.
    pub fn cancel_entry(&mut self, key: EntryKey) -> usize {
        let pending = self
            .in_flight
            .keys()
            .filter(|subject| subject.passes_through(key))
            .count();
        self.in_flight.retain(|subject, _| !subject.passes_through(key));
        self.settled.retain(|subject, _| !subject.passes_through(key));
        self.generations.retain(|subject, _| !subject.passes_through(key));
        pending
    }

    pub fn is_pending(&self, subject: &StablePath) -> bool {
        self.in_flight.contains_key(subject)
    }

    pub fn pending_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Accept an outcome if it is from the generation still in flight
    fn accept(&mut self, outcome: RuleOutcome) -> Option<RuleOutcome> {
        match self.in_flight.get(&outcome.subject) {
            Some((generation, _)) if *generation == outcome.generation => {
                if let Some((_, value)) = self.in_flight.remove(&outcome.subject) {
                    self.settled
                        .insert(outcome.subject.clone(), (value, outcome.error.clone()));
                }
                Some(outcome)
            }
            _ => {
                tracing::debug!(
                    "Dropping stale result for {} (generation {})",
                    outcome.subject,
                    outcome.generation
                );
                None
            }
        }
    }

    /// Accepted outcomes that have already arrived, without waiting
    pub fn drain_ready(&mut self) -> Vec<RuleOutcome> {
        let mut ready = Vec::new();
        while let Ok(outcome) = self.rx.try_recv() {
            if let Some(accepted) = self.accept(outcome) {
                ready.push(accepted);
            }
        }
        ready
    }

    /// Wait for the next current outcome. `None` once nothing is pending.
    pub async fn next_settled(&mut self) -> Option<RuleOutcome> {
        while !self.in_flight.is_empty() {
            let outcome = self.rx.recv().await?;
            if let Some(accepted) = self.accept(outcome) {
                return Some(accepted);
            }
        }
        None
    }
}
