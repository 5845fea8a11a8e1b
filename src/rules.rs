//! Rule declaration and evaluation.
//!
//! A rule has two halves:
//! - **Declaration**: its name, persisted in the tip record as [`RuleIdentity`]
//! - **Evaluation**: a predicate closure, supplied fresh by the caller on every
//!   registration because closures cannot be serialized
//!
//! The evaluator never lets a predicate fault escape. Errors and panics both
//! become [`RuleOutcome::Failed`].

use std::panic::{self, AssertUnwindSafe};

use crate::record::RuleIdentity;

type Predicate = dyn Fn() -> Result<bool, String> + Send + Sync;

/// A named predicate gating a tip's availability.
pub struct TipRule {
    name: String,
    predicate: Box<Predicate>,
}

impl std::fmt::Debug for TipRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TipRule").field("name", &self.name).finish()
    }
}

impl TipRule {
    /// Rule whose predicate cannot fail.
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Box::new(move || Ok(predicate())),
        }
    }

    /// Rule whose predicate may report an error.
    pub fn fallible<F, E>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn() -> Result<bool, E> + Send + Sync + 'static,
        E: std::fmt::Display,
    {
        Self {
            name: name.into(),
            predicate: Box::new(move || predicate().map_err(|e| e.to_string())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The persistable half of this rule.
    pub fn identity(&self) -> RuleIdentity {
        RuleIdentity::new(self.name.clone())
    }
}

/// Result of running one predicate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuleOutcome {
    Satisfied,
    Unsatisfied,
    /// The predicate returned an error or panicked.
    Failed(String),
}

/// Runs rule predicates in isolation from the engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleEvaluator;

impl RuleEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Invoke the predicate, converting errors and panics to `Failed`.
    pub fn evaluate(&self, rule: &TipRule) -> RuleOutcome {
        match panic::catch_unwind(AssertUnwindSafe(|| (rule.predicate)())) {
            Ok(Ok(true)) => RuleOutcome::Satisfied,
            Ok(Ok(false)) => RuleOutcome::Unsatisfied,
            Ok(Err(message)) => RuleOutcome::Failed(message),
            Err(payload) => RuleOutcome::Failed(panic_message(payload.as_ref())),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("predicate panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("predicate panicked: {}", s)
    } else {
        "predicate panicked".to_string()
    }
}
