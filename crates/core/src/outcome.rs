//! Best-effort outcome ledger.
//!
//! Settings updates, secret-store writes and probe cleanup are allowed to
//! fail without stopping a phase. Instead of silently dropping those errors,
//! each phase records them in a [`Warnings`] ledger that ends up in its
//! report, so "continue anyway" is something callers and tests can inspect.

use std::fmt::Display;

/// A best-effort step that failed without aborting its phase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Warning {
    /// Short machine-readable step name (e.g. `settings.update`).
    pub step: &'static str,
    /// Human-readable failure description.
    pub message: String,
}

/// Ordered collection of warnings produced by one phase.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Warnings(Vec<Warning>);

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log and record a failed best-effort step.
    pub fn record(&mut self, step: &'static str, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(step, error = %message, "Best-effort step failed, continuing");
        self.0.push(Warning { step, message });
    }

    /// Keep the value of a successful step, or record the error and return `None`.
    pub fn absorb<T, E: Display>(&mut self, step: &'static str, result: Result<T, E>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.record(step, err.to_string());
                None
            }
        }
    }

    /// Append every warning of another ledger.
    pub fn extend(&mut self, other: Warnings) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Warning> {
        self.0.iter()
    }

    /// Whether any recorded warning belongs to `step`.
    pub fn contains(&self, step: &str) -> bool {
        self.0.iter().any(|w| w.step == step)
    }
}
