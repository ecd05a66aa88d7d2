//! Domain error types.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::order::PaymentTransitionError;

/// Field-level validation failures of a request, keyed by field path
/// (for example `items[0].quantity`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("Validation failed: {}", summary(.fields))]
pub struct ValidationErrors {
    fields: BTreeMap<String, String>,
}

fn summary(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(field, message)| format!("{field} {message}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an error for a single field.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    /// Records a failure; the first message recorded for a field wins.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Returns `Err(self)` if any failure was recorded.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

/// Errors raised by the pure order rules.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Payment(#[from] PaymentTransitionError),
}
