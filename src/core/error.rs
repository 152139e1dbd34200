use std::collections::BTreeMap;

use thiserror::Error;

/// Errors raised by rent calculation, invoicing and the Laske integration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BillingError {
    /// Request input failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced entity does not exist (or is soft-deleted).
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// The entity is not in a state that allows the operation.
    #[error("precondition failed: {0}")]
    State(String),

    /// Share sums, credit remainders and similar arithmetic constraints.
    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    /// Inverted ranges or impossible calendar dates.
    #[error("date argument invalid: {0}")]
    InvalidDate(String),

    /// A Laske document field failed length, presence or check-digit rules.
    #[error("codec validation failed: {0}")]
    Codec(String),

    /// XML generation error.
    #[error("XML error: {0}")]
    Xml(String),

    /// SSH, SFTP or FTP failure, or a missing host key.
    #[error("transport error: {0}")]
    Transport(String),

    /// The payment or invoice already exists.
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Invoice number sequencing error.
    #[error("numbering error: {0}")]
    Numbering(String),

    /// Missing or malformed settings.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BillingError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "input-validation",
            Self::NotFound { .. } => "not-found",
            Self::State(_) => "state-precondition",
            Self::Arithmetic(_) => "domain-arithmetic",
            Self::InvalidDate(_) => "date-argument-invalid",
            Self::Codec(_) | Self::Xml(_) => "codec-validation",
            Self::Transport(_) => "transport",
            Self::Duplicate(_) => "duplicate",
            Self::Numbering(_) => "numbering",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }
}

/// A single validation error with field path and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dot-separated path to the invalid field (e.g. "SalesOrder.OrderParty.PriorityName1").
    pub field: String,
    /// Human-readable error description.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Group validation errors by field, preserving message order.
pub fn errors_by_field(errors: &[ValidationError]) -> BTreeMap<String, Vec<String>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for error in errors {
        grouped
            .entry(error.field.clone())
            .or_default()
            .push(error.message.clone());
    }
    grouped
}

/// Collapse a list of validation errors into a single `Validation` error.
pub fn into_validation_error(errors: Vec<ValidationError>) -> Result<(), BillingError> {
    if errors.is_empty() {
        return Ok(());
    }
    let joined = errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    Err(BillingError::Validation(joined))
}
