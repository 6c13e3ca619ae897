//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic business failure raised by aggregates and domain services.
///
/// Permission checks happen before a command reaches an aggregate, and
/// storage failures are modelled in the infra crate, so neither shows up here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input (empty name, bad email, negative quantity...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A state rule was broken (editing an approved order, writing to a deleted record).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A command addressed a record that was never created. Carries the record kind.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Duplicate creation or stale version.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(kind: &'static str) -> Self {
        Self::NotFound(kind)
    }

    /// Every aggregate runs this guard before mutating a soft-deleted record.
    pub fn deleted(kind: &str) -> Self {
        Self::InvariantViolation(format!("{kind} is deleted"))
    }

    /// Errors caused by the caller's input rather than the record's state.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidId(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_record_kind() {
        assert_eq!(DomainError::not_found("lead").to_string(), "lead not found");
        assert_eq!(
            DomainError::deleted("purchase order").to_string(),
            "invariant violated: purchase order is deleted"
        );
    }

    #[test]
    fn input_errors_are_told_apart_from_state_errors() {
        assert!(DomainError::validation("name is required").is_input_error());
        assert!(DomainError::invalid_id("bad uuid").is_input_error());
        assert!(!DomainError::invariant("already converted").is_input_error());
        assert!(!DomainError::not_found("company").is_input_error());
    }
}
