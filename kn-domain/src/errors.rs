//! Domain-level error kinds.
//!
//! Errors travel as data, never as exceptions across the worker boundary
//! (§5, §7): the storage engine, the façade, and the models all resolve to
//! this one enum so a completion message can carry a `DomainError` directly.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Value violates a domain constraint (name length, uniqueness, cycle).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Identifier does not resolve. Expected for probing finds; for updates
    /// it signals the cache has desynchronized from storage.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unique-constraint violation at the storage layer.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Operation forbidden by notebook/linked-notebook restrictions.
    #[error("restriction violation: {0}")]
    RestrictionViolation(String),

    /// I/O or SQL error.
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// Broken invariant (missing parent pointer, lost projection). Never
    /// silently swallowed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DomainError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, DomainError::Conflict(_))
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_not_found_matches_only_not_found() {
        assert!(DomainError::NotFound("x".into()).is_not_found());
        assert!(!DomainError::Conflict("x".into()).is_not_found());
    }
}
