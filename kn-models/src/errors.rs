//! Errors raised while mutating an in-memory model.

use kn_domain::ids::LocalId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("item {0} not found in model")]
    ItemNotFound(LocalId),

    #[error("name {0:?} is already in use")]
    DuplicateName(String),

    #[error("assigning parent would create a cycle")]
    CycleDetected,

    #[error("item {0} cannot be removed because it has children")]
    HasChildren(LocalId),

    #[error("item {0} is still being created and cannot be updated yet")]
    ItemNotYetInStorage(LocalId),

    #[error("underlying domain error: {0}")]
    Domain(#[from] kn_domain::DomainError),
}

pub type ModelResult<T> = Result<T, ModelError>;
