//! Error kinds raised by the SQL engine and the façade.

use kn_domain::DomainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("attribute blob codec error: {0}")]
    Codec(#[from] kn_domain::CodecError),

    #[error("malformed stored JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("malformed identifier: {0}")]
    MalformedId(String),

    #[error("{0}")]
    Domain(#[from] DomainError),
}

impl StorageError {
    pub fn not_found(what: impl Into<String>) -> Self {
        StorageError::Domain(DomainError::NotFound(what.into()))
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        StorageError::Domain(DomainError::Conflict(what.into()))
    }

    pub fn restriction(what: impl Into<String>) -> Self {
        StorageError::Domain(DomainError::RestrictionViolation(what.into()))
    }
}

/// Collapses every failure mode into the shared `DomainError` taxonomy
/// (§7) so callers outside this crate never match on `sqlx::Error`.
impl From<StorageError> for DomainError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Domain(inner) => inner,
            StorageError::Database(sqlx::Error::RowNotFound) => {
                DomainError::NotFound("row not found".to_string())
            }
            StorageError::Database(e) if is_unique_violation(&e) => {
                DomainError::Conflict(e.to_string())
            }
            other => DomainError::StorageFailure(other.to_string()),
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.kind() == sqlx::error::ErrorKind::UniqueViolation,
        _ => false,
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
