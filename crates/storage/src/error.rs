//! Storage-layer errors, converted into `DomainError` at the boundary.

use accord_domain::DomainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection error: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),

    #[error("Query error: {0}")]
    Query(#[source] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),
}

impl From<StorageError> for DomainError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Query(sqlx::Error::RowNotFound) => DomainError::not_found("row", "<unknown>"),
            other => DomainError::transient(other),
        }
    }
}
