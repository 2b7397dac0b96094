//! Error types for the SQLite list engine

use tabula_core::error::{ConfigError, ListError, MutationError, RetrievalError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqliteError {
    #[error("SQLite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("DDL error: {0}")]
    DDL(String),

    #[error("SQL generation error: {0}")]
    SqlGeneration(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Task join error: {0}")]
    TaskJoin(String),

    /// A stored id, date or enum column did not decode
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A query returned a base row more than once
    #[error("Cardinality violation: {0}")]
    Cardinality(String),

    /// A domain rule rejected a write inside a transaction
    #[error(transparent)]
    Mutation(MutationError),
}

impl SqliteError {
    /// SQLITE_BUSY / SQLITE_LOCKED after the busy timeout expired
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SqliteError::Rusqlite(rusqlite::Error::SqliteFailure(e, _))
                if matches!(e.code, rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
        )
    }
}

impl<E: std::error::Error + 'static> From<bb8::RunError<E>> for SqliteError {
    fn from(err: bb8::RunError<E>) -> Self { SqliteError::Pool(err.to_string()) }
}

impl From<MutationError> for SqliteError {
    fn from(err: MutationError) -> Self { SqliteError::Mutation(err) }
}

impl From<SqliteError> for RetrievalError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::Corrupt(msg) => RetrievalError::Corrupt(msg),
            SqliteError::Rusqlite(err @ rusqlite::Error::FromSqlConversionFailure(..)) => RetrievalError::Corrupt(err.to_string()),
            err => RetrievalError::StorageError(Box::new(err)),
        }
    }
}

impl From<SqliteError> for MutationError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::Mutation(err) => err,
            err => MutationError::StorageError(Box::new(err)),
        }
    }
}

impl From<SqliteError> for ListError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::Cardinality(msg) => ListError::Cardinality(msg),
            SqliteError::Mutation(err) => ListError::Mutation(err),
            err => ListError::Retrieval(err.into()),
        }
    }
}
