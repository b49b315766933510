//! Error taxonomy for the persistence layer.
//!
//! Generic operations return these directly; callers decide whether a
//! `NotFound` or `StaleKey` is an error in their context.

use thiserror::Error;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    /// Read/update/destroy targeted a missing or soft-deleted identifier
    #[error("{table} '{id}' not found")]
    NotFound { table: &'static str, id: String },

    /// Uniqueness or foreign-key conflict at write time. Never retried.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Transport or connection failure
    #[error("store error: {0}")]
    Store(sqlx::Error),

    /// A time-bounded auxiliary record was used after expiry
    #[error("{table} '{id}' has expired")]
    StaleKey { table: &'static str, id: String },

    /// A stored value could not be mapped to its Rust type
    #[error("decode error: {0}")]
    Decode(String),

    /// A table descriptor was used in a way it does not support
    /// (unregistered table, no creation timestamp column, ...)
    #[error("invalid table definition: {0}")]
    Definition(String),
}

impl DbError {
    pub fn not_found(table: &'static str, id: impl ToString) -> Self {
        DbError::NotFound {
            table,
            id: id.to_string(),
        }
    }

    /// `StaleKey` is reported separately for observability only; callers
    /// treat it exactly like `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound { .. } | DbError::StaleKey { .. })
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err)
                if db_err.is_unique_violation()
                    || db_err.is_foreign_key_violation()
                    || db_err.is_check_violation() =>
            {
                DbError::ConstraintViolation(db_err.message().to_string())
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::Decode(format!("column {}: {}", index, source))
            }
            sqlx::Error::ColumnNotFound(column) => {
                DbError::Decode(format!("column {} missing from row", column))
            }
            _ => DbError::Store(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_key_counts_as_not_found() {
        let stale = DbError::StaleKey {
            table: "pending_activations",
            id: "abc".into(),
        };
        assert!(stale.is_not_found());
        assert!(DbError::not_found("performers", 1).is_not_found());
        assert!(!DbError::ConstraintViolation("x".into()).is_not_found());
    }

    #[test]
    fn pool_errors_are_store_errors() {
        let err: DbError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, DbError::Store(_)));
    }
}
