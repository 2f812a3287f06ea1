//! Ledger error model (what callers of the store and services see).
//!
//! Domain errors and storage errors are folded into one taxonomy so the HTTP
//! layer and the settlement loop only deal with a handful of outcomes.

use thiserror::Error;

use stockledger_core::DomainError;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Missing or malformed input. No state was changed.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    /// The target warehouse position has no free slot.
    #[error("warehouse position '{position}' is full")]
    CapacityExceeded { position: String },

    /// A concurrent writer won the race; the caller may retry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Anything else. Details are logged, never shown to clients.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn capacity_exceeded(position: impl Into<String>) -> Self {
        Self::CapacityExceeded {
            position: position.into(),
        }
    }

    /// Stable machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "validation_error",
            LedgerError::NotFound(_) => "not_found",
            LedgerError::CapacityExceeded { .. } => "capacity_exceeded",
            LedgerError::Conflict(_) => "conflict",
            LedgerError::Internal(_) => "internal_error",
        }
    }
}

impl From<DomainError> for LedgerError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => LedgerError::Validation(msg),
            DomainError::InvalidId(msg) => LedgerError::Validation(format!("invalid identifier: {msg}")),
            DomainError::InvariantViolation(msg) => LedgerError::Validation(msg),
            DomainError::NotFound(what) => LedgerError::NotFound(what),
            DomainError::CapacityExceeded { position } => LedgerError::CapacityExceeded { position },
            DomainError::Conflict(msg) => LedgerError::Conflict(msg),
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        map_sqlx_error("query", err)
    }
}

/// Map a sqlx failure onto the ledger taxonomy.
///
/// | code    | meaning               | maps to    |
/// |---------|-----------------------|------------|
/// | `23505` | unique violation      | `Conflict` |
/// | `40001` | serialization failure | `Conflict` |
/// | `40P01` | deadlock detected     | `Conflict` |
/// | `23514` | check violation       | `Validation` |
/// | other   |                       | `Internal` |
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("40001") | Some("40P01") => LedgerError::Conflict(msg),
                Some("23514") => LedgerError::Validation(msg),
                _ => LedgerError::Internal(msg),
            }
        }
        sqlx::Error::RowNotFound => LedgerError::NotFound(format!("row in {operation}")),
        sqlx::Error::PoolClosed => {
            LedgerError::Internal(format!("connection pool closed in {operation}"))
        }
        other => LedgerError::Internal(format!("sqlx error in {operation}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_keep_their_category() {
        let err: LedgerError = DomainError::capacity_exceeded("B-02").into();
        assert_eq!(err, LedgerError::capacity_exceeded("B-02"));
        assert_eq!(err.code(), "capacity_exceeded");

        let err: LedgerError = DomainError::invariant("bad status").into();
        assert!(matches!(err, LedgerError::Validation(_)));

        let err: LedgerError = DomainError::conflict("stale").into();
        assert!(matches!(err, LedgerError::Conflict(_)));
    }

    #[test]
    fn capacity_message_names_the_position() {
        let err = LedgerError::capacity_exceeded("A-01");
        assert_eq!(err.to_string(), "warehouse position 'A-01' is full");
    }

    #[test]
    fn pool_closed_is_internal() {
        assert!(matches!(
            map_sqlx_error("begin", sqlx::Error::PoolClosed),
            LedgerError::Internal(_)
        ));
    }
}
