//! Error types for storage operations.

use wizard_core::LedgerError;

use crate::schema::constraint;

/// SQLSTATE raised when `statement_timeout` cancels a statement.
const QUERY_CANCELED: &str = "57014";

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The datastore could not be reached (pool exhausted, connection or I/O
    /// failure). Safe to retry for idempotent operations.
    #[error("datastore unavailable: {0}")]
    Unavailable(String),

    /// Any other database failure.
    #[error("database error: {0}")]
    Database(String),

    /// A uniqueness constraint rejected the write.
    #[error("unique constraint violated: {constraint}")]
    Conflict {
        /// Name of the violated constraint.
        constraint: String,
    },

    /// A row references an account that does not exist.
    #[error("unknown account")]
    UnknownAccount,

    /// Record not found.
    #[error("not found")]
    NotFound,
}

impl StoreError {
    /// Whether a retry has a chance of succeeding.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Whether this is a uniqueness violation on the account email.
    #[must_use]
    pub fn is_email_conflict(&self) -> bool {
        matches!(self, Self::Conflict { constraint: c } if c == constraint::ACCOUNTS_EMAIL)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => Self::Unavailable(err.to_string()),
            sqlx::Error::Database(db) => {
                if db.code().as_deref() == Some(QUERY_CANCELED) {
                    // statement_timeout fired; the statement did not commit
                    Self::Unavailable(db.to_string())
                } else if db.is_unique_violation() {
                    Self::Conflict {
                        constraint: db.constraint().unwrap_or_default().to_string(),
                    }
                } else if db.is_foreign_key_violation() {
                    Self::UnknownAccount
                } else {
                    Self::Database(db.to_string())
                }
            }
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownAccount => Self::InvalidAccount("account does not exist".into()),
            other => Self::DatastoreUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeouts_are_transient() {
        let err = StoreError::from(sqlx::Error::PoolTimedOut);
        assert!(err.is_transient());
        assert!(!StoreError::from(sqlx::Error::RowNotFound).is_transient());
    }

    #[test]
    fn email_conflict_detection() {
        let email = StoreError::Conflict {
            constraint: constraint::ACCOUNTS_EMAIL.into(),
        };
        let pkey = StoreError::Conflict {
            constraint: constraint::CREDIT_BALANCES_PKEY.into(),
        };
        assert!(email.is_email_conflict());
        assert!(!pkey.is_email_conflict());
    }

    #[test]
    fn unknown_account_maps_to_invalid_account() {
        assert!(matches!(
            LedgerError::from(StoreError::UnknownAccount),
            LedgerError::InvalidAccount(_)
        ));
        assert!(LedgerError::from(StoreError::Unavailable("down".into())).is_transient());
    }
}
