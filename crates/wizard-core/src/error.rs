//! Error types for ledger operations.

use crate::ids::IdError;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors surfaced by the credit ledger.
///
/// A provisioning race is not part of this taxonomy: it is resolved inside
/// the ledger by re-reading the row and never reaches the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Malformed or unknown account identifier.
    #[error("invalid account: {0}")]
    InvalidAccount(String),

    /// The requested amount is not a positive integer.
    #[error("invalid amount: {0}")]
    InvalidAmount(i64),

    /// The balance is below the requested amount. Nothing was changed.
    #[error("insufficient credit: current={current}, required={required}")]
    InsufficientCredit {
        /// Balance at the time of the attempt.
        current: i32,
        /// Requested amount.
        required: i32,
    },

    /// The datastore could not be reached, failed, or did not answer in time.
    #[error("datastore unavailable: {0}")]
    DatastoreUnavailable(String),
}

impl LedgerError {
    /// Whether the caller may retry the operation later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::DatastoreUnavailable(_))
    }
}

impl From<IdError> for LedgerError {
    fn from(err: IdError) -> Self {
        Self::InvalidAccount(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_datastore_failures_are_transient() {
        assert!(LedgerError::DatastoreUnavailable("down".into()).is_transient());
        assert!(!LedgerError::InsufficientCredit {
            current: 0,
            required: 1
        }
        .is_transient());
        assert!(!LedgerError::InvalidAmount(0).is_transient());
    }

    #[test]
    fn id_errors_become_invalid_account() {
        let err: LedgerError = IdError::NonPositive(0).into();
        assert!(matches!(err, LedgerError::InvalidAccount(_)));
    }
}
