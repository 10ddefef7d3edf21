//! Identifier types for the credit ledger.
//!
//! Every account has exactly one canonical [`AccountId`]. Identity providers
//! hand out their own subject strings ([`ExternalId`]); those are only ever
//! used as a lookup key to find the canonical id and are never passed further
//! down the stack.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, OnceLock};
use ulid::{Generator, Ulid};

/// Maximum accepted length of an external identity subject.
pub const MAX_EXTERNAL_ID_LEN: usize = 255;

/// The canonical, internally issued account identifier.
///
/// Always strictly positive. The only way to obtain one is through
/// [`AccountId::new`] (or parsing/deserialization, which go through it), so a
/// value of this type is structurally valid by construction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct AccountId(i64);

impl AccountId {
    /// Create an account identifier from its raw database value.
    ///
    /// # Errors
    ///
    /// Returns `IdError::NonPositive` if `raw` is zero or negative.
    pub const fn new(raw: i64) -> Result<Self, IdError> {
        if raw <= 0 {
            return Err(IdError::NonPositive(raw));
        }
        Ok(Self(raw))
    }

    /// Return the raw database value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl FromStr for AccountId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim().parse::<i64>().map_err(|_| IdError::NotNumeric)?;
        Self::new(raw)
    }
}

impl TryFrom<i64> for AccountId {
    type Error = IdError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AccountId> for i64 {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.0)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stable subject issued by an external identity provider (e.g. a Google
/// account id).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExternalId(String);

impl ExternalId {
    /// Validate and wrap an external subject.
    ///
    /// Surrounding whitespace is trimmed.
    ///
    /// # Errors
    ///
    /// Returns an error if the subject is empty or longer than
    /// [`MAX_EXTERNAL_ID_LEN`].
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(IdError::EmptyExternalId);
        }
        if trimmed.len() > MAX_EXTERNAL_ID_LEN {
            return Err(IdError::ExternalIdTooLong(trimmed.len()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Borrow the subject as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ExternalId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ExternalId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ExternalId> for String {
    fn from(id: ExternalId) -> Self {
        id.0
    }
}

impl fmt::Debug for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExternalId({})", self.0)
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A consumption record identifier using ULID for time-ordering.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId(Ulid);

impl RecordId {
    /// Generate a new `RecordId` with the current timestamp.
    ///
    /// Ids are monotonic within the process, including ids generated in the
    /// same millisecond.
    #[must_use]
    pub fn generate() -> Self {
        static GENERATOR: OnceLock<Mutex<Generator>> = OnceLock::new();

        let ulid = GENERATOR
            .get_or_init(|| Mutex::new(Generator::new()))
            .lock()
            .ok()
            .and_then(|mut generator| generator.generate().ok())
            .unwrap_or_else(Ulid::new);
        Self(ulid)
    }

    /// Return the underlying ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> &Ulid {
        &self.0
    }
}

impl FromStr for RecordId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ulid = Ulid::from_string(s).map_err(|_| IdError::InvalidUlid)?;
        Ok(Self(ulid))
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for RecordId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.0.to_string()
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// Account ids are strictly positive.
    #[error("account id must be positive, got {0}")]
    NonPositive(i64),

    /// The input is not a decimal integer.
    #[error("account id is not numeric")]
    NotNumeric,

    /// The external subject is blank.
    #[error("external id is empty")]
    EmptyExternalId,

    /// The external subject exceeds the maximum length.
    #[error("external id is too long ({0} bytes)")]
    ExternalIdTooLong(usize),

    /// The input is not a valid ULID.
    #[error("invalid ULID format")]
    InvalidUlid,
}
