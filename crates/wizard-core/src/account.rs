//! Account types.
//!
//! An account is created the first time the identity gateway syncs a user and
//! is mutated by profile edits. Accounts are never hard-deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, ExternalId};

/// Maximum accepted length of a display name.
pub const MAX_NAME_LEN: usize = 255;

/// Maximum accepted length of an email address.
pub const MAX_EMAIL_LEN: usize = 255;

/// Maximum accepted length of an avatar reference.
pub const MAX_AVATAR_LEN: usize = 2000;

/// An end-user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Canonical account id.
    pub id: AccountId,

    /// Subject from the identity provider this account is linked to.
    pub external_id: ExternalId,

    /// Display name.
    pub name: Option<String>,

    /// Email address, unique across accounts when present.
    pub email: Option<String>,

    /// Avatar reference (URL).
    pub avatar_url: Option<String>,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Profile data pushed by the identity gateway on every sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProfile {
    /// Stable subject from the identity provider.
    pub external_id: ExternalId,
    /// Display name.
    pub name: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Avatar reference.
    pub avatar_url: Option<String>,
}

impl IdentityProfile {
    /// Normalize and validate the profile fields.
    ///
    /// Blank strings become `None`; emails are lower-cased.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError` if a field is too long or the email is malformed.
    pub fn normalized(self) -> Result<Self, ProfileError> {
        Ok(Self {
            external_id: self.external_id,
            name: normalize_name(self.name)?,
            email: normalize_email(self.email)?,
            avatar_url: normalize_avatar(self.avatar_url)?,
        })
    }
}

/// A user-initiated profile edit. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    /// New display name.
    pub name: Option<String>,
    /// New email address.
    pub email: Option<String>,
    /// New avatar reference.
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    /// Whether the update changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.avatar_url.is_none()
    }

    /// Normalize and validate the edited fields.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError` if a field is too long or the email is malformed.
    pub fn normalized(self) -> Result<Self, ProfileError> {
        Ok(Self {
            name: normalize_name(self.name)?,
            email: normalize_email(self.email)?,
            avatar_url: normalize_avatar(self.avatar_url)?,
        })
    }
}

/// Profile validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    /// A field exceeds its maximum length.
    #[error("{field} is too long (max {max} characters)")]
    TooLong {
        /// Offending field.
        field: &'static str,
        /// Maximum length.
        max: usize,
    },

    /// The email address is not plausibly valid.
    #[error("invalid email address")]
    InvalidEmail,
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn check_len(value: &str, field: &'static str, max: usize) -> Result<(), ProfileError> {
    if value.chars().count() > max {
        return Err(ProfileError::TooLong { field, max });
    }
    Ok(())
}

fn normalize_name(name: Option<String>) -> Result<Option<String>, ProfileError> {
    let name = blank_to_none(name);
    if let Some(n) = &name {
        check_len(n, "name", MAX_NAME_LEN)?;
    }
    Ok(name)
}

fn normalize_avatar(avatar: Option<String>) -> Result<Option<String>, ProfileError> {
    let avatar = blank_to_none(avatar);
    if let Some(a) = &avatar {
        check_len(a, "avatar", MAX_AVATAR_LEN)?;
    }
    Ok(avatar)
}

fn normalize_email(email: Option<String>) -> Result<Option<String>, ProfileError> {
    let Some(email) = blank_to_none(email) else {
        return Ok(None);
    };
    check_len(&email, "email", MAX_EMAIL_LEN)?;

    let (local, domain) = email.split_once('@').ok_or(ProfileError::InvalidEmail)?;
    let plausible = !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace);
    if !plausible {
        return Err(ProfileError::InvalidEmail);
    }

    Ok(Some(email.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(email: Option<&str>) -> IdentityProfile {
        IdentityProfile {
            external_id: ExternalId::new("google-123").unwrap(),
            name: Some("  Ada  ".into()),
            email: email.map(Into::into),
            avatar_url: Some(String::new()),
        }
    }

    #[test]
    fn identity_profile_normalizes_blanks() {
        let p = profile(Some("Ada@Example.COM")).normalized().unwrap();
        assert_eq!(p.name.as_deref(), Some("Ada"));
        assert_eq!(p.email.as_deref(), Some("ada@example.com"));
        assert_eq!(p.avatar_url, None);
    }

    #[test]
    fn rejects_malformed_emails() {
        for bad in ["no-at-sign", "@example.com", "a@b", "a@.com", "a@b.", "a b@c.com", "a@b@c.com"] {
            assert_eq!(
                profile(Some(bad)).normalized(),
                Err(ProfileError::InvalidEmail),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_long_names() {
        let update = ProfileUpdate {
            name: Some("n".repeat(MAX_NAME_LEN + 1)),
            ..ProfileUpdate::default()
        };
        assert_eq!(
            update.normalized(),
            Err(ProfileError::TooLong {
                field: "name",
                max: MAX_NAME_LEN
            })
        );
    }

    #[test]
    fn empty_update() {
        assert!(ProfileUpdate::default().is_empty());
        assert!(!ProfileUpdate {
            email: Some("a@b.co".into()),
            ..ProfileUpdate::default()
        }
        .is_empty());
    }
}
