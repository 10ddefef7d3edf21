//! Authentication extractors.
//!
//! This module provides extractors for:
//! - `AuthUser` - End-user authentication via the identity gateway's session JWT
//! - `ServiceAuth` - Identity gateway authentication via API key
//! - `CronAuth` - The scheduled reset job, via a bearer secret

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use wizard_core::{AccountId, ExternalId};

use crate::crypto::constant_time_eq;
use crate::error::ApiError;
use crate::state::AppState;

/// An authenticated end user.
///
/// The session token's subject is resolved to the canonical account id here,
/// once per request; handlers only ever see the [`AccountId`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The canonical account id.
    pub account_id: AccountId,
    /// The identity provider subject from the token.
    pub subject: ExternalId,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;

            let secret = state.config.session_secret.as_deref().ok_or_else(|| {
                tracing::warn!("SESSION_SECRET not configured; rejecting user request");
                ApiError::Unauthorized
            })?;

            let claims = validate_session(token, secret)?;
            let subject = ExternalId::new(claims.sub).map_err(|_| ApiError::Unauthorized)?;

            let store = &state.store;
            let account = state
                .ledger
                .options()
                .retry
                .run("find_account_by_external_id", || {
                    store.find_account_by_external_id(&subject)
                })
                .await?
                .ok_or_else(|| {
                    tracing::debug!(subject = %subject, "Session subject has no account");
                    ApiError::NotFound("account not found".into())
                })?;

            Ok(AuthUser {
                account_id: account.id,
                subject,
            })
        })
    }
}

/// Identity gateway authentication via API key.
///
/// Used by the gateway to push profiles after sign-in.
#[derive(Debug, Clone)]
pub struct ServiceAuth {
    /// The service name or identifier.
    pub service_name: String,
}

impl FromRequestParts<Arc<AppState>> for ServiceAuth {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let api_key = parts
                .headers
                .get("x-api-key")
                .and_then(|v| v.to_str().ok())
                .ok_or(ApiError::Unauthorized)?;

            let expected_key = state
                .config
                .identity_api_key
                .as_ref()
                .ok_or(ApiError::Unauthorized)?;

            if !constant_time_eq(api_key, expected_key) {
                return Err(ApiError::Unauthorized);
            }

            let service_name = parts
                .headers
                .get("x-service-name")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("identity-gateway")
                .to_string();

            Ok(ServiceAuth { service_name })
        })
    }
}

/// The scheduled reset job, authenticated with `Authorization: Bearer <CRON_SECRET>`.
#[derive(Debug, Clone, Copy)]
pub struct CronAuth;

impl FromRequestParts<Arc<AppState>> for CronAuth {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let Some(expected) = state.config.cron_secret.as_deref() else {
                tracing::warn!("CRON_SECRET not configured; credit reset is disabled");
                return Err(ApiError::Unauthorized);
            };

            let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;
            if !constant_time_eq(token, expected) {
                tracing::warn!("Rejected credit reset with invalid secret");
                return Err(ApiError::Unauthorized);
            }

            Ok(CronAuth)
        })
    }
}

/// Session token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (identity provider user id).
    pub sub: String,
    /// Expiration time.
    pub exp: i64,
    /// Issued at.
    #[serde(default)]
    pub iat: Option<i64>,
    /// Email, if the gateway includes it.
    #[serde(default)]
    pub email: Option<String>,
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Validate an HS256 session token and return its claims.
fn validate_session(token: &str, secret: &str) -> Result<SessionClaims, ApiError> {
    let mut validation = Validation::new(Algorithm::HS256);
    // Sessions are minted for this application only; no audience is set.
    validation.validate_aud = false;
    let key = DecodingKey::from_secret(secret.as_bytes());

    decode::<SessionClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!(error = %e, "Session token validation failed");
            ApiError::Unauthorized
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(sub: &str, exp_offset: i64, secret: &str) -> String {
        let claims = SessionClaims {
            sub: sub.into(),
            exp: chrono::Utc::now().timestamp() + exp_offset,
            iat: None,
            email: None,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_yields_subject() {
        let claims = validate_session(&token("google-1", 3600, "s3cret"), "s3cret").unwrap();
        assert_eq!(claims.sub, "google-1");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let result = validate_session(&token("google-1", 3600, "s3cret"), "other");
        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let result = validate_session(&token("google-1", -3600, "s3cret"), "s3cret");
        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            validate_session("not-a-jwt", "s3cret"),
            Err(ApiError::Unauthorized)
        ));
    }
}
