//! Account handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use wizard_core::{Account, ExternalId, IdentityProfile, ProfileUpdate};

use crate::auth::{AuthUser, ServiceAuth};
use crate::error::ApiError;
use crate::state::AppState;

/// Public view of an account.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    /// Canonical account id.
    pub id: i64,
    /// Display name.
    pub name: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Avatar URL.
    pub image: Option<String>,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&Account> for UserResponse {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.get(),
            name: account.name.clone(),
            email: account.email.clone(),
            image: account.avatar_url.clone(),
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

/// Identity gateway sync request.
#[derive(Debug, Deserialize)]
pub struct SyncAccountRequest {
    /// Stable subject from the identity provider.
    pub external_id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Email address.
    #[serde(default)]
    pub email: Option<String>,
    /// Avatar URL.
    #[serde(default)]
    pub image: Option<String>,
}

/// Identity gateway sync response.
#[derive(Debug, Serialize)]
pub struct SyncAccountResponse {
    /// Always "success".
    pub status: &'static str,
    /// The synced account.
    pub user: UserResponse,
    /// Credits left.
    pub credits_remaining: i32,
    /// Credit ceiling.
    pub max_credits: i32,
    /// Whether this sync created the account.
    pub is_new_user: bool,
}

/// Create or refresh the account behind an identity, and provision its
/// balance.
pub async fn sync_account(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
    Json(req): Json<SyncAccountRequest>,
) -> Result<Json<SyncAccountResponse>, ApiError> {
    let external_id =
        ExternalId::new(req.external_id).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let profile = IdentityProfile {
        external_id,
        name: req.name,
        email: req.email,
        avatar_url: req.image,
    }
    .normalized()?;

    let store = &state.store;
    let (account, is_new_user) = state
        .ledger
        .options()
        .retry
        .run("sync_identity", || store.sync_identity(&profile))
        .await?;

    let balance = state.ledger.get_balance(account.id).await?;

    tracing::info!(
        account_id = %account.id,
        subject = %account.external_id,
        is_new_user = is_new_user,
        service = %service.service_name,
        "Account synced"
    );

    Ok(Json(SyncAccountResponse {
        status: "success",
        user: UserResponse::from(&account),
        credits_remaining: balance.current,
        max_credits: balance.max,
        is_new_user,
    }))
}

/// Get the current user's profile.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<UserResponse>, ApiError> {
    let account = state
        .store
        .get_account(auth.account_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("account not found".into()))?;

    Ok(Json(UserResponse::from(&account)))
}

/// Profile edit request. Omitted fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct UpdateAccountRequest {
    /// New display name.
    #[serde(default)]
    pub name: Option<String>,
    /// New email address.
    #[serde(default)]
    pub email: Option<String>,
    /// New avatar URL.
    #[serde(default)]
    pub image: Option<String>,
}

/// Edit the current user's profile.
pub async fn update_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<UpdateAccountRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let update = ProfileUpdate {
        name: req.name,
        email: req.email,
        avatar_url: req.image,
    }
    .normalized()?;

    if update.is_empty() {
        return Err(ApiError::BadRequest("no profile fields to update".into()));
    }

    let account = state.store.update_profile(auth.account_id, &update).await?;

    tracing::info!(account_id = %account.id, "Profile updated");

    Ok(Json(UserResponse::from(&account)))
}
