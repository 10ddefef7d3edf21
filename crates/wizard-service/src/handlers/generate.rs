//! Section generation handler.
//!
//! One generation costs one credit. The balance is checked before the model
//! call so an empty account fails fast, but the credit is only taken after the
//! code exists, and the code is only returned if taking the credit succeeded.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::generator::{GenerationRequest, GeneratorError};
use crate::state::AppState;

/// Credits charged per generated section.
pub const GENERATION_COST: i32 = 1;

const MAX_SECTION_TYPE_LEN: usize = 100;
const MAX_REQUIREMENTS_LEN: usize = 10_000;
const MAX_IMAGE_DESCRIPTIONS: usize = 10;

/// Generate request.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    /// Kind of section.
    pub section_type: String,
    /// Free-form requirements.
    #[serde(default)]
    pub requirements: Option<String>,
    /// Descriptions of reference images.
    #[serde(default)]
    pub image_descriptions: Vec<String>,
}

impl GenerateRequest {
    fn validate(self) -> Result<GenerationRequest, ApiError> {
        let section_type = self.section_type.trim().to_string();
        if section_type.is_empty() {
            return Err(ApiError::BadRequest("section_type is required".into()));
        }
        if section_type.chars().count() > MAX_SECTION_TYPE_LEN {
            return Err(ApiError::BadRequest(format!(
                "section_type is too long (max {MAX_SECTION_TYPE_LEN} characters)"
            )));
        }

        let requirements = self.requirements.unwrap_or_default();
        if requirements.chars().count() > MAX_REQUIREMENTS_LEN {
            return Err(ApiError::BadRequest(format!(
                "requirements are too long (max {MAX_REQUIREMENTS_LEN} characters)"
            )));
        }
        if self.image_descriptions.len() > MAX_IMAGE_DESCRIPTIONS {
            return Err(ApiError::BadRequest(format!(
                "at most {MAX_IMAGE_DESCRIPTIONS} image descriptions are allowed"
            )));
        }

        Ok(GenerationRequest {
            section_type,
            requirements,
            image_descriptions: self
                .image_descriptions
                .into_iter()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect(),
        })
    }
}

/// Generate response.
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    /// Generated section code.
    pub code: String,
    /// Credits left after the charge.
    pub credits_remaining: i32,
    /// Credit ceiling.
    pub max_credits: i32,
}

/// Generate one section and charge for it.
pub async fn generate_section(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let request = req.validate()?;
    let generator = state
        .generator
        .clone()
        .ok_or(GeneratorError::NotConfigured)?;

    // Fresh read; never a cached value
    let balance = state.ledger.get_balance(auth.account_id).await?;
    if !balance.can_afford(GENERATION_COST) {
        return Err(ApiError::InsufficientCredits {
            current: balance.current,
            required: GENERATION_COST,
        });
    }

    let limit = state.config.generation_timeout();
    let code = tokio::time::timeout(limit, generator.generate(&request))
        .await
        .map_err(|_| GeneratorError::Timeout(limit.as_secs()))??;

    let balance = state
        .ledger
        .consume(auth.account_id, GENERATION_COST)
        .await
        .map_err(|e| {
            tracing::warn!(
                account_id = %auth.account_id,
                error = %e,
                "Discarding generated code: charge failed"
            );
            e
        })?;

    tracing::info!(
        account_id = %auth.account_id,
        section_type = %request.section_type,
        credits_remaining = balance.current,
        "Section generated"
    );

    Ok(Json(GenerateResponse {
        code,
        credits_remaining: balance.current,
        max_credits: balance.max,
    }))
}
