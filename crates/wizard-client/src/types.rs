//! Request and response types for the wizard API.

use serde::{Deserialize, Serialize};
use wizard_core::CreditBalance;

/// Balance response from `GET /v1/credits`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceResponse {
    /// Credits left.
    pub credits_remaining: i32,
    /// Credit ceiling.
    pub max_credits: i32,
}

impl From<BalanceResponse> for CreditBalance {
    fn from(response: BalanceResponse) -> Self {
        Self {
            current: response.credits_remaining,
            max: response.max_credits,
        }
    }
}

/// Request for `POST /v1/credits/use`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct UseCreditsRequest {
    pub amount: i32,
}

/// Response from `POST /v1/credits/use`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct UseCreditsResponse {
    pub credits_remaining: i32,
    pub max_credits: i32,
}

/// Request for `POST /v1/generate`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerateRequest {
    /// Kind of section (e.g. "hero banner").
    pub section_type: String,
    /// Free-form requirements.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<String>,
    /// Descriptions of reference images.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub image_descriptions: Vec<String>,
}

impl GenerateRequest {
    /// Create a request for a section type.
    #[must_use]
    pub fn new(section_type: impl Into<String>) -> Self {
        Self {
            section_type: section_type.into(),
            ..Self::default()
        }
    }

    /// Set the requirements.
    #[must_use]
    pub fn with_requirements(mut self, requirements: impl Into<String>) -> Self {
        self.requirements = Some(requirements.into());
        self
    }
}

/// Response from `POST /v1/generate`.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    /// Generated section code.
    pub code: String,
    /// Credits left after the charge.
    pub credits_remaining: i32,
    /// Credit ceiling.
    pub max_credits: i32,
}

/// The signed-in user's profile.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    /// Canonical account id.
    pub id: i64,
    /// Display name.
    pub name: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Avatar URL.
    pub image: Option<String>,
    /// Created timestamp (RFC 3339).
    pub created_at: String,
}

/// One consumption record.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryRecord {
    /// Record ID.
    pub id: String,
    /// Credits spent.
    pub amount: i32,
    /// Balance before.
    pub balance_before: i32,
    /// Balance after.
    pub balance_after: i32,
    /// Timestamp (RFC 3339).
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct HistoryResponse {
    pub records: Vec<HistoryRecord>,
}

/// API error response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

/// API error body.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}
