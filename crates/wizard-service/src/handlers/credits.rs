//! Credit balance handlers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use wizard_core::{ConsumptionRecord, CreditBalance};

use crate::auth::{AuthUser, CronAuth};
use crate::error::ApiError;
use crate::state::AppState;

/// Default number of history records returned.
const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Maximum number of history records returned.
const MAX_HISTORY_LIMIT: usize = 100;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Credits left.
    pub credits_remaining: i32,
    /// Credit ceiling.
    pub max_credits: i32,
}

impl From<CreditBalance> for BalanceResponse {
    fn from(balance: CreditBalance) -> Self {
        Self {
            credits_remaining: balance.current,
            max_credits: balance.max,
        }
    }
}

/// Get the current credit balance.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.ledger.get_balance(auth.account_id).await?;
    Ok(Json(balance.into()))
}

/// Use-credits request. An empty body spends one credit.
#[derive(Debug, Default, Deserialize)]
pub struct UseCreditsRequest {
    /// Credits to spend (default: 1).
    #[serde(default)]
    pub amount: Option<i64>,
}

/// Use-credits response.
#[derive(Debug, Serialize)]
pub struct UseCreditsResponse {
    /// Always true; failures are error responses.
    pub success: bool,
    /// Credits left after the deduction.
    pub credits_remaining: i32,
    /// Credit ceiling.
    pub max_credits: i32,
}

/// Spend credits.
pub async fn use_credits(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    body: Bytes,
) -> Result<Json<UseCreditsResponse>, ApiError> {
    let req: UseCreditsRequest = if body.iter().all(u8::is_ascii_whitespace) {
        UseCreditsRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))?
    };

    let requested = req.amount.unwrap_or(1);
    let amount = i32::try_from(requested)
        .map_err(|_| ApiError::BadRequest(format!("amount out of range: {requested}")))?;

    let balance = state.ledger.consume(auth.account_id, amount).await?;

    Ok(Json(UseCreditsResponse {
        success: true,
        credits_remaining: balance.current,
        max_credits: balance.max,
    }))
}

/// History query parameters.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Maximum number of records to return (default: 20, max: 100).
    #[serde(default)]
    pub limit: Option<usize>,
}

/// One consumption record.
#[derive(Debug, Serialize)]
pub struct RecordResponse {
    /// Record ID.
    pub id: String,
    /// Credits spent.
    pub amount: i32,
    /// Balance before.
    pub balance_before: i32,
    /// Balance after.
    pub balance_after: i32,
    /// Timestamp.
    pub created_at: String,
}

impl From<&ConsumptionRecord> for RecordResponse {
    fn from(record: &ConsumptionRecord) -> Self {
        Self {
            id: record.id.to_string(),
            amount: record.amount,
            balance_before: record.balance_before,
            balance_after: record.balance_after,
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

/// History response.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// Records (newest first).
    pub records: Vec<RecordResponse>,
}

/// List recent consumption records.
pub async fn history(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    let records = state.ledger.history(auth.account_id, limit).await?;

    Ok(Json(HistoryResponse {
        records: records.iter().map(RecordResponse::from).collect(),
    }))
}

/// Reset response.
#[derive(Debug, Serialize)]
pub struct ResetResponse {
    /// Always true; failures are error responses.
    pub success: bool,
    /// Number of balances reset.
    pub reset: u64,
    /// When the reset ran.
    pub timestamp: String,
}

/// Restore every balance to its maximum. Called by the scheduler.
pub async fn reset_credits(
    State(state): State<Arc<AppState>>,
    _cron: CronAuth,
) -> Result<Json<ResetResponse>, ApiError> {
    let reset = state.ledger.reset_all().await?;

    Ok(Json(ResetResponse {
        success: true,
        reset,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}
