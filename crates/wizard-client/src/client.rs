//! Wizard HTTP client implementation.

use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use wizard_core::CreditBalance;

use crate::cache::BalanceCache;
use crate::error::ClientError;
use crate::types::{
    ApiErrorResponse, BalanceResponse, GenerateRequest, GenerateResponse, HistoryRecord,
    HistoryResponse, UseCreditsRequest, UseCreditsResponse, UserProfile,
};

/// Wizard API client for one signed-in user.
///
/// Clones share the balance cache.
#[derive(Clone)]
pub struct WizardClient {
    client: Client,
    base_url: String,
    session_token: String,
    cache: Arc<BalanceCache>,
}

impl std::fmt::Debug for WizardClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WizardClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl WizardClient {
    /// Create a new wizard client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the wizard service (e.g., `"https://wizard.example.com"`)
    /// * `session_token` - The user's session JWT
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        session_token: impl Into<String>,
    ) -> Result<Self, ClientError> {
        Self::with_options(base_url, session_token, ClientOptions::default())
    }

    /// Create a new wizard client with custom options.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_options(
        base_url: impl Into<String>,
        session_token: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let session_token = session_token.into();
        if session_token.trim().is_empty() {
            return Err(ClientError::Configuration(
                "session token must not be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session_token,
            cache: Arc::new(BalanceCache::new(options.balance_cache_ttl)),
        })
    }

    /// Current balance for display.
    ///
    /// Served from the cache while it is fresh. The value is advisory:
    /// spending always goes through [`use_credit`](Self::use_credit) or
    /// [`generate`](Self::generate), which the server checks.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn balance(&self) -> Result<CreditBalance, ClientError> {
        if let Some(balance) = self.cache.get().await {
            tracing::trace!(current = balance.current, "Balance served from cache");
            return Ok(balance);
        }
        self.refresh_balance().await
    }

    /// Fetch the balance from the server and refresh the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn refresh_balance(&self) -> Result<CreditBalance, ClientError> {
        let url = format!("{}/v1/credits", self.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.session_token)
            .send()
            .await?;

        let balance: CreditBalance = self
            .handle_response::<BalanceResponse>(response)
            .await?
            .into();
        self.cache.store(balance).await;
        Ok(balance)
    }

    /// Spend `amount` credits.
    ///
    /// Always sent to the server, whatever the cache says.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InsufficientCredit`] when the balance does not
    /// cover `amount` (nothing is spent), [`ClientError::Unavailable`] when
    /// the ledger cannot be reached, or another error if the request fails.
    pub async fn use_credit(&self, amount: i32) -> Result<CreditBalance, ClientError> {
        let url = format!("{}/v1/credits/use", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.session_token)
            .json(&UseCreditsRequest { amount })
            .send()
            .await?;

        let result = self.handle_response::<UseCreditsResponse>(response).await;
        self.settle(result.map(|r| CreditBalance {
            current: r.credits_remaining,
            max: r.max_credits,
        }))
        .await
    }

    /// Generate a section; costs one credit on success.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InsufficientCredit`] when the balance is empty,
    /// or another error if generation or the request fails.
    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, ClientError> {
        let url = format!("{}/v1/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.session_token)
            .json(request)
            .send()
            .await?;

        let result = self.handle_response::<GenerateResponse>(response).await;
        if let Ok(generated) = &result {
            self.cache
                .store(CreditBalance {
                    current: generated.credits_remaining,
                    max: generated.max_credits,
                })
                .await;
        } else {
            self.cache.invalidate().await;
        }
        result
    }

    /// Recent consumption records, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn history(&self, limit: u32) -> Result<Vec<HistoryRecord>, ClientError> {
        let url = format!("{}/v1/credits/history", self.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.session_token)
            .query(&[("limit", limit)])
            .send()
            .await?;

        let history: HistoryResponse = self.handle_response(response).await?;
        Ok(history.records)
    }

    /// The signed-in user's profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn profile(&self) -> Result<UserProfile, ClientError> {
        let url = format!("{}/v1/accounts/me", self.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.session_token)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Update the cache from a spend outcome.
    async fn settle(
        &self,
        result: Result<CreditBalance, ClientError>,
    ) -> Result<CreditBalance, ClientError> {
        match &result {
            Ok(balance) => self.cache.store(*balance).await,
            Err(_) => self.cache.invalidate().await,
        }
        result
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let error_body: Result<ApiErrorResponse, _> = response.json().await;

        match error_body {
            Ok(api_error) => {
                let code = api_error.error.code.as_str();
                let message = api_error.error.message;

                match code {
                    "insufficient_credits" => {
                        let detail = |key: &str| {
                            api_error
                                .error
                                .details
                                .as_ref()
                                .and_then(|d| d.get(key))
                                .and_then(serde_json::Value::as_i64)
                                .and_then(|v| i32::try_from(v).ok())
                                .unwrap_or(0)
                        };

                        Err(ClientError::InsufficientCredit {
                            current: detail("current"),
                            required: detail("required"),
                        })
                    }
                    "service_unavailable" => Err(ClientError::Unavailable { message }),
                    _ => Err(ClientError::Api {
                        code: code.to_string(),
                        message,
                        status: status.as_u16(),
                    }),
                }
            }
            Err(_) if status == reqwest::StatusCode::SERVICE_UNAVAILABLE => {
                Err(ClientError::Unavailable {
                    message: format!("HTTP {status}"),
                })
            }
            Err(_) => Err(ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            }),
        }
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 30).
    pub timeout_seconds: u64,
    /// How long a fetched balance is shown without refetching (default: 60s).
    pub balance_cache_ttl: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            balance_cache_ttl: Duration::from_secs(60),
        }
    }
}
