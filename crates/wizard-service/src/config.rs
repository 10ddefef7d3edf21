//! Service configuration.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use wizard_core::DEFAULT_GRANT;
use wizard_store::{LedgerOptions, PgStoreOptions, RetryPolicy};

/// Default Anthropic API base URL.
pub const DEFAULT_ANTHROPIC_API_URL: &str = "https://api.anthropic.com";

/// Default generation model.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";

/// Slack on top of the generate route's worst case (auth lookup, routing).
pub const REQUEST_TIMEOUT_HEADROOM_SECONDS: u64 = 10;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// PostgreSQL URL. Without it the service runs on the in-memory store.
    pub database_url: Option<String>,

    /// Connection pool size (default: 5).
    pub db_max_connections: u32,

    /// Pool acquire timeout in seconds (default: 10).
    pub db_acquire_timeout_seconds: u64,

    /// Credits granted to a newly provisioned balance (default: 3).
    pub default_credit_grant: i32,

    /// Bounded wait per ledger operation in seconds (default: 15).
    pub ledger_timeout_seconds: u64,

    /// Attempts for idempotent datastore calls (default: 3).
    pub ledger_retry_attempts: u32,

    /// HS256 secret used to verify session tokens.
    pub session_secret: Option<String>,

    /// Key the identity gateway presents when syncing accounts.
    pub identity_api_key: Option<String>,

    /// Bearer secret of the scheduled reset job.
    pub cron_secret: Option<String>,

    /// Anthropic API base URL.
    pub anthropic_api_url: String,

    /// Anthropic API key (optional; generation is disabled without it).
    pub anthropic_api_key: Option<String>,

    /// Generation model.
    pub anthropic_model: String,

    /// Bounded wait for one generation call in seconds (default: 50).
    pub generation_timeout_seconds: u64,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds (default: 90). Never effectively below
    /// [`ServiceConfig::generate_budget_seconds`].
    pub request_timeout_seconds: u64,
}

/// Anthropic secrets file structure.
#[derive(Debug, Deserialize)]
struct AnthropicSecrets {
    api_key: String,
    #[serde(default)]
    api_url: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        // Secrets file first, then env vars
        let (anthropic_api_key, anthropic_api_url, anthropic_model) = load_anthropic_secrets();

        let config = Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            db_max_connections: env_or("DB_MAX_CONNECTIONS", defaults.db_max_connections),
            db_acquire_timeout_seconds: env_or(
                "DB_ACQUIRE_TIMEOUT_SECONDS",
                defaults.db_acquire_timeout_seconds,
            ),
            default_credit_grant: env_or("DEFAULT_CREDIT_GRANT", defaults.default_credit_grant),
            ledger_timeout_seconds: env_or(
                "LEDGER_TIMEOUT_SECONDS",
                defaults.ledger_timeout_seconds,
            ),
            ledger_retry_attempts: env_or("LEDGER_RETRY_ATTEMPTS", defaults.ledger_retry_attempts),
            session_secret: non_empty_var("SESSION_SECRET"),
            identity_api_key: non_empty_var("IDENTITY_API_KEY"),
            cron_secret: non_empty_var("CRON_SECRET"),
            anthropic_api_url: anthropic_api_url.unwrap_or(defaults.anthropic_api_url),
            anthropic_api_key,
            anthropic_model: anthropic_model.unwrap_or(defaults.anthropic_model),
            generation_timeout_seconds: env_or(
                "GENERATION_TIMEOUT_SECONDS",
                defaults.generation_timeout_seconds,
            ),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            max_body_bytes: env_or("MAX_BODY_BYTES", defaults.max_body_bytes),
            request_timeout_seconds: env_or(
                "REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout_seconds,
            ),
        };

        if config.request_timeout_seconds < config.generate_budget_seconds() {
            tracing::warn!(
                configured = config.request_timeout_seconds,
                required = config.generate_budget_seconds(),
                "REQUEST_TIMEOUT_SECONDS is below the generate budget; raising it"
            );
        }
        config
    }

    /// Worst-case duration of `POST /v1/generate`: a balance read, the
    /// generation call and the charge, each under its own bound.
    #[must_use]
    pub const fn generate_budget_seconds(&self) -> u64 {
        self.generation_timeout_seconds
            .saturating_add(self.ledger_timeout_seconds.saturating_mul(2))
            .saturating_add(REQUEST_TIMEOUT_HEADROOM_SECONDS)
    }

    /// Router-wide request timeout.
    ///
    /// Raised to the generate budget when configured lower, so the router
    /// never drops a generate request between the model answering and the
    /// charge committing.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_seconds
                .max(self.generate_budget_seconds()),
        )
    }

    /// Ledger tuning derived from this configuration.
    #[must_use]
    pub fn ledger_options(&self) -> LedgerOptions {
        LedgerOptions {
            default_grant: self.default_credit_grant.max(1),
            operation_timeout: Duration::from_secs(self.ledger_timeout_seconds),
            retry: RetryPolicy {
                max_attempts: self.ledger_retry_attempts,
                ..RetryPolicy::default()
            },
        }
    }

    /// Connection pool settings derived from this configuration.
    #[must_use]
    pub fn store_options(&self) -> PgStoreOptions {
        PgStoreOptions {
            max_connections: self.db_max_connections,
            acquire_timeout: Duration::from_secs(self.db_acquire_timeout_seconds),
            // Leaves the ledger time to see the cancellation and report it.
            statement_timeout: Some(Duration::from_secs(self.ledger_timeout_seconds) * 2 / 3),
        }
    }

    /// Bounded wait for one generation call.
    #[must_use]
    pub const fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_seconds)
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(variable = %name, value = %raw, "Ignoring unparsable setting");
            default
        }),
        Err(_) => default,
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Load Anthropic secrets from file or environment.
fn load_anthropic_secrets() -> (Option<String>, Option<String>, Option<String>) {
    let secret_paths = [
        ".secrets/anthropic.json",
        "wizard/.secrets/anthropic.json",
        "../.secrets/anthropic.json",
    ];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<AnthropicSecrets>(path) {
            tracing::info!(path = %path, "Loaded Anthropic secrets from file");
            return (
                Some(secrets.api_key),
                secrets.api_url.or_else(|| non_empty_var("ANTHROPIC_API_URL")),
                secrets.model.or_else(|| non_empty_var("ANTHROPIC_MODEL")),
            );
        }
    }

    tracing::debug!("Anthropic secrets file not found, using environment variables");
    (
        non_empty_var("ANTHROPIC_API_KEY"),
        non_empty_var("ANTHROPIC_API_URL"),
        non_empty_var("ANTHROPIC_MODEL"),
    )
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            database_url: None,
            db_max_connections: 5,
            db_acquire_timeout_seconds: 10,
            default_credit_grant: DEFAULT_GRANT,
            ledger_timeout_seconds: 15,
            ledger_retry_attempts: 3,
            session_secret: None,
            identity_api_key: None,
            cron_secret: None,
            anthropic_api_url: DEFAULT_ANTHROPIC_API_URL.into(),
            anthropic_api_key: None,
            anthropic_model: DEFAULT_ANTHROPIC_MODEL.into(),
            generation_timeout_seconds: 50,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 90,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ServiceConfig::default();
        assert_eq!(config.default_credit_grant, 3);
        assert_eq!(config.db_max_connections, 5);
        assert!(config.request_timeout_seconds >= config.generate_budget_seconds());
        assert_eq!(config.request_timeout(), Duration::from_secs(90));
    }

    #[test]
    fn request_timeout_covers_generate_budget() {
        let config = ServiceConfig {
            generation_timeout_seconds: 50,
            ledger_timeout_seconds: 15,
            request_timeout_seconds: 60,
            ..ServiceConfig::default()
        };
        assert_eq!(config.generate_budget_seconds(), 50 + 2 * 15 + 10);
        assert_eq!(config.request_timeout(), Duration::from_secs(90));

        let generous = ServiceConfig {
            request_timeout_seconds: 300,
            ..config
        };
        assert_eq!(generous.request_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn statement_timeout_stays_below_ledger_timeout() {
        let config = ServiceConfig {
            ledger_timeout_seconds: 15,
            ..ServiceConfig::default()
        };
        let statement = config.store_options().statement_timeout.unwrap();
        assert_eq!(statement, Duration::from_secs(10));
        assert!(statement < config.ledger_options().operation_timeout);
    }

    #[test]
    fn ledger_options_follow_config() {
        let config = ServiceConfig {
            default_credit_grant: 5,
            ledger_timeout_seconds: 2,
            ledger_retry_attempts: 1,
            ..ServiceConfig::default()
        };
        let options = config.ledger_options();
        assert_eq!(options.default_grant, 5);
        assert_eq!(options.operation_timeout, Duration::from_secs(2));
        assert_eq!(options.retry.max_attempts, 1);
    }

    #[test]
    fn non_positive_grant_is_clamped() {
        let config = ServiceConfig {
            default_credit_grant: 0,
            ..ServiceConfig::default()
        };
        assert_eq!(config.ledger_options().default_grant, 1);
    }
}
