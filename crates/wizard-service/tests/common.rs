//! Common test utilities for wizard integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use axum_test::TestServer;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::json;

use wizard_service::auth::SessionClaims;
use wizard_service::{
    create_router, AppState, GenerationRequest, GeneratorError, SectionGenerator, ServiceConfig,
};
use wizard_store::{MemoryStore, Store};

pub const SESSION_SECRET: &str = "test-session-secret";
pub const IDENTITY_API_KEY: &str = "test-identity-key";
pub const CRON_SECRET: &str = "test-cron-secret";
pub const GENERATED_CODE: &str = "<section class=\"section-hero\">{% schema %}{% endschema %}";

/// A generator that answers from memory.
#[derive(Default)]
pub struct StubGenerator {
    pub calls: AtomicUsize,
    pub fail: bool,
    pub delay: Option<Duration>,
}

#[async_trait]
impl SectionGenerator for StubGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String, GeneratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(GeneratorError::Api {
                status: 500,
                message: "model exploded".into(),
            });
        }
        Ok(GENERATED_CODE.to_string())
    }
}

impl StubGenerator {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The backing store, for direct inspection.
    pub store: Arc<MemoryStore>,
    /// The generator wired into the router.
    pub generator: Arc<StubGenerator>,
}

impl TestHarness {
    /// Create a new test harness with a fresh in-memory store.
    pub fn new() -> Self {
        Self::with_generator(StubGenerator::default())
    }

    /// Create a harness around a specific generator.
    pub fn with_generator(generator: StubGenerator) -> Self {
        Self::build(test_config(), Some(generator))
    }

    /// Create a harness with no generator configured.
    pub fn without_generator() -> Self {
        Self::build(test_config(), None)
    }

    /// Create a harness with a custom configuration.
    pub fn with_config(config: ServiceConfig) -> Self {
        Self::build(config, Some(StubGenerator::default()))
    }

    fn build(config: ServiceConfig, generator: Option<StubGenerator>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let wired = generator.is_some();
        let generator = Arc::new(generator.unwrap_or_default());

        let mut state = AppState::new(store.clone() as Arc<dyn Store>, config);
        if wired {
            state = state.with_generator(generator.clone());
        }

        let router: Router = create_router(state);
        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            generator,
        }
    }

    /// Sync an identity through the gateway endpoint and return its account id.
    pub async fn sync_user(&self, subject: &str) -> i64 {
        let response = self
            .server
            .post("/v1/accounts/sync")
            .add_header(api_key_name(), HeaderValue::from_static(IDENTITY_API_KEY))
            .json(&json!({
                "external_id": subject,
                "name": "Test User",
            }))
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        body["user"]["id"].as_i64().expect("account id")
    }

    /// Authorization header value for a signed session.
    pub fn user_auth(subject: &str) -> HeaderValue {
        bearer(&session_token(subject, SESSION_SECRET, 3600))
    }

    /// Authorization header value for the reset job.
    pub fn cron_auth() -> HeaderValue {
        bearer(CRON_SECRET)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        listen_addr: "127.0.0.1:0".into(),
        session_secret: Some(SESSION_SECRET.into()),
        identity_api_key: Some(IDENTITY_API_KEY.into()),
        cron_secret: Some(CRON_SECRET.into()),
        ledger_timeout_seconds: 5,
        generation_timeout_seconds: 2,
        ..ServiceConfig::default()
    }
}

pub fn api_key_name() -> HeaderName {
    HeaderName::from_static("x-api-key")
}

pub fn authorization() -> HeaderName {
    AUTHORIZATION
}

pub fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {token}")).expect("valid header")
}

/// Mint an HS256 session token, as the identity gateway would.
pub fn session_token(subject: &str, secret: &str, ttl_seconds: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = SessionClaims {
        sub: subject.into(),
        exp: now + ttl_seconds,
        iat: Some(now),
        email: None,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("encode session token")
}
