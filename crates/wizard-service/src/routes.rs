//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, credits, generate, health};
use crate::state::AppState;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent generation requests.
/// Each one holds an LLM call open for up to the generation timeout.
const GENERATE_MAX_CONCURRENT_REQUESTS: usize = 20;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `GET /health/ready` - Datastore readiness
///
/// ## Accounts
/// - `POST /v1/accounts/sync` - Identity gateway account sync (API key)
/// - `GET /v1/accounts/me` - Current user's profile (session JWT)
/// - `PUT /v1/accounts/me` - Edit profile (session JWT)
///
/// ## Credits (session JWT)
/// - `GET /v1/credits` - Current balance
/// - `POST /v1/credits/use` - Spend credits
/// - `GET /v1/credits/history` - Recent consumption
///
/// ## Scheduler (cron secret)
/// - `GET|POST /v1/credits/reset` - Restore every balance
///
/// ## Generation (session JWT, concurrency-limited)
/// - `POST /v1/generate` - Generate a section for one credit
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout = state.config.request_timeout();

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let generate_routes = Router::new()
        .route("/", post(generate::generate_section))
        .layer(ConcurrencyLimitLayer::new(GENERATE_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        // Accounts
        .route("/accounts/sync", post(accounts::sync_account))
        .route(
            "/accounts/me",
            get(accounts::get_account).put(accounts::update_account),
        )
        // Credits
        .route("/credits", get(credits::get_balance))
        .route("/credits/use", post(credits::use_credits))
        .route("/credits/history", get(credits::history))
        .route(
            "/credits/reset",
            get(credits::reset_credits).post(credits::reset_credits),
        )
        .nest("/generate", generate_routes)
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        .route("/health/ready", get(health::ready))
        // API v1 routes (rate limited)
        .nest("/v1", api_routes)
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
