//! Section wizard HTTP API service.
//!
//! This crate provides the HTTP API in front of the credit ledger:
//!
//! - Account sync and profile management
//! - Credit balance, consumption and history
//! - The scheduled credit reset
//! - Section generation, charged one credit per delivered section
//!
//! # Authentication
//!
//! The service supports three authentication methods:
//!
//! 1. **Session JWTs** - For end-user requests, issued by the identity gateway
//! 2. **Identity API key** - For the gateway's account sync calls
//! 3. **Cron secret** - For the scheduled reset job

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod generator;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use generator::{AnthropicClient, GenerationRequest, GeneratorError, SectionGenerator};
pub use routes::create_router;
pub use state::AppState;
