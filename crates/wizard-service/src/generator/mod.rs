//! Section code generation.
//!
//! The generate route depends only on [`SectionGenerator`]; the production
//! implementation is [`AnthropicClient`].

mod client;
mod types;

pub use client::AnthropicClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What to generate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Kind of storefront section (e.g. "hero banner").
    pub section_type: String,
    /// Free-form requirements.
    pub requirements: String,
    /// Descriptions of reference images.
    pub image_descriptions: Vec<String>,
}

/// Error type for generation.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    /// No generator is configured.
    #[error("generator not configured")]
    NotConfigured,

    /// The generation did not finish in time.
    #[error("generation timed out after {0}s")]
    Timeout(u64),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The model API returned an error.
    #[error("model API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// The model returned no text.
    #[error("model returned no text")]
    EmptyResponse,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Produces storefront section code.
#[async_trait]
pub trait SectionGenerator: Send + Sync {
    /// Generate the code for one section.
    ///
    /// # Errors
    ///
    /// Returns `GeneratorError` if the model call fails.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GeneratorError>;
}
