//! Anthropic Messages API client.

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::types::{ErrorResponse, Message, MessagesRequest, MessagesResponse};
use super::{GenerationRequest, GeneratorError, SectionGenerator};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4000;

/// Anthropic API client.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicClient {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - API URL (e.g., `"https://api.anthropic.com"`)
    /// * `api_key` - API key
    /// * `model` - Model name
    /// * `timeout` - Bounded wait for one call
    ///
    /// # Errors
    ///
    /// Returns `GeneratorError::Configuration` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GeneratorError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GeneratorError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    async fn handle_response(response: reqwest::Response) -> Result<String, GeneratorError> {
        let status = response.status();

        if status.is_success() {
            let body: MessagesResponse = response.json().await?;
            return body.first_text().ok_or(GeneratorError::EmptyResponse);
        }

        let message = match response.json::<ErrorResponse>().await {
            Ok(body) if !body.error.message.is_empty() => body.error.message,
            _ => format!("HTTP {status}"),
        };
        Err(GeneratorError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl SectionGenerator for AnthropicClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GeneratorError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: vec![Message {
                role: "user",
                content: build_prompt(request),
            }],
        };

        tracing::debug!(
            section_type = %request.section_type,
            model = %self.model,
            "Requesting section generation"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        Self::handle_response(response).await
    }
}

fn build_prompt(request: &GenerationRequest) -> String {
    let block_class = format!(
        "section-{}",
        request
            .section_type
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-")
            .to_lowercase()
    );

    let mut prompt = format!(
        "Generate a complete Shopify Liquid section of type \"{}\". \
         Use BEM class names rooted at `{block_class}`, add \
         data-section-id=\"{{{{ section.id }}}}\" to the root element, and end \
         with a valid {{% schema %}} block whose range settings have defaults \
         divisible by their step.\n\nREFERENCE IMAGES:\n",
        request.section_type
    );

    if request.image_descriptions.is_empty() {
        prompt.push_str("No reference images provided.\n");
    } else {
        for description in &request.image_descriptions {
            let _ = writeln!(prompt, "- {description}");
        }
    }

    prompt.push_str("\nSECTION REQUIREMENTS:\n");
    prompt.push_str(if request.requirements.trim().is_empty() {
        "None beyond the section type."
    } else {
        request.requirements.as_str()
    });
    prompt
}
