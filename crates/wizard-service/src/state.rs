//! Application state.

use std::sync::Arc;

use wizard_store::{Ledger, Store};

use crate::config::ServiceConfig;
use crate::generator::{AnthropicClient, SectionGenerator};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// The credit ledger over `store`.
    pub ledger: Ledger,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Section code generator (optional).
    pub generator: Option<Arc<dyn SectionGenerator>>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        let ledger = Ledger::new(store.clone(), config.ledger_options());

        // Create the generator if configured
        let generator = config.anthropic_api_key.as_ref().and_then(|key| {
            match AnthropicClient::new(
                &config.anthropic_api_url,
                key,
                &config.anthropic_model,
                config.generation_timeout(),
            ) {
                Ok(client) => {
                    tracing::info!(
                        model = %config.anthropic_model,
                        "Section generation enabled"
                    );
                    Some(Arc::new(client) as Arc<dyn SectionGenerator>)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create Anthropic client");
                    None
                }
            }
        });

        if generator.is_none() {
            tracing::warn!("Anthropic not configured - code generation will not be available");
        }

        Self {
            store,
            ledger,
            config,
            generator,
        }
    }

    /// Replace the section generator.
    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn SectionGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Check if code generation is configured.
    #[must_use]
    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }
}
