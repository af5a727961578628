//! Completion providers
//!
//! This module contains the completion-service abstraction, the OpenAI
//! implementation, the model catalog, and the registry that routes a
//! request to the correct service when multiple providers are configured.

pub mod base;
pub mod openai;

pub use base::{CompletionError, CompletionReply, CompletionService};
pub use openai::{OpenAiService, OPENAI_PROVIDER_ID};

use crate::config::ProviderConfig;
use crate::error::{ConvosyncError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A selectable model offered by a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderModel {
    pub name: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub model_provider_id: String,
}

impl PartialEq for ProviderModel {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.model_provider_id == other.model_provider_id
    }
}

impl Eq for ProviderModel {}

impl ProviderModel {
    /// Catalog entry for an OpenAI model
    pub fn openai(id: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            id: id.to_string(),
            description: None,
            model_provider_id: OPENAI_PROVIDER_ID.to_string(),
        }
    }
}

/// The OpenAI model catalog
pub fn openai_models() -> Vec<ProviderModel> {
    vec![
        ProviderModel::openai("gpt-5-nano", "GPT 5 Nano"),
        ProviderModel::openai("gpt-5-pro", "GPT 5 Pro"),
        ProviderModel::openai("gpt-5-mini", "GPT 5 Mini"),
        ProviderModel::openai("gpt-5", "GPT 5"),
        ProviderModel::openai("gpt-5-chat-latest", "GPT 5 Chat Latest"),
        ProviderModel::openai("gpt-4.1", "GPT 4.1"),
        ProviderModel::openai("gpt-4.1-mini", "GPT 4.1 mini"),
        ProviderModel::openai("gpt-4.1-nano", "GPT 4.1 nano"),
    ]
}

/// Model selected when the user has not picked one
pub fn default_model() -> ProviderModel {
    ProviderModel::openai("gpt-5-nano", "GPT 5 Nano")
}

/// Create a completion service for a provider id
///
/// # Errors
///
/// Returns an error if the provider id is unknown or initialization fails.
pub fn create_service(
    provider_id: &str,
    config: &ProviderConfig,
) -> Result<Arc<dyn CompletionService>> {
    match provider_id {
        OPENAI_PROVIDER_ID => Ok(Arc::new(OpenAiService::new(config.openai.clone())?)),
        _ => Err(ConvosyncError::Provider(format!("unknown provider id: {provider_id}")).into()),
    }
}

/// Maps provider ids to completion services
///
/// The registry is built once from configuration; orchestrators look up
/// the service matching each request's model provider.
pub struct ServiceRegistry {
    services: HashMap<String, Arc<dyn CompletionService>>,
}

impl ServiceRegistry {
    /// Build the registry from provider configuration
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let mut services: HashMap<String, Arc<dyn CompletionService>> = HashMap::new();
        services.insert(
            OPENAI_PROVIDER_ID.to_string(),
            create_service(OPENAI_PROVIDER_ID, config)?,
        );
        Ok(Self { services })
    }

    /// An empty registry, populated via [`ServiceRegistry::register`]
    pub fn empty() -> Self {
        Self {
            services: HashMap::new(),
        }
    }

    /// Register (or replace) a service for a provider id
    pub fn register(&mut self, provider_id: &str, service: Arc<dyn CompletionService>) {
        self.services.insert(provider_id.to_string(), service);
    }

    /// Look up the service for a provider id
    pub fn service(&self, provider_id: &str) -> Option<Arc<dyn CompletionService>> {
        self.services.get(provider_id).cloned()
    }
}
