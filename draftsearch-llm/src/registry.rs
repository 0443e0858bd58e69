// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::{Backend, LLMConfig, LLMError, LLMProvider, OllamaProvider, OpenAIProvider};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub id: String,
    pub name: String,
    pub available: bool,
}

/// Backend tag -> provider lookup.
///
/// Providers are stateless apart from their HTTP client, so one registry can
/// be shared by any number of concurrent search sessions.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: DashMap<Backend, Arc<dyn LLMProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every provider the configuration has credentials for.
    pub fn from_config(config: &LLMConfig) -> Result<Self, LLMError> {
        let registry = Self::new();
        let client = config.http_client()?;

        // Initialize OpenAI if key present
        if let Some(key) = &config.openai_api_key {
            registry.register(Arc::new(OpenAIProvider::new(
                key.clone(),
                &config.openai_base_url,
                client.clone(),
            )));
            info!("Initialized OpenAI provider");
        } else {
            warn!("OPENAI_API_KEY not set, OpenAI provider disabled");
        }

        // Initialize Ollama (local, no key needed)
        if let Some(base_url) = &config.ollama_base_url {
            registry.register(Arc::new(OllamaProvider::new(base_url, client)));
            info!("Initialized Ollama provider");
        }

        Ok(registry)
    }

    /// Register (or replace) the provider for its backend.
    pub fn register(&self, provider: Arc<dyn LLMProvider>) {
        self.providers.insert(provider.backend(), provider);
    }

    /// Resolve a backend tag such as `"openai"`.
    ///
    /// Unrecognised tags fail with [`LLMError::BackendUnknown`]; recognised
    /// but unconfigured ones with [`LLMError::BackendUnavailable`].
    pub fn resolve(&self, tag: &str) -> Result<Arc<dyn LLMProvider>, LLMError> {
        let backend: Backend = tag.parse()?;
        self.get(backend)
    }

    pub fn get(&self, backend: Backend) -> Result<Arc<dyn LLMProvider>, LLMError> {
        self.providers
            .get(&backend)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(LLMError::BackendUnavailable(backend))
    }

    pub fn list(&self) -> Vec<ProviderInfo> {
        let mut providers: Vec<ProviderInfo> = self
            .providers
            .iter()
            .map(|entry| {
                let (backend, provider) = entry.pair();
                ProviderInfo {
                    id: backend.to_string(),
                    name: provider.name().to_string(),
                    available: true,
                }
            })
            .collect();
        providers.sort_by(|a, b| a.id.cmp(&b.id));
        providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_without_openai_key() {
        let registry = ProviderRegistry::from_config(&LLMConfig::default()).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.resolve("ollama").is_ok());
        assert!(matches!(
            registry.resolve("openai"),
            Err(LLMError::BackendUnavailable(Backend::OpenAI))
        ));
    }

    #[test]
    fn test_unknown_backend() {
        let registry = ProviderRegistry::from_config(&LLMConfig::default()).unwrap();
        assert!(matches!(
            registry.resolve("grpc"),
            Err(LLMError::BackendUnknown(tag)) if tag == "grpc"
        ));
    }

    #[test]
    fn test_list_sorted() {
        let config = LLMConfig {
            openai_api_key: Some("sk-test".to_string()),
            ..LLMConfig::default()
        };
        let registry = ProviderRegistry::from_config(&config).unwrap();

        let ids: Vec<String> = registry.list().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["ollama", "openai"]);
    }

    #[test]
    fn test_no_providers() {
        let config = LLMConfig {
            ollama_base_url: None,
            ..LLMConfig::default()
        };
        let registry = ProviderRegistry::from_config(&config).unwrap();
        assert!(registry.is_empty());
    }
}
