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

//! Model identifiers of the form `[prefix.]mcts/<backend>/<model>` and the
//! catalog of identifiers advertised to clients.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static MODEL_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[a-zA-Z0-9_]+\.)?mcts/([^/]+)/(.+)$").expect("valid model id pattern")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("Model ID should be in the format '*.mcts/backend/model_name', got '{0}'")]
    InvalidModelId(String),
}

/// Backend tag and backend-side model name extracted from a model id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRoute {
    pub backend: String,
    pub model: String,
}

impl ModelRoute {
    pub fn parse(model_id: &str) -> Result<Self, RouteError> {
        let captures = MODEL_ID
            .captures(model_id)
            .ok_or_else(|| RouteError::InvalidModelId(model_id.to_string()))?;

        Ok(Self {
            backend: captures[1].to_string(),
            model: captures[2].to_string(),
        })
    }

    pub fn model_id(&self) -> String {
        format!("mcts/{}/{}", self.backend, self.model)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    pub name: String,
}

/// Models offered to clients, per backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCatalog {
    /// Advertise the OpenAI list (true) or the Ollama list (false)
    #[serde(default = "default_use_openai")]
    pub use_openai: bool,

    #[serde(default = "default_openai_models")]
    pub openai_models: Vec<String>,

    #[serde(default = "default_ollama_models")]
    pub ollama_models: Vec<String>,
}

fn default_use_openai() -> bool {
    true
}

fn default_openai_models() -> Vec<String> {
    vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string()]
}

fn default_ollama_models() -> Vec<String> {
    vec!["llama3.2:3b".to_string(), "qwen2.5:7b".to_string()]
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self {
            use_openai: default_use_openai(),
            openai_models: default_openai_models(),
            ollama_models: default_ollama_models(),
        }
    }
}

impl ModelCatalog {
    pub fn entries(&self) -> Vec<ModelEntry> {
        let (backend, models) = if self.use_openai {
            ("openai", &self.openai_models)
        } else {
            ("ollama", &self.ollama_models)
        };

        models
            .iter()
            .map(|model| ModelEntry {
                id: format!("mcts/{}/{}", backend, model),
                name: format!("MCTS/{}", model),
            })
            .collect()
    }
}

/// Split a comma separated model list, dropping blanks
pub fn parse_model_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|model| !model.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_prefixed() {
        let route = ModelRoute::parse("mcts/ollama/llama3.2:3b").unwrap();
        assert_eq!(route.backend, "ollama");
        assert_eq!(route.model, "llama3.2:3b");

        let route = ModelRoute::parse("draft_pipe.mcts/openai/gpt-4o").unwrap();
        assert_eq!(route.backend, "openai");
        assert_eq!(route.model, "gpt-4o");
        assert_eq!(route.model_id(), "mcts/openai/gpt-4o");
    }

    #[test]
    fn test_model_may_contain_slashes() {
        let route = ModelRoute::parse("mcts/ollama/library/tulu3:8b").unwrap();
        assert_eq!(route.model, "library/tulu3:8b");
    }

    #[test]
    fn test_invalid_ids() {
        for id in ["gpt-4o", "mcts/openai", "mcts//gpt-4o", "bad-prefix.mcts/openai/x"] {
            assert_eq!(
                ModelRoute::parse(id),
                Err(RouteError::InvalidModelId(id.to_string())),
                "{id}"
            );
        }
    }

    #[test]
    fn test_catalog_entries() {
        let catalog = ModelCatalog::default();
        let entries = catalog.entries();
        assert_eq!(entries[0].id, "mcts/openai/gpt-4o");
        assert_eq!(entries[0].name, "MCTS/gpt-4o");

        let ollama = ModelCatalog {
            use_openai: false,
            ..ModelCatalog::default()
        };
        assert!(ollama
            .entries()
            .iter()
            .all(|entry| entry.id.starts_with("mcts/ollama/")));
    }

    #[test]
    fn test_parse_model_list() {
        assert_eq!(
            parse_model_list(" a, b ,,c "),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
        assert!(parse_model_list("").is_empty());
    }
}
