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

use crate::error::SearchError;
use crate::route::{parse_model_list, ModelCatalog};
use crate::tree::NodeSettings;
use anyhow::Result;
use draftsearch_llm::LLMConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Search parameters, fixed for the lifetime of a session
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct SearchConfig {
    /// UCT exploration constant
    #[serde(default = "default_exploration_weight")]
    pub exploration_weight: f64,

    /// Rounds of simulations after the root evaluation
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Select/expand/simulate passes per round
    #[serde(default = "default_max_simulations")]
    pub max_simulations: usize,

    /// Child cap per node
    #[serde(default = "default_max_children")]
    pub max_children: usize,

    /// Seed for node identifiers; random when unset
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_exploration_weight() -> f64 {
    1.414
}

fn default_max_iterations() -> usize {
    2
}

fn default_max_simulations() -> usize {
    2
}

fn default_max_children() -> usize {
    2
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            exploration_weight: default_exploration_weight(),
            max_iterations: default_max_iterations(),
            max_simulations: default_max_simulations(),
            max_children: default_max_children(),
            seed: None,
        }
    }
}

impl SearchConfig {
    pub fn node_settings(&self) -> NodeSettings {
        NodeSettings {
            exploration_weight: self.exploration_weight,
            max_children: self.max_children,
        }
    }

    pub fn validate(&self) -> Result<(), SearchError> {
        if !self.exploration_weight.is_finite() || self.exploration_weight < 0.0 {
            return Err(SearchError::Config(format!(
                "exploration_weight must be a finite non-negative number, got {}",
                self.exploration_weight
            )));
        }
        Ok(())
    }
}

/// Full configuration shared by the server and the CLI
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LLMConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub catalog: ModelCatalog,
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Defaults overridden by environment variables
    ///
    /// Supported environment variables:
    /// - OPENAI_API_KEY: OpenAI API key (enables the openai backend)
    /// - OPENAI_API_BASE_URL: OpenAI-compatible base URL
    /// - OLLAMA_API_BASE_URL: Ollama base URL
    /// - DRAFTSEARCH_REQUEST_TIMEOUT: Per-request LLM timeout in seconds
    /// - USE_OPENAI: Advertise OpenAI models instead of Ollama ones
    /// - OPENAI_MODELS / OLLAMA_MODELS: Comma-separated model lists
    /// - EXPLORATION_WEIGHT, MAX_ITERATIONS, MAX_SIMULATIONS, MAX_CHILDREN
    /// - DRAFTSEARCH_SEED: Seed for deterministic node identifiers
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Load configuration with priority: env > file > defaults
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let mut config = match config_file {
            Some(path) if path.exists() => {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            }
            Some(path) => {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.search.validate()?;
        Ok(config)
    }

    /// Override fields whose variable is set. Unparseable numbers are ignored
    /// with a warning.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.llm.openai_api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_API_BASE_URL") {
            self.llm.openai_base_url = url;
        }
        if let Some(url) = lookup("OLLAMA_API_BASE_URL") {
            self.llm.ollama_base_url = Some(url);
        }
        parse_into(&lookup, "DRAFTSEARCH_REQUEST_TIMEOUT", &mut self.llm.request_timeout_secs);

        if let Some(flag) = lookup("USE_OPENAI") {
            self.catalog.use_openai = parse_flag(&flag, self.catalog.use_openai);
        }
        if let Some(models) = lookup("OPENAI_MODELS") {
            self.catalog.openai_models = parse_model_list(&models);
        }
        if let Some(models) = lookup("OLLAMA_MODELS") {
            self.catalog.ollama_models = parse_model_list(&models);
        }

        parse_into(&lookup, "EXPLORATION_WEIGHT", &mut self.search.exploration_weight);
        parse_into(&lookup, "MAX_ITERATIONS", &mut self.search.max_iterations);
        parse_into(&lookup, "MAX_SIMULATIONS", &mut self.search.max_simulations);
        parse_into(&lookup, "MAX_CHILDREN", &mut self.search.max_children);

        if let Some(raw) = lookup("DRAFTSEARCH_SEED") {
            match raw.trim().parse() {
                Ok(seed) => self.search.seed = Some(seed),
                Err(_) => tracing::warn!("Ignoring invalid DRAFTSEARCH_SEED: {:?}", raw),
            }
        }
    }
}

fn parse_into<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => tracing::warn!("Ignoring invalid {}: {:?}", key, raw),
        }
    }
}

fn parse_flag(raw: &str, fallback: bool) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => fallback,
    }
}
