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

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LLMConfig {
    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// OpenAI-compatible API base URL
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    /// Ollama base URL (e.g., "http://localhost:11434")
    #[serde(default = "default_ollama_base_url")]
    pub ollama_base_url: Option<String>,

    /// Per-request timeout in seconds, applied by the HTTP client
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_ollama_base_url() -> Option<String> {
    Some("http://localhost:11434".to_string())
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: default_openai_base_url(),
            ollama_base_url: default_ollama_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl LLMConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// HTTP client shared by every provider built from this config
    pub fn http_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .timeout(self.request_timeout())
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LLMConfig::default();
        assert!(config.openai_api_key.is_none());
        assert_eq!(config.openai_base_url, "https://api.openai.com/v1");
        assert_eq!(
            config.ollama_base_url.as_deref(),
            Some("http://localhost:11434")
        );
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: LLMConfig = serde_json::from_str(r#"{"openai_api_key":"sk-test"}"#).unwrap();
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.request_timeout_secs, 120);
    }
}
