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

use anyhow::Result;
use draftsearch_core::Config;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Draftsearch Server Configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpServerConfig,

    /// `[llm]`, `[search]` and `[catalog]` tables
    #[serde(flatten)]
    pub core: Config,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpServerConfig {
    /// HTTP API listen address (e.g., "127.0.0.1:47200")
    #[serde(default = "default_http_addr")]
    pub listen_addr: String,

    /// Enable CORS
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,

    /// Allowed CORS origins (empty = allow all)
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Events buffered between a search and its SSE response
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_http_addr() -> String {
    "127.0.0.1:47200".to_string()
}

fn default_enable_cors() -> bool {
    true
}

fn default_event_buffer() -> usize {
    64
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_http_addr(),
            enable_cors: default_enable_cors(),
            cors_origins: vec![],
            event_buffer: default_event_buffer(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with priority: env > file > defaults
    ///
    /// On top of the variables read by [`Config::apply_env`]:
    /// - DRAFTSEARCH_HTTP_ADDR: HTTP listen address (default: 127.0.0.1:47200)
    /// - DRAFTSEARCH_ENABLE_CORS: Enable CORS (default: true)
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
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("DRAFTSEARCH_HTTP_ADDR") {
            self.server.listen_addr = addr;
        }
        if let Some(cors) = lookup("DRAFTSEARCH_ENABLE_CORS") {
            self.server.enable_cors = cors.parse().unwrap_or(true);
        }
        self.core.apply_env(lookup);
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.server
            .listen_addr
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid listen address {:?}: {}", self.server.listen_addr, e))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;
        self.core.search.validate()?;

        if self.server.event_buffer == 0 {
            anyhow::bail!("event_buffer must be greater than 0");
        }
        Ok(())
    }
}
