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

//! # Draftsearch LLM adapters
//!
//! Backend-neutral chat-completion clients used by the search engine.
//!
//! Every backend implements [`LLMProvider`], which offers two capabilities:
//!
//! - **chat**: send messages, wait for the full completion
//! - **stream_chat**: send messages, receive the completion as an ordered,
//!   finite [`CompletionStream`] of text fragments
//!
//! Backends are selected once, at configuration time, through the
//! [`ProviderRegistry`]. Unknown backend tags fail with
//! [`LLMError::BackendUnknown`]. No retries happen in this crate; transport
//! failures are returned to the caller as-is.
//!
//! ## Example
//!
//! ```rust,ignore
//! use draftsearch_llm::{ChatMessage, LLMConfig, ProviderRegistry};
//!
//! let registry = ProviderRegistry::from_config(&LLMConfig::default())?;
//! let provider = registry.resolve("ollama")?;
//! let answer = provider
//!     .complete(vec![ChatMessage::user("What is 2+2?")], "llama3.2")
//!     .await?;
//! ```

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::mpsc;

pub mod config;
pub mod providers;
pub mod registry;
pub mod sse;

pub use config::LLMConfig;
pub use providers::{OllamaProvider, OpenAIProvider};
pub use registry::{ProviderInfo, ProviderRegistry};

/// Capacity of the fragment channel behind a [`CompletionStream`].
pub const STREAM_BUFFER: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub provider: String,               // e.g., "openai", "ollama"
    pub model: String,                  // Requested model
    pub response_model: Option<String>, // Actual model used (from response)
    pub response_id: Option<String>,    // Provider response ID
    pub input_tokens: Option<u32>,      // Prompt tokens
    pub output_tokens: Option<u32>,     // Completion tokens
    pub finish_reason: Option<String>,  // stop/length
    pub duration_ms: u32,
}

/// Chat-completion backend tag.
///
/// Parsed case-insensitively from `"openai"` / `"ollama"`; anything else is
/// rejected with [`LLMError::BackendUnknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    OpenAI,
    Ollama,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::OpenAI => "openai",
            Backend::Ollama => "ollama",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = LLMError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Backend::OpenAI),
            "ollama" => Ok(Backend::Ollama),
            _ => Err(LLMError::BackendUnknown(s.to_string())),
        }
    }
}

/// Errors from LLM clients
#[derive(Debug, Error)]
pub enum LLMError {
    #[error("Unknown backend: {0}")]
    BackendUnknown(String),

    #[error("Backend not configured: {0}")]
    BackendUnavailable(Backend),

    #[error("API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Completion stream closed before it finished")]
    StreamClosed,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LLMError {
    /// True for failures of an actual request (network, auth, rate limit,
    /// malformed reply), as opposed to configuration mistakes.
    pub fn is_transport(&self) -> bool {
        !matches!(
            self,
            LLMError::BackendUnknown(_) | LLMError::BackendUnavailable(_)
        )
    }
}

/// Ordered, finite sequence of completion fragments.
///
/// Backed by a bounded channel filled by the provider's reader task. A
/// transport failure in the middle of the reply arrives as a single `Err`
/// item, after which the stream ends. Not restartable.
#[derive(Debug)]
pub struct CompletionStream {
    rx: mpsc::Receiver<Result<String, LLMError>>,
}

impl CompletionStream {
    pub fn new(rx: mpsc::Receiver<Result<String, LLMError>>) -> Self {
        Self { rx }
    }

    /// Create a sender/stream pair with the default buffer size.
    pub fn channel() -> (mpsc::Sender<Result<String, LLMError>>, Self) {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        (tx, Self::new(rx))
    }

    /// Build an already-complete stream from fixed fragments.
    pub fn from_fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fragments: Vec<String> = fragments.into_iter().map(Into::into).collect();
        let (tx, rx) = mpsc::channel(fragments.len().max(1));
        for fragment in fragments {
            // Capacity matches the fragment count, so this cannot be full.
            let _ = tx.try_send(Ok(fragment));
        }
        Self::new(rx)
    }

    /// Next fragment, or `None` once the reply is complete.
    pub async fn next_fragment(&mut self) -> Option<Result<String, LLMError>> {
        self.rx.recv().await
    }

    /// Drain the stream into one string.
    pub async fn collect_text(mut self) -> Result<String, LLMError> {
        let mut content = String::new();
        while let Some(fragment) = self.next_fragment().await {
            content.push_str(&fragment?);
        }
        Ok(content)
    }
}

impl Stream for CompletionStream {
    type Item = Result<String, LLMError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Trait implemented by every chat-completion backend
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Send messages and wait for the full completion
    async fn chat(&self, messages: Vec<ChatMessage>, model: &str)
        -> Result<ChatResponse, LLMError>;

    /// Send messages and receive the completion fragment by fragment
    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
    ) -> Result<CompletionStream, LLMError>;

    /// Backend tag this provider serves
    fn backend(&self) -> Backend;

    /// Human readable provider name
    fn name(&self) -> &str;

    /// Full completion text only
    async fn complete(&self, messages: Vec<ChatMessage>, model: &str) -> Result<String, LLMError> {
        Ok(self.chat(messages, model).await?.content)
    }
}
