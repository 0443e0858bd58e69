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

use crate::sse::{delta_content, SseDecoder, SseFrame};
use crate::{Backend, ChatMessage, ChatResponse, CompletionStream, LLMError, LLMProvider};
use futures::StreamExt;
use serde_json::{json, Value};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Client for any `/chat/completions` endpoint speaking the OpenAI wire
/// format. Both providers below are thin wrappers around it.
#[derive(Clone)]
struct ChatCompletionsClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    provider: &'static str,
}

impl ChatCompletionsClient {
    fn request(&self, messages: &[ChatMessage], model: &str, stream: bool) -> reqwest::RequestBuilder {
        let body = json!({
            "model": model,
            "messages": messages,
            "stream": stream,
        });

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }
        request
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        model: &str,
        stream: bool,
    ) -> Result<reqwest::Response, LLMError> {
        let response = self.request(messages, model, stream).send().await?;

        let status = response.status();
        if !status.is_success() {
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(LLMError::RateLimitExceeded);
            }
            let body = response.text().await?;
            return Err(LLMError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn chat(&self, messages: Vec<ChatMessage>, model: &str) -> Result<ChatResponse, LLMError> {
        let start = Instant::now();
        let response = self.send(&messages, model, false).await?;
        let json: Value = response.json().await?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LLMError::InvalidResponse("Missing content".to_string()))?
            .to_string();

        let usage = &json["usage"];

        Ok(ChatResponse {
            content,
            provider: self.provider.to_string(),
            model: model.to_string(),
            response_model: json["model"].as_str().map(|s| s.to_string()),
            response_id: json["id"].as_str().map(|s| s.to_string()),
            input_tokens: usage["prompt_tokens"].as_u64().map(|t| t as u32),
            output_tokens: usage["completion_tokens"].as_u64().map(|t| t as u32),
            finish_reason: json["choices"][0]["finish_reason"]
                .as_str()
                .map(|s| s.to_string()),
            duration_ms: start.elapsed().as_millis() as u32,
        })
    }

    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
    ) -> Result<CompletionStream, LLMError> {
        let response = self.send(&messages, model, true).await?;
        let (tx, stream) = CompletionStream::channel();
        let provider = self.provider;

        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut decoder = SseDecoder::new();

            while let Some(chunk) = body.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.send(Err(LLMError::Http(e))).await;
                        return;
                    }
                };

                for frame in decoder.push(&bytes) {
                    match forward_frame(provider, frame, &tx).await {
                        Forward::Continue => {}
                        Forward::Finished | Forward::Disconnected => return,
                    }
                }
            }

            if let Some(frame) = decoder.finish() {
                match forward_frame(provider, frame, &tx).await {
                    Forward::Continue => {}
                    Forward::Finished | Forward::Disconnected => return,
                }
            }

            // Body ended without the terminator
            error!(provider = %provider, "Completion stream ended before [DONE]");
            let _ = tx.send(Err(LLMError::StreamClosed)).await;
        });

        Ok(stream)
    }
}

enum Forward {
    Continue,
    /// `[DONE]` arrived
    Finished,
    /// The consumer dropped the stream
    Disconnected,
}

/// Push one decoded frame to the consumer.
async fn forward_frame(
    provider: &str,
    frame: SseFrame,
    tx: &mpsc::Sender<Result<String, LLMError>>,
) -> Forward {
    match frame {
        SseFrame::Done => Forward::Finished,
        SseFrame::Data(payload) => match delta_content(&payload) {
            Ok(Some(content)) => match tx.send(Ok(content)).await {
                Ok(()) => Forward::Continue,
                Err(_) => Forward::Disconnected,
            },
            Ok(None) => Forward::Continue,
            Err(_) => {
                let preview: String = payload.chars().take(100).collect();
                error!(provider = %provider, "ChunkDecodeError: unable to parse \"{}\"", preview);
                Forward::Continue
            }
        },
    }
}

// OpenAI Provider
pub struct OpenAIProvider {
    inner: ChatCompletionsClient,
}

impl OpenAIProvider {
    pub fn new(api_key: String, base_url: &str, client: reqwest::Client) -> Self {
        let endpoint = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        debug!(%endpoint, "Configured OpenAI provider");
        Self {
            inner: ChatCompletionsClient {
                client,
                endpoint,
                api_key: Some(api_key),
                provider: "openai",
            },
        }
    }
}

#[async_trait::async_trait]
impl LLMProvider for OpenAIProvider {
    async fn chat(&self, messages: Vec<ChatMessage>, model: &str) -> Result<ChatResponse, LLMError> {
        self.inner.chat(messages, model).await
    }

    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
    ) -> Result<CompletionStream, LLMError> {
        self.inner.stream_chat(messages, model).await
    }

    fn backend(&self) -> Backend {
        Backend::OpenAI
    }

    fn name(&self) -> &str {
        "OpenAI"
    }
}

// Ollama Provider (Local)
//
// Talks to Ollama's OpenAI-compatible endpoint so that streaming replies use
// the same `data:` framing as OpenAI.
pub struct OllamaProvider {
    inner: ChatCompletionsClient,
}

impl OllamaProvider {
    pub fn new(base_url: &str, client: reqwest::Client) -> Self {
        let endpoint = format!("{}/v1/chat/completions", base_url.trim_end_matches('/'));
        debug!(%endpoint, "Configured Ollama provider");
        Self {
            inner: ChatCompletionsClient {
                client,
                endpoint,
                api_key: None,
                provider: "ollama",
            },
        }
    }
}

#[async_trait::async_trait]
impl LLMProvider for OllamaProvider {
    async fn chat(&self, messages: Vec<ChatMessage>, model: &str) -> Result<ChatResponse, LLMError> {
        self.inner.chat(messages, model).await
    }

    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
    ) -> Result<CompletionStream, LLMError> {
        self.inner.stream_chat(messages, model).await
    }

    fn backend(&self) -> Backend {
        Backend::Ollama
    }

    fn name(&self) -> &str {
        "Ollama"
    }
}
