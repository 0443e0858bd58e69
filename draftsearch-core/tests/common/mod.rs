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

//! Scripted provider used by the engine tests.

#![allow(dead_code)]

use async_trait::async_trait;
use draftsearch_llm::{
    Backend, ChatMessage, ChatResponse, CompletionStream, LLMError, LLMProvider,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Initial,
    Critique,
    Revise,
    Evaluate,
}

impl PromptKind {
    fn of(prompt: &str) -> Self {
        if prompt.contains("Rate the answer") {
            PromptKind::Evaluate
        } else if prompt.contains("revised answer") {
            PromptKind::Revise
        } else if prompt.contains("Suggest how") {
            PromptKind::Critique
        } else {
            PromptKind::Initial
        }
    }
}

/// Answers by prompt kind. Revisions get a running number appended when
/// `number_revisions` is set so that tree contents differ.
pub struct ScriptedProvider {
    backend: Backend,
    draft: String,
    critique: String,
    revision: String,
    score: String,
    number_revisions: bool,
    fail_on_evaluation: Option<usize>,
    evaluations: AtomicUsize,
    revisions: AtomicUsize,
    calls: Mutex<Vec<PromptKind>>,
}

impl ScriptedProvider {
    pub fn new(draft: &str, revision: &str, score: &str) -> Self {
        Self {
            backend: Backend::Ollama,
            draft: draft.to_string(),
            critique: "Show the working.".to_string(),
            revision: revision.to_string(),
            score: score.to_string(),
            number_revisions: false,
            fail_on_evaluation: None,
            evaluations: AtomicUsize::new(0),
            revisions: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn numbered_revisions(mut self) -> Self {
        self.number_revisions = true;
        self
    }

    /// Fail the `n`th evaluation call (1-based) with a 500
    pub fn failing_evaluation(mut self, n: usize) -> Self {
        self.fail_on_evaluation = Some(n);
        self
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn calls(&self) -> Vec<PromptKind> {
        self.calls.lock().clone()
    }

    fn reply(&self, messages: &[ChatMessage]) -> Result<String, LLMError> {
        let prompt = messages
            .last()
            .map(|message| message.content.as_str())
            .unwrap_or_default();
        let kind = PromptKind::of(prompt);
        self.calls.lock().push(kind);

        match kind {
            PromptKind::Initial => Ok(self.draft.clone()),
            PromptKind::Critique => Ok(self.critique.clone()),
            PromptKind::Revise => {
                let n = self.revisions.fetch_add(1, Ordering::SeqCst) + 1;
                if self.number_revisions {
                    Ok(format!("{} #{}", self.revision, n))
                } else {
                    Ok(self.revision.clone())
                }
            }
            PromptKind::Evaluate => {
                let n = self.evaluations.fetch_add(1, Ordering::SeqCst) + 1;
                if self.fail_on_evaluation == Some(n) {
                    return Err(LLMError::ApiError {
                        status: 500,
                        body: "internal error".to_string(),
                    });
                }
                Ok(self.score.clone())
            }
        }
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn chat(&self, messages: Vec<ChatMessage>, model: &str) -> Result<ChatResponse, LLMError> {
        let content = self.reply(&messages)?;
        Ok(ChatResponse {
            content,
            provider: "scripted".to_string(),
            model: model.to_string(),
            response_model: None,
            response_id: None,
            input_tokens: None,
            output_tokens: None,
            finish_reason: Some("stop".to_string()),
            duration_ms: 0,
        })
    }

    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        _model: &str,
    ) -> Result<CompletionStream, LLMError> {
        let content = self.reply(&messages)?;

        // Two fragments, split on a char boundary
        let mid = content
            .char_indices()
            .map(|(i, _)| i)
            .nth(content.chars().count() / 2)
            .unwrap_or(content.len());
        let (head, tail) = content.split_at(mid);
        let fragments: Vec<String> = [head, tail]
            .into_iter()
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect();
        Ok(CompletionStream::from_fragments(fragments))
    }

    fn backend(&self) -> Backend {
        self.backend
    }

    fn name(&self) -> &str {
        "Scripted"
    }
}
