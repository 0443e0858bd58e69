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
use draftsearch_llm::{ChatMessage, LLMProvider};
use serde::{Deserialize, Serialize};

/// What a chat request asks for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    #[default]
    Search,
    /// Conversation title; answered with a single chat call, no search
    TitleGeneration,
}

/// The question is the last message of the conversation
pub fn question_from_messages(messages: &[ChatMessage]) -> Result<String, SearchError> {
    let question = messages
        .last()
        .map(|message| message.content.trim())
        .unwrap_or_default();

    if question.is_empty() {
        return Err(SearchError::EmptyInput);
    }
    Ok(question.to_string())
}

pub async fn generate_title(
    provider: &dyn LLMProvider,
    model: &str,
    messages: Vec<ChatMessage>,
) -> Result<String, SearchError> {
    let content = provider.complete(messages, model).await?;
    tracing::debug!(model, "Generated title");
    Ok(format!("Title: {}", content))
}
