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

use crate::events::SinkError;
use draftsearch_llm::{Backend, LLMError};
use thiserror::Error;

/// Session-level failures.
///
/// Score parse failures never show up here: they are coerced to a score of
/// 0 inside the engine.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("No question provided")]
    EmptyInput,

    #[error("Unknown backend: {0}")]
    BackendUnknown(String),

    #[error("Backend not configured: {0}")]
    BackendUnavailable(Backend),

    #[error("Invalid search configuration: {0}")]
    Config(String),

    #[error("LLM request failed: {source}")]
    Llm {
        #[source]
        source: LLMError,
        best_so_far: Option<String>,
    },

    #[error("Event sink failed: {source}")]
    Sink {
        #[source]
        source: SinkError,
        best_so_far: Option<String>,
    },
}

impl SearchError {
    /// Best answer captured by completed rounds before the failure, if any
    pub fn best_so_far(&self) -> Option<&str> {
        match self {
            SearchError::Llm { best_so_far, .. } | SearchError::Sink { best_so_far, .. } => {
                best_so_far.as_deref()
            }
            _ => None,
        }
    }

    pub(crate) fn with_best_so_far(self, best: Option<String>) -> Self {
        match self {
            SearchError::Llm { source, .. } => SearchError::Llm {
                source,
                best_so_far: best,
            },
            SearchError::Sink { source, .. } => SearchError::Sink {
                source,
                best_so_far: best,
            },
            other => other,
        }
    }

    /// True when the caller sent something unusable (as opposed to a backend
    /// or consumer failure)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SearchError::EmptyInput
                | SearchError::BackendUnknown(_)
                | SearchError::BackendUnavailable(_)
                | SearchError::Config(_)
        )
    }
}

impl From<LLMError> for SearchError {
    fn from(err: LLMError) -> Self {
        match err {
            LLMError::BackendUnknown(tag) => SearchError::BackendUnknown(tag),
            LLMError::BackendUnavailable(backend) => SearchError::BackendUnavailable(backend),
            source => SearchError::Llm {
                source,
                best_so_far: None,
            },
        }
    }
}

impl From<SinkError> for SearchError {
    fn from(source: SinkError) -> Self {
        SearchError::Sink {
            source,
            best_so_far: None,
        }
    }
}
