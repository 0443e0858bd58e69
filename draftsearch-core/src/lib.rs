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

//! Draftsearch Core
//!
//! Answer generation by Monte Carlo Tree Search over LLM drafts. A session
//! asks a model for a first answer, then repeatedly critiques, revises and
//! scores drafts, growing a tree whose most-visited leaf becomes the answer.
//!
//! ## Modules
//!
//! - **tree**: arena search tree, UCT scoring, mermaid rendering
//! - **engine**: the select/expand/simulate/backpropagate loop
//! - **events**: progress events and the sinks that consume them
//! - **route**: `mcts/<backend>/<model>` identifiers and the model catalog
//! - **config**: search parameters and TOML/env loading
//! - **prompts**: initial, critique, revise and evaluate prompts
//! - **tasks**: question extraction and title generation
//! - **error**: `SearchError` and its best-so-far answer
//!
//! ## Example
//!
//! ```no_run
//! use draftsearch_core::{search_with, Config, RecordingSink};
//! use draftsearch_llm::ProviderRegistry;
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::from_env();
//! let registry = ProviderRegistry::from_config(&config.llm)?;
//! let sink = Arc::new(RecordingSink::new());
//!
//! let outcome = search_with(
//!     &registry,
//!     "ollama",
//!     "llama3.2:3b",
//!     "Why is the sky blue?",
//!     config.search,
//!     Some(sink.clone()),
//! )
//! .await?;
//! println!("{}", outcome.answer);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod prompts;
pub mod route;
pub mod tasks;
pub mod tree;

pub use config::{Config, SearchConfig};
pub use engine::{parse_score, search_with, MctsEngine, SearchOutcome};
pub use error::SearchError;
pub use events::{
    ChannelSink, EventSink, FnSink, RecordingSink, SearchEvent, SinkError, StatusLevel,
    StatusState, StatusUpdate,
};
pub use route::{ModelCatalog, ModelEntry, ModelRoute, RouteError};
pub use tasks::{generate_title, question_from_messages, TaskKind};
pub use tree::{NodeId, NodeIndex, NodeSettings, SearchTree, TreeSnapshot};

pub use tokio_util::sync::CancellationToken;
