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

//! Progress events emitted by a search session.
//!
//! Events are pushed one at a time into an [`EventSink`] and each emission
//! is awaited before the engine continues, so a slow consumer slows the
//! search down and the displayed progress never runs ahead of the work.
//!
//! Wire shape (JSON):
//!
//! ```text
//! {"type": "message", "data": {"content": "..."}}
//! {"type": "status",  "data": {"status": "in_progress", "level": "info", "description": "Iteration 1/2", "done": false}}
//! {"type": "replace", "data": {"content": "..."}}
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SearchEvent {
    /// Content fragment, appended to whatever was displayed before
    Message { content: String },
    /// Progress label
    Status(StatusUpdate),
    /// Full content snapshot replacing what was displayed before
    Replace { content: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: StatusState,
    pub level: StatusLevel,
    pub description: String,
    pub done: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusState {
    InProgress,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    /// The session ended on an LLM failure
    Error,
}

impl SearchEvent {
    pub fn message(content: impl Into<String>) -> Self {
        SearchEvent::Message {
            content: content.into(),
        }
    }

    pub fn status(level: StatusLevel, description: impl Into<String>, done: bool) -> Self {
        SearchEvent::Status(StatusUpdate {
            status: if done {
                StatusState::Complete
            } else {
                StatusState::InProgress
            },
            level,
            description: description.into(),
            done,
        })
    }

    pub fn replace(content: impl Into<String>) -> Self {
        SearchEvent::Replace {
            content: content.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SearchEvent::Message { .. } => "message",
            SearchEvent::Status(_) => "status",
            SearchEvent::Replace { .. } => "replace",
        }
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Event consumer disconnected")]
    Closed,

    #[error("Event sink failed: {0}")]
    Failed(String),
}

/// Consumer of search events
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: SearchEvent) -> Result<(), SinkError>;
}

/// Forwards events into a bounded channel.
///
/// `emit` waits for channel capacity, so the channel size bounds how far the
/// engine can run ahead of the reader. A dropped receiver fails the emission.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<SearchEvent>,
}

impl ChannelSink {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<SearchEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    pub fn from_sender(tx: mpsc::Sender<SearchEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn emit(&self, event: SearchEvent) -> Result<(), SinkError> {
        self.tx.send(event).await.map_err(|_| SinkError::Closed)
    }
}

/// Adapts an async closure into a sink
pub struct FnSink<F> {
    f: F,
}

impl<F> FnSink<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> EventSink for FnSink<F>
where
    F: Fn(SearchEvent) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), SinkError>> + Send,
{
    async fn emit(&self, event: SearchEvent) -> Result<(), SinkError> {
        (self.f)(event).await
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SearchEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SearchEvent> {
        self.events.lock().clone()
    }

    /// All `message` fragments concatenated in emission order
    pub fn message_text(&self) -> String {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                SearchEvent::Message { content } => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<StatusUpdate> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                SearchEvent::Status(update) => Some(update.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn emit(&self, event: SearchEvent) -> Result<(), SinkError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Engine-side handle; drops events when no sink is attached.
#[derive(Clone, Default)]
pub(crate) struct Emitter {
    sink: Option<Arc<dyn EventSink>>,
}

impl Emitter {
    pub(crate) fn new(sink: Option<Arc<dyn EventSink>>) -> Self {
        Self { sink }
    }

    async fn emit(&self, event: SearchEvent) -> Result<(), SinkError> {
        match &self.sink {
            Some(sink) => sink.emit(event).await,
            None => Ok(()),
        }
    }

    pub(crate) async fn message(&self, content: &str) -> Result<(), SinkError> {
        self.emit(SearchEvent::message(content)).await
    }

    pub(crate) async fn progress(&self, description: &str) -> Result<(), SinkError> {
        self.emit(SearchEvent::status(StatusLevel::Info, description, false))
            .await
    }

    pub(crate) async fn done(&self) -> Result<(), SinkError> {
        self.emit(SearchEvent::status(StatusLevel::Info, "Done", true))
            .await
    }

    pub(crate) async fn failure(&self, description: &str) -> Result<(), SinkError> {
        self.emit(SearchEvent::status(StatusLevel::Error, description, true))
            .await
    }

    pub(crate) async fn replace(&self, content: String) -> Result<(), SinkError> {
        self.emit(SearchEvent::replace(content)).await
    }
}
