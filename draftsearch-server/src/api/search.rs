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

//! POST /api/v1/search
//!
//! Streaming responses are server-sent events. Each engine event becomes one
//! SSE event named after its kind (`message`, `status`, `replace`) whose data
//! is the event JSON. The stream ends with a single `result` event carrying
//! the [`SearchOutcome`], or an `error` event if the session failed.
//!
//! Events flow through one bounded channel, so the order is the order the
//! engine produced them in and a slow client slows the search down. When the
//! client disconnects the next emission fails and the session stops.

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use draftsearch_core::{
    generate_title, question_from_messages, ChannelSink, MctsEngine, ModelRoute, SearchError,
    SearchEvent, SearchOutcome, TaskKind,
};
use draftsearch_llm::ChatMessage;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use crate::api::{ApiError, AppState, ErrorResponse};

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    /// `[prefix.]mcts/<backend>/<model>`
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default = "default_stream")]
    pub stream: bool,
    #[serde(default)]
    pub task: TaskKind,
}

fn default_stream() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TitleResponse {
    pub content: String,
}

pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Response, ApiError> {
    let route = ModelRoute::parse(&request.model)?;
    let provider = state
        .registry
        .resolve(&route.backend)
        .map_err(SearchError::from)?;
    let question = question_from_messages(&request.messages)?;

    if request.task == TaskKind::TitleGeneration {
        info!(model = %route.model, backend = %route.backend, "Generating title");
        let content = generate_title(provider.as_ref(), &route.model, request.messages).await?;
        return Ok(Json(TitleResponse { content }).into_response());
    }

    let search_config = state.config.core.search;
    let engine = MctsEngine::new(provider, route.model.clone(), search_config);

    if !request.stream {
        let outcome = engine.search(&question).await?;
        return Ok(Json(outcome).into_response());
    }

    let (sink, rx) = ChannelSink::new(state.config.server.event_buffer);
    let (result_tx, result_rx) = oneshot::channel();

    tokio::spawn(async move {
        let engine = engine.with_sink(Arc::new(sink));
        let result = engine.search(&question).await;
        // Close the event channel before the final frame goes out
        drop(engine);

        if let Err(err) = &result {
            warn!(error = %err, "Streaming search failed");
        }
        let _ = result_tx.send(result);
    });

    Ok(Sse::new(event_stream(rx, result_rx))
        .keep_alive(KeepAlive::default())
        .into_response())
}

fn event_stream(
    rx: tokio::sync::mpsc::Receiver<SearchEvent>,
    result_rx: oneshot::Receiver<Result<SearchOutcome, SearchError>>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let events =
        ReceiverStream::new(rx).map(|event| Ok::<_, Infallible>(to_sse(event.kind(), &event)));

    let last = stream::once(async move {
        let frame = match result_rx.await {
            Ok(Ok(outcome)) => to_sse("result", &outcome),
            Ok(Err(err)) => to_sse(
                "error",
                &StreamError {
                    error: err.to_string(),
                    best_so_far: err.best_so_far().map(str::to_string),
                },
            ),
            Err(_) => to_sse(
                "error",
                &ErrorResponse {
                    error: "Search task ended without a result".to_string(),
                },
            ),
        };
        Ok::<_, Infallible>(frame)
    });

    events.chain(last)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StreamError {
    pub error: String,
    pub best_so_far: Option<String>,
}

fn to_sse<T: Serialize>(name: &str, payload: &T) -> Event {
    match serde_json::to_string(payload) {
        Ok(data) => Event::default().event(name).data(data),
        Err(e) => Event::default()
            .event("error")
            .data(format!("{{\"error\":\"unserializable {} event: {}\"}}", name, e)),
    }
}
