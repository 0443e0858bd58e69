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

//! Draftsearch HTTP server
//!
//! - `GET /health`
//! - `GET /api/v1/models`: catalog of `mcts/<backend>/<model>` ids
//! - `POST /api/v1/search`: run a search, streamed as server-sent events

pub mod api;
pub mod config;

use anyhow::Result;
use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use draftsearch_llm::ProviderRegistry;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::{health_check, list_models, search, AppState};
use config::ServerConfig;

const DEFAULT_LOG_FILTER: &str = "draftsearch_server=info,draftsearch_core=info,tower_http=info";

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/models", get(list_models))
        .route("/api/v1/search", post(search))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    if !config.server.enable_cors {
        return CorsLayer::new();
    }

    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.server.cors_origins.is_empty() {
        tracing::warn!("CORS: Allowing all origins (development mode). Set cors_origins in production!");
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .server
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("CORS: Ignoring invalid origin {:?}", origin);
                None
            }
        })
        .collect();
    tracing::info!("CORS: Allowing origins: {:?}", config.server.cors_origins);
    cors.allow_origin(AllowOrigin::list(origins))
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    tracing::info!("Starting Draftsearch Server");
    tracing::debug!("Configuration: {:#?}", config);

    config.validate()?;
    let addr = config.listen_addr()?;

    let registry = ProviderRegistry::from_config(&config.core.llm)?;
    if registry.is_empty() {
        tracing::warn!("No LLM backend configured; searches will fail until one is");
    }
    for provider in registry.list() {
        tracing::info!("Backend available: {} ({})", provider.id, provider.name);
    }

    let app = build_router(AppState::new(registry, config));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP server listening on {}", addr);
    axum::serve(listener, app).await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}
