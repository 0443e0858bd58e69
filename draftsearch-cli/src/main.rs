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

//! Draftsearch CLI
//!
//! Runs one search against a configured backend and prints the streamed
//! drafts as they arrive.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use draftsearch_core::{
    CancellationToken, Config, EventSink, FnSink, MctsEngine, ModelRoute, RecordingSink,
    SearchError, SearchEvent, SearchOutcome, SinkError, StatusLevel,
};
use draftsearch_llm::ProviderRegistry;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "draftsearch")]
#[command(version, about = "Draftsearch - answer questions by searching over LLM drafts", long_about = None)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long, env = "DRAFTSEARCH_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose mode
    #[arg(short, long)]
    verbose: bool,

    /// Output as JSON (machine-readable)
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for the best answer to a question
    Ask {
        /// The question
        question: String,

        /// Model id (`mcts/<backend>/<model>`) or a plain model name
        #[arg(short, long)]
        model: String,

        /// Backend for plain model names
        #[arg(long, default_value = "ollama")]
        backend: String,

        /// Rounds after the initial draft
        #[arg(long)]
        iterations: Option<usize>,

        /// Simulations per round
        #[arg(long)]
        simulations: Option<usize>,

        /// Children per node
        #[arg(long)]
        children: Option<usize>,

        /// UCT exploration weight
        #[arg(long)]
        exploration_weight: Option<f64>,

        /// Seed for deterministic node ids
        #[arg(long)]
        seed: Option<u64>,

        /// Print the tree diagram after every round
        #[arg(long)]
        show_tree: bool,
    },

    /// List the model ids the catalog advertises
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; stdout is reserved for answers
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(cli.config.clone()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Models => print_models(&config, cli.json),

        Commands::Ask {
            question,
            model,
            backend,
            iterations,
            simulations,
            children,
            exploration_weight,
            seed,
            show_tree,
        } => {
            let search = &mut config.search;
            if let Some(iterations) = iterations {
                search.max_iterations = iterations;
            }
            if let Some(simulations) = simulations {
                search.max_simulations = simulations;
            }
            if let Some(children) = children {
                search.max_children = children;
            }
            if let Some(weight) = exploration_weight {
                search.exploration_weight = weight;
            }
            if seed.is_some() {
                search.seed = seed;
            }

            let route = resolve_route(&model, &backend);
            ask(&config, route, &question, cli.json, show_tree).await
        }
    }
}

/// Full model ids carry their backend; plain names use `--backend`
fn resolve_route(model: &str, backend: &str) -> ModelRoute {
    ModelRoute::parse(model).unwrap_or_else(|_| ModelRoute {
        backend: backend.to_string(),
        model: model.to_string(),
    })
}

fn print_models(config: &Config, json: bool) -> Result<()> {
    let entries = config.catalog.entries();
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for entry in entries {
        println!("{:<40} {}", entry.id, entry.name);
    }
    Ok(())
}

#[derive(Serialize)]
struct Transcript {
    outcome: SearchOutcome,
    events: Vec<SearchEvent>,
}

async fn ask(
    config: &Config,
    route: ModelRoute,
    question: &str,
    json: bool,
    show_tree: bool,
) -> Result<()> {
    let registry = ProviderRegistry::from_config(&config.llm)?;
    let provider = registry
        .resolve(&route.backend)
        .with_context(|| format!("Backend {:?} is not usable", route.backend))?;

    let token = CancellationToken::new();
    let on_interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, finishing the current round...");
            on_interrupt.cancel();
        }
    });

    info!(model = %route.model, backend = %route.backend, "Running search");

    // JSON mode keeps the transcript for the final document; otherwise
    // events are printed as they arrive
    let recorder = Arc::new(RecordingSink::new());
    let sink: Arc<dyn EventSink> = if json {
        recorder.clone()
    } else {
        Arc::new(FnSink::new(move |event: SearchEvent| async move {
            print_event(&event, show_tree)
        }))
    };

    let outcome = match MctsEngine::new(provider, route.model.clone(), config.search)
        .with_sink(sink)
        .with_cancellation(token)
        .search(question)
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            write_partial_answer(&mut std::io::stdout().lock(), &err)?;
            return Err(err.into());
        }
    };

    if json {
        let transcript = Transcript {
            outcome,
            events: recorder.events(),
        };
        println!("{}", serde_json::to_string_pretty(&transcript)?);
    } else {
        eprintln!(
            "\n[{} rounds, {} evaluations, score {:.2}{}]",
            outcome.iterations_completed,
            outcome.evaluations,
            outcome.best_score,
            if outcome.cancelled { ", cancelled" } else { "" }
        );
    }
    Ok(())
}

/// A failed session still hands over whatever the completed rounds produced
fn write_partial_answer<W: Write>(out: &mut W, err: &SearchError) -> std::io::Result<()> {
    if let Some(best) = err.best_so_far() {
        writeln!(out, "\nBest answer so far:\n{}", best)?;
        out.flush()?;
    }
    Ok(())
}

/// Fragments go to stdout as they stream; everything else to stderr
fn print_event(event: &SearchEvent, show_tree: bool) -> Result<(), SinkError> {
    match event {
        SearchEvent::Message { content } => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(content.as_bytes())
                .and_then(|_| stdout.flush())
                .map_err(|e| SinkError::Failed(e.to_string()))?;
        }
        SearchEvent::Status(update) => {
            let marker = match update.level {
                StatusLevel::Info => "",
                StatusLevel::Error => "error: ",
            };
            eprintln!("\n== {}{}", marker, update.description);
        }
        SearchEvent::Replace { content } if show_tree => eprintln!("\n{}", content),
        SearchEvent::Replace { .. } => {}
    }
    Ok(())
}
