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

//! Monte Carlo Tree Search over answer drafts.
//!
//! A session runs in three phases:
//!
//! 1. **Initializing**: one non-streaming completion produces the root draft,
//!    which is then scored and backpropagated (iteration 0).
//! 2. **Iterating**: `max_iterations` rounds of `max_simulations` passes, each
//!    pass being select, expand (critique then revise), simulate (score 1-10)
//!    and backpropagate. After each round the most-visited leaf is compared
//!    against the best answer so far.
//! 3. **Terminated**: the best answer is emitted and returned.
//!
//! Everything runs on the caller's task. The tree is only touched between
//! awaits, so it needs no locking. Every LLM call inside the loop streams and
//! each fragment is forwarded to the sink before the next one is read.

use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::events::{Emitter, EventSink};
use crate::prompts;
use crate::tree::{content_preview, NodeIndex, SearchTree, TreeSnapshot};
use draftsearch_llm::{ChatMessage, LLMProvider, ProviderRegistry};
use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::SeedableRng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

static SCORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").expect("valid score pattern"));

/// Result of a finished (or cancelled) session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub session_id: Uuid,
    pub answer: String,
    /// Mean score of the node the answer came from
    pub best_score: f64,
    /// Rounds that ran to completion, not counting the root evaluation
    pub iterations_completed: usize,
    /// Number of scoring calls, root included
    pub evaluations: usize,
    pub cancelled: bool,
    pub tree: TreeSnapshot,
}

pub struct MctsEngine {
    provider: Arc<dyn LLMProvider>,
    model: String,
    config: SearchConfig,
    emitter: Emitter,
    cancel: CancellationToken,
}

impl MctsEngine {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        model: impl Into<String>,
        config: SearchConfig,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            config,
            emitter: Emitter::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.emitter = Emitter::new(Some(sink));
        self
    }

    /// Token checked between rounds. Cancelling it ends the session early
    /// with the best answer found so far.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub async fn search(&self, question: &str) -> Result<SearchOutcome, SearchError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(SearchError::EmptyInput);
        }
        self.config.validate()?;

        let session_id = Uuid::new_v4();
        let span = info_span!(
            "mcts_session",
            %session_id,
            model = %self.model,
            backend = %self.provider.backend()
        );

        self.run(session_id, question).instrument(span).await
    }

    async fn run(&self, session_id: Uuid, question: &str) -> Result<SearchOutcome, SearchError> {
        let result = self.run_session(session_id, question).await;

        // A broken sink cannot be told about its own failure
        if let Err(err @ SearchError::Llm { .. }) = &result {
            if let Err(sink_err) = self.emitter.failure(&err.to_string()).await {
                debug!(error = %sink_err, "Could not report search failure");
            }
        }
        result
    }

    async fn run_session(
        &self,
        session_id: Uuid,
        question: &str,
    ) -> Result<SearchOutcome, SearchError> {
        info!(
            iterations = self.config.max_iterations,
            simulations = self.config.max_simulations,
            children = self.config.max_children,
            "Starting search"
        );

        let draft = self
            .provider
            .complete(
                vec![ChatMessage::user(prompts::initial(question))],
                &self.model,
            )
            .await?;

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let tree = SearchTree::new(draft, self.config.node_settings(), &mut rng);

        let mut session = Session {
            engine: self,
            question,
            rng,
            tree,
            processed: HashSet::new(),
            best: None,
            rounds: Vec::new(),
            evaluations: 0,
        };

        match session.run().await {
            Ok((iterations_completed, cancelled)) => {
                let (answer, best_score) = session.best_or_root();
                info!(
                    iterations_completed,
                    evaluations = session.evaluations,
                    nodes = session.tree.len(),
                    best_score,
                    cancelled,
                    "Search finished"
                );

                Ok(SearchOutcome {
                    session_id,
                    answer,
                    best_score,
                    iterations_completed,
                    evaluations: session.evaluations,
                    cancelled,
                    tree: session.tree.snapshot(),
                })
            }
            Err(err) => {
                error!(error = %err, "Search aborted");
                Err(err.with_best_so_far(Some(session.best_or_root().0)))
            }
        }
    }

    /// Stream a completion, forwarding each fragment as a `message` event
    async fn generate(&self, prompt: String) -> Result<String, SearchError> {
        let mut stream = self
            .provider
            .stream_chat(vec![ChatMessage::user(prompt)], &self.model)
            .await?;

        let mut content = String::new();
        while let Some(fragment) = stream.next_fragment().await {
            let fragment = fragment?;
            self.emitter.message(&fragment).await?;
            content.push_str(&fragment);
        }
        Ok(content)
    }
}

/// Resolve `backend` in `registry` and run one search.
///
/// Backend resolution happens before anything else, so an unknown tag fails
/// without any LLM call or tree.
pub async fn search_with(
    registry: &ProviderRegistry,
    backend: &str,
    model: &str,
    question: &str,
    config: SearchConfig,
    sink: Option<Arc<dyn EventSink>>,
) -> Result<SearchOutcome, SearchError> {
    let provider = registry.resolve(backend)?;

    let mut engine = MctsEngine::new(provider, model, config);
    if let Some(sink) = sink {
        engine = engine.with_sink(sink);
    }
    engine.search(question).await
}

/// First integer in an evaluation reply. Anything unparseable scores 0.
pub fn parse_score(reply: &str) -> u32 {
    let parsed = SCORE
        .find(reply)
        .and_then(|digits| digits.as_str().parse::<u32>().ok());

    match parsed {
        Some(score) => score,
        None => {
            error!("Failed to parse score from result: {:?}", reply);
            0
        }
    }
}

#[derive(Debug, Clone)]
struct BestAnswer {
    content: String,
    score: f64,
}

/// Nodes scored during one round. Round 0 is the root evaluation.
#[derive(Debug, Clone)]
struct RoundRecord {
    iteration: usize,
    scored: Vec<(NodeIndex, u32)>,
}

struct Session<'a> {
    engine: &'a MctsEngine,
    question: &'a str,
    rng: StdRng,
    tree: SearchTree,
    processed: HashSet<NodeIndex>,
    best: Option<BestAnswer>,
    rounds: Vec<RoundRecord>,
    evaluations: usize,
}

impl Session<'_> {
    /// Returns the number of completed rounds and whether the session was
    /// cancelled.
    async fn run(&mut self) -> Result<(usize, bool), SearchError> {
        let engine = self.engine;
        let emitter = &engine.emitter;
        let config = engine.config;

        let root_score = self.simulate(SearchTree::ROOT).await?;
        self.rounds.push(RoundRecord {
            iteration: 0,
            scored: vec![(SearchTree::ROOT, root_score)],
        });
        emitter
            .replace(render_progress(&self.tree, &self.rounds, Some(SearchTree::ROOT)))
            .await?;

        let mut completed = 0;
        let mut cancelled = false;
        for iteration in 1..=config.max_iterations {
            if engine.cancel.is_cancelled() {
                info!(completed, "Search cancelled");
                cancelled = true;
                break;
            }

            debug!("MCTS Iteration {}/{}", iteration, config.max_iterations);
            emitter
                .progress(&format!("Iteration {}/{}", iteration, config.max_iterations))
                .await?;

            let mut record = RoundRecord {
                iteration,
                scored: Vec::new(),
            };
            let mut selected = None;

            for _ in 0..config.max_simulations {
                let mut leaf = self.tree.select_leaf(SearchTree::ROOT);
                if !self.tree.is_fully_expanded(leaf) {
                    leaf = self.expand(leaf).await?;
                }
                selected = Some(leaf);

                if self.processed.contains(&leaf) {
                    debug!(node = %self.tree.node(leaf).id(), "Node already evaluated, skipping");
                    continue;
                }

                let score = self.simulate(leaf).await?;
                record.scored.push((leaf, score));
            }

            if record.scored.is_empty() {
                debug!(iteration, "Round produced no new evaluations");
            }
            self.rounds.push(record);
            self.update_best();
            completed = iteration;

            emitter
                .replace(render_progress(&self.tree, &self.rounds, selected))
                .await?;
        }

        let (answer, _) = self.best_or_root();
        emitter.message(&format!("Best Answer:\n{}", answer)).await?;
        emitter.done().await?;

        Ok((completed, cancelled))
    }

    async fn expand(&mut self, parent: NodeIndex) -> Result<NodeIndex, SearchError> {
        let content = self.tree.node(parent).content().to_string();

        let critique = self
            .engine
            .generate(prompts::critique(self.question, &content))
            .await?;
        let revised = self
            .engine
            .generate(prompts::revise(self.question, &content, &critique))
            .await?;

        let child = self.tree.add_child(
            parent,
            revised,
            self.engine.config.node_settings(),
            &mut self.rng,
        );
        debug!(
            parent = %self.tree.node(parent).id(),
            child = %self.tree.node(child).id(),
            "Expanded node"
        );
        Ok(child)
    }

    /// Score `node` and fold the score into it and its ancestors
    async fn simulate(&mut self, node: NodeIndex) -> Result<u32, SearchError> {
        let content = self.tree.node(node).content().to_string();
        let reply = self
            .engine
            .generate(prompts::evaluate(self.question, &content))
            .await?;

        let score = parse_score(&reply);
        self.tree.backpropagate(node, f64::from(score));
        self.processed.insert(node);
        self.evaluations += 1;

        debug!(node = %self.tree.node(node).id(), score, "Evaluated node");
        Ok(score)
    }

    /// Replace the best answer only on strict improvement
    fn update_best(&mut self) {
        let candidate = self.tree.best_child(SearchTree::ROOT);
        let score = self.tree.mean_score(candidate);

        let improved = self.best.as_ref().map_or(true, |best| score > best.score);
        if improved {
            debug!(node = %self.tree.node(candidate).id(), score, "New best answer");
            self.best = Some(BestAnswer {
                content: self.tree.node(candidate).content().to_string(),
                score,
            });
        }
    }

    /// Best answer so far, or the root draft when no round has completed
    fn best_or_root(&self) -> (String, f64) {
        match &self.best {
            Some(best) => (best.content.clone(), best.score),
            None => (
                self.tree.root().content().to_string(),
                self.tree.mean_score(SearchTree::ROOT),
            ),
        }
    }
}

/// Mermaid diagram of the tree followed by one collapsible block per round
fn render_progress(
    tree: &SearchTree,
    rounds: &[RoundRecord],
    selected: Option<NodeIndex>,
) -> String {
    let mut out = format!("```mermaid\n{}```\n", tree.to_mermaid(selected));

    for round in rounds {
        let title = if round.iteration == 0 {
            "Initial draft".to_string()
        } else {
            format!("Iteration {}", round.iteration)
        };
        let _ = write!(out, "\n<details>\n<summary>{}</summary>\n\n", title);

        if round.scored.is_empty() {
            out.push_str("No new evaluations\n");
        }
        for &(index, score) in &round.scored {
            let node = tree.node(index);
            let _ = writeln!(
                out,
                "- `{}` scored {}: {}",
                node.id(),
                score,
                content_preview(node.content())
            );
        }
        out.push_str("</details>\n");
    }
    out
}
