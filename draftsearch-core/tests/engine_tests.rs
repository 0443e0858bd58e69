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

mod common;

use common::{PromptKind, ScriptedProvider};
use draftsearch_core::{
    search_with, CancellationToken, ChannelSink, EventSink, FnSink, MctsEngine, RecordingSink,
    SearchConfig, SearchError, SearchEvent, SinkError, StatusLevel,
};
use draftsearch_llm::{Backend, LLMError, ProviderRegistry};
use std::sync::Arc;

fn config(iterations: usize, simulations: usize, children: usize) -> SearchConfig {
    SearchConfig {
        max_iterations: iterations,
        max_simulations: simulations,
        max_children: children,
        seed: Some(7),
        ..SearchConfig::default()
    }
}

#[tokio::test]
async fn test_two_plus_two_single_round() {
    let provider = Arc::new(ScriptedProvider::new("4", "4", "10"));
    let engine = MctsEngine::new(provider.clone(), "test-model", config(1, 1, 1));

    let outcome = engine.search("What is 2+2?").await.unwrap();

    assert_eq!(outcome.answer, "4");
    assert_eq!(outcome.best_score, 10.0);
    assert_eq!(outcome.iterations_completed, 1);
    assert_eq!(outcome.evaluations, 2);
    assert!(!outcome.cancelled);

    let nodes = &outcome.tree.nodes;
    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[0].visits, 2);
    assert_eq!(nodes[0].value, 20.0);
    assert_eq!(nodes[1].parent, Some(0));
    assert_eq!(nodes[1].visits, 1);
    assert_eq!(nodes[1].value, 10.0);
    assert_eq!(outcome.tree.best, 1);

    assert_eq!(
        provider.calls(),
        vec![
            PromptKind::Initial,
            PromptKind::Evaluate,
            PromptKind::Critique,
            PromptKind::Revise,
            PromptKind::Evaluate,
        ]
    );
}

#[tokio::test]
async fn test_non_numeric_score_counts_as_zero() {
    let provider = Arc::new(ScriptedProvider::new("draft", "revised", "n/a"));
    let engine = MctsEngine::new(provider, "test-model", config(1, 1, 1));

    let outcome = engine.search("What is 2+2?").await.unwrap();

    assert_eq!(outcome.best_score, 0.0);
    assert_eq!(outcome.tree.nodes[0].visits, 2);
    assert_eq!(outcome.tree.nodes[0].value, 0.0);
    assert_eq!(outcome.tree.nodes[1].visits, 1);
    assert_eq!(outcome.answer, "revised");
}

#[tokio::test]
async fn test_unknown_backend_fails_before_any_call() {
    let provider = Arc::new(ScriptedProvider::new("4", "4", "10"));
    let registry = ProviderRegistry::new();
    registry.register(provider.clone());

    let err = search_with(
        &registry,
        "grpc",
        "test-model",
        "What is 2+2?",
        config(1, 1, 1),
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, SearchError::BackendUnknown(ref tag) if tag == "grpc"));
    assert!(err.is_client_error());
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_unconfigured_backend() {
    let registry = ProviderRegistry::new();
    registry.register(Arc::new(
        ScriptedProvider::new("4", "4", "10").with_backend(Backend::Ollama),
    ));

    let err = search_with(&registry, "openai", "gpt-4o", "Q?", config(1, 1, 1), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::BackendUnavailable(Backend::OpenAI)));
}

#[tokio::test]
async fn test_search_with_resolves_registered_backend() {
    let registry = ProviderRegistry::new();
    registry.register(Arc::new(ScriptedProvider::new("4", "4", "10")));
    let sink = Arc::new(RecordingSink::new());

    let outcome = search_with(
        &registry,
        "OLLAMA",
        "llama3.2:3b",
        "What is 2+2?",
        config(1, 1, 1),
        Some(sink.clone()),
    )
    .await
    .unwrap();

    assert_eq!(outcome.answer, "4");
    assert!(!sink.events().is_empty());
}

#[tokio::test]
async fn test_sink_failure_on_first_call_fails_session() {
    let provider = Arc::new(ScriptedProvider::new("4", "4", "10"));
    let sink = FnSink::new(|_event: SearchEvent| async {
        Err::<(), _>(SinkError::Failed("consumer went away".to_string()))
    });
    let engine = MctsEngine::new(provider.clone(), "test-model", config(2, 2, 2))
        .with_sink(Arc::new(sink));

    let err = engine.search("What is 2+2?").await.unwrap_err();

    match err {
        SearchError::Sink { source, .. } => {
            assert!(matches!(source, SinkError::Failed(ref msg) if msg == "consumer went away"))
        }
        other => panic!("expected sink error, got {other:?}"),
    }
    // Stopped at the first emitted fragment of the root evaluation
    assert_eq!(
        provider.calls(),
        vec![PromptKind::Initial, PromptKind::Evaluate]
    );
}

#[tokio::test]
async fn test_empty_question_is_rejected() {
    let provider = Arc::new(ScriptedProvider::new("4", "4", "10"));
    let engine = MctsEngine::new(provider.clone(), "test-model", config(1, 1, 1));

    for question in ["", "   \n\t"] {
        let err = engine.search(question).await.unwrap_err();
        assert!(matches!(err, SearchError::EmptyInput));
    }
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let provider = Arc::new(ScriptedProvider::new("4", "4", "10"));
    let bad = SearchConfig {
        exploration_weight: f64::NAN,
        ..config(1, 1, 1)
    };
    let err = MctsEngine::new(provider, "m", bad)
        .search("Q?")
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::Config(_)));
}

#[tokio::test]
async fn test_identical_runs_build_identical_trees() {
    let run = || async {
        let provider = Arc::new(ScriptedProvider::new("draft", "revision", "7").numbered_revisions());
        MctsEngine::new(provider, "test-model", config(2, 2, 2))
            .search("Why is the sky blue?")
            .await
            .unwrap()
    };

    let first = run().await;
    let second = run().await;

    assert_eq!(first.tree, second.tree);
    assert_eq!(first.answer, second.answer);
    assert_eq!(first.evaluations, 5);
    assert_eq!(first.tree.nodes.len(), 5);
}

#[tokio::test]
async fn test_default_budget_expands_both_root_children_first() {
    let provider = Arc::new(ScriptedProvider::new("draft", "revision", "7").numbered_revisions());
    let outcome = MctsEngine::new(provider, "test-model", config(2, 2, 2))
        .search("Why is the sky blue?")
        .await
        .unwrap();

    let nodes = &outcome.tree.nodes;
    // Round 1 fills the root; round 2 expands under each root child
    assert_eq!(nodes[1].parent, Some(0));
    assert_eq!(nodes[2].parent, Some(0));
    assert_eq!(nodes[3].parent, Some(1));
    assert_eq!(nodes[4].parent, Some(2));
    assert_eq!(nodes[0].visits, 5);
    assert!(nodes.iter().all(|node| node.visits >= 1));
}

#[tokio::test]
async fn test_transport_error_carries_best_so_far() {
    // Evaluations: root (1), round 1 (2), round 2 (3, fails)
    let provider = Arc::new(
        ScriptedProvider::new("draft", "improved", "8").failing_evaluation(3),
    );
    let engine = MctsEngine::new(provider, "test-model", config(2, 1, 1));

    let err = engine.search("Q?").await.unwrap_err();

    assert!(matches!(
        err,
        SearchError::Llm {
            source: LLMError::ApiError { status: 500, .. },
            ..
        }
    ));
    assert_eq!(err.best_so_far(), Some("improved"));
    assert!(!err.is_client_error());
}

#[tokio::test]
async fn test_transport_error_before_any_round_returns_root_draft() {
    let provider = Arc::new(ScriptedProvider::new("draft", "improved", "8").failing_evaluation(1));
    let engine = MctsEngine::new(provider, "test-model", config(2, 1, 1));

    let err = engine.search("Q?").await.unwrap_err();
    assert_eq!(err.best_so_far(), Some("draft"));
}

#[tokio::test]
async fn test_zero_iterations_returns_root() {
    let provider = Arc::new(ScriptedProvider::new("only draft", "x", "6"));
    let outcome = MctsEngine::new(provider, "test-model", config(0, 2, 2))
        .search("Q?")
        .await
        .unwrap();

    assert_eq!(outcome.answer, "only draft");
    assert_eq!(outcome.best_score, 6.0);
    assert_eq!(outcome.iterations_completed, 0);
    assert_eq!(outcome.evaluations, 1);
}

#[tokio::test]
async fn test_rounds_on_processed_leaves_add_no_evaluations() {
    // With no room for children, every selection lands on the evaluated root
    let provider = Arc::new(ScriptedProvider::new("draft", "x", "5"));
    let outcome = MctsEngine::new(provider.clone(), "test-model", config(3, 2, 0))
        .search("Q?")
        .await
        .unwrap();

    assert_eq!(outcome.iterations_completed, 3);
    assert_eq!(outcome.evaluations, 1);
    assert_eq!(outcome.tree.nodes.len(), 1);
    assert_eq!(outcome.tree.nodes[0].visits, 1);
    assert_eq!(outcome.answer, "draft");
    assert_eq!(
        provider.calls(),
        vec![PromptKind::Initial, PromptKind::Evaluate]
    );
}

#[tokio::test]
async fn test_cancel_before_start_skips_rounds() {
    let provider = Arc::new(ScriptedProvider::new("draft", "x", "5"));
    let token = CancellationToken::new();
    token.cancel();

    let sink = Arc::new(RecordingSink::new());
    let outcome = MctsEngine::new(provider, "test-model", config(3, 2, 2))
        .with_sink(sink.clone())
        .with_cancellation(token)
        .search("Q?")
        .await
        .unwrap();

    assert!(outcome.cancelled);
    assert_eq!(outcome.iterations_completed, 0);
    assert_eq!(outcome.answer, "draft");

    let statuses = sink.statuses();
    assert_eq!(statuses.len(), 1);
    assert!(statuses[0].done);
}

#[tokio::test]
async fn test_cancel_between_rounds() {
    let provider = Arc::new(ScriptedProvider::new("draft", "revision", "5").numbered_revisions());
    let token = CancellationToken::new();

    let trigger = token.clone();
    let sink = FnSink::new(move |event: SearchEvent| {
        let trigger = trigger.clone();
        async move {
            if let SearchEvent::Status(update) = &event {
                if update.description == "Iteration 1/3" {
                    trigger.cancel();
                }
            }
            Ok::<(), SinkError>(())
        }
    });

    let outcome = MctsEngine::new(provider, "test-model", config(3, 1, 2))
        .with_sink(Arc::new(sink))
        .with_cancellation(token)
        .search("Q?")
        .await
        .unwrap();

    // The round in flight finishes; the next one never starts
    assert!(outcome.cancelled);
    assert_eq!(outcome.iterations_completed, 1);
    assert_eq!(outcome.evaluations, 2);
    assert_eq!(outcome.answer, "revision #1");
}

#[tokio::test]
async fn test_event_order() {
    let provider = Arc::new(ScriptedProvider::new("4", "4", "10"));
    let sink = Arc::new(RecordingSink::new());
    MctsEngine::new(provider, "test-model", config(1, 1, 1))
        .with_sink(sink.clone() as Arc<dyn EventSink>)
        .search("What is 2+2?")
        .await
        .unwrap();

    let events = sink.events();
    let kinds: Vec<&str> = events.iter().map(SearchEvent::kind).collect();

    // Root score fragments, initial snapshot, then the round
    assert_eq!(&kinds[..4], &["message", "message", "replace", "status"]);
    assert_eq!(
        events[3],
        SearchEvent::status(draftsearch_core::StatusLevel::Info, "Iteration 1/1", false)
    );
    assert_eq!(
        events[events.len() - 2],
        SearchEvent::message("Best Answer:\n4")
    );
    assert_eq!(
        events[events.len() - 1],
        SearchEvent::status(draftsearch_core::StatusLevel::Info, "Done", true)
    );
    assert_eq!(kinds.iter().filter(|kind| **kind == "replace").count(), 2);

    // Streamed fragments arrive in order: root score, critique, revision, child score
    let text = sink.message_text();
    assert_eq!(text, "10Show the working.410Best Answer:\n4");

    match &events[2] {
        SearchEvent::Replace { content } => {
            assert!(content.starts_with("```mermaid\ngraph LR\n"));
            assert!(content.contains("<summary>Initial draft</summary>"));
        }
        other => panic!("expected replace, got {other:?}"),
    }
}

#[tokio::test]
async fn test_concurrent_sessions_share_provider() {
    let provider = Arc::new(ScriptedProvider::new("4", "4", "10"));

    let sessions = (0..4).map(|_| {
        let provider = provider.clone();
        tokio::spawn(async move {
            MctsEngine::new(provider, "test-model", config(1, 1, 1))
                .search("What is 2+2?")
                .await
        })
    });

    for handle in sessions.collect::<Vec<_>>() {
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.answer, "4");
        assert_eq!(outcome.tree.nodes[0].visits, 2);
    }
}

#[tokio::test]
async fn test_transport_error_reports_error_status() {
    let provider = Arc::new(ScriptedProvider::new("draft", "improved", "8").failing_evaluation(1));
    let sink = Arc::new(RecordingSink::new());
    let engine = MctsEngine::new(provider, "test-model", config(2, 1, 1)).with_sink(sink.clone());

    assert!(engine.search("Q?").await.is_err());

    let last = sink.statuses().pop().unwrap();
    assert_eq!(last.level, StatusLevel::Error);
    assert!(last.done);
    assert!(last.description.starts_with("LLM request failed"));
}

#[tokio::test]
async fn test_full_channel_holds_the_search_back() {
    let provider = Arc::new(ScriptedProvider::new("draft", "revision", "7"));
    let (sink, mut rx) = ChannelSink::new(1);
    let engine = MctsEngine::new(provider, "test-model", config(2, 2, 2)).with_sink(Arc::new(sink));

    let search = tokio::spawn(async move { engine.search("Q?").await });

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(!search.is_finished());

    let mut received = 0;
    while rx.recv().await.is_some() {
        received += 1;
    }
    let outcome = search.await.unwrap().unwrap();
    assert!(received > 1);
    assert!(!outcome.cancelled);
}
