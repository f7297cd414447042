//! End-to-end pipeline behaviour against deterministic stub services.

mod common;

use std::time::Duration;

use common::{GenMode, Harness, StubEmbedder, StubGenerator, StubIndex, FALLBACK};
use oldtimer::config::FailurePolicy;
use oldtimer::error::{PipelineError, Stage};

const FERGIE: &str = "Fergie Jenkins is often cited as the greatest Cubs pitcher.";

fn happy_path(mode: GenMode) -> Harness {
    Harness::new(
        StubEmbedder::fixed(vec![0.1, 0.2, 0.3]),
        StubIndex::with_texts(&[FERGIE]),
        StubGenerator::new(mode),
    )
}

#[tokio::test]
async fn test_answer_contains_retrieved_passage() {
    let h = happy_path(GenMode::EchoContext);

    let outcome = h
        .pipeline
        .ask("who was the best Cubs pitcher of all time?")
        .await
        .unwrap();

    assert!(outcome.answer.contains(FERGIE), "got: {}", outcome.answer);
    assert!(!outcome.fell_back);
    assert_eq!(outcome.passages.len(), 1);
    assert_eq!(
        outcome.transitions,
        vec![
            Stage::Validating,
            Stage::Embedding,
            Stage::Retrieving,
            Stage::Generating,
            Stage::Done
        ]
    );
    assert_eq!(h.embedder.calls(), 1);
    assert_eq!(h.index.calls(), 1);
    assert_eq!(h.generator.calls(), 1);
}

#[tokio::test]
async fn test_whitespace_only_makes_no_calls() {
    let h = happy_path(GenMode::EchoContext);

    let err = h.pipeline.ask("   ").await.unwrap_err();

    assert!(matches!(err, PipelineError::Validation(_)));
    assert!(err.is_client_error());
    assert_eq!(h.total_calls(), 0);
}

#[tokio::test]
async fn test_invalid_payloads_make_no_calls() {
    let h = happy_path(GenMode::EchoContext);

    let bodies: [&[u8]; 6] = [
        b"",
        br#"{}"#,
        br#"{"message": ""}"#,
        br#"{"message": "  \n "}"#,
        br#"{"message": 7}"#,
        br#"not json"#,
    ];
    for body in bodies {
        let err = h.pipeline.handle_payload(body).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }
    assert_eq!(h.total_calls(), 0);
}

#[tokio::test]
async fn test_embedding_failure_stops_pipeline() {
    let h = Harness::new(
        StubEmbedder::failing("connection refused"),
        StubIndex::with_texts(&[FERGIE]),
        StubGenerator::new(GenMode::EchoContext),
    );

    let err = h
        .pipeline
        .ask("who was the best Cubs pitcher of all time?")
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Embedding(_)));
    assert!(err.to_string().contains("connection refused"));
    assert_eq!(err.stage(), Stage::Embedding);
    assert_eq!(h.embedder.calls(), 1);
    assert_eq!(h.index.calls(), 0);
    assert_eq!(h.generator.calls(), 0);
}

#[tokio::test]
async fn test_empty_vector_counts_as_embedding_failure() {
    let h = Harness::new(
        StubEmbedder::fixed(Vec::new()),
        StubIndex::with_texts(&[FERGIE]),
        StubGenerator::new(GenMode::EchoContext),
    );

    let err = h.pipeline.ask("Ernie Banks?").await.unwrap_err();

    assert!(matches!(err, PipelineError::Embedding(_)));
    assert_eq!(h.index.calls(), 0);
    assert_eq!(h.generator.calls(), 0);
}

#[tokio::test]
async fn test_zero_matches_still_generates() {
    let h = Harness::new(
        StubEmbedder::fixed(vec![0.1, 0.2, 0.3]),
        StubIndex::empty(),
        StubGenerator::new(GenMode::Fixed("Well, back in my day...".into())),
    );

    let outcome = h.pipeline.ask("who played short in 1907?").await.unwrap();

    assert_eq!(outcome.answer, "Well, back in my day...");
    assert!(outcome.passages.is_empty());
    assert_eq!(h.generator.calls(), 1);
    assert_eq!(h.generator.contexts(), vec![String::new()]);
    assert_eq!(outcome.transitions.last(), Some(&Stage::Done));
}

#[tokio::test]
async fn test_retrieval_failure_is_reported_and_skips_generation() {
    let h = Harness::new(
        StubEmbedder::fixed(vec![0.1, 0.2, 0.3]),
        StubIndex::failing("Pinecone API error 503"),
        StubGenerator::new(GenMode::EchoContext),
    );

    let err = h.pipeline.ask("Ryne Sandberg?").await.unwrap_err();

    assert!(matches!(err, PipelineError::Retrieval(_)));
    assert_eq!(err.stage(), Stage::Retrieving);
    assert_eq!(h.index.calls(), 1);
    assert_eq!(h.generator.calls(), 0);
}

#[tokio::test]
async fn test_context_preserves_relevance_order() {
    let h = Harness::new(
        StubEmbedder::fixed(vec![1.0]),
        StubIndex::with_texts(&["first", "second", "third"]),
        StubGenerator::new(GenMode::EchoContext),
    );

    h.pipeline.ask("order?").await.unwrap();

    assert_eq!(h.generator.contexts(), vec!["first\nsecond\nthird".to_string()]);
}

#[tokio::test]
async fn test_top_k_limits_context() {
    let h = Harness::new(
        StubEmbedder::fixed(vec![1.0]),
        StubIndex::with_texts(&["a", "b", "c", "d", "e"]),
        StubGenerator::new(GenMode::EchoContext),
    );

    let outcome = h.pipeline.ask("how many?").await.unwrap();

    assert_eq!(outcome.passages.len(), 3);
    assert_eq!(h.generator.contexts(), vec!["a\nb\nc".to_string()]);
}

#[tokio::test]
async fn test_same_input_same_result() {
    let h = happy_path(GenMode::EchoContext);

    let first = h.pipeline.ask("who was the best Cubs pitcher?").await.unwrap();
    let second = h.pipeline.ask("who was the best Cubs pitcher?").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(h.generator.calls(), 2);
}

#[tokio::test]
async fn test_generation_failure_falls_back_by_default() {
    for mode in [GenMode::Fail("model overloaded".into()), GenMode::Empty] {
        let h = happy_path(mode);

        let outcome = h.pipeline.ask("who won in 2016?").await.unwrap();

        assert_eq!(outcome.answer, FALLBACK);
        assert!(outcome.fell_back);
        assert_eq!(outcome.transitions.last(), Some(&Stage::Done));
    }
}

#[tokio::test]
async fn test_generation_failure_surfaces_under_error_policy() {
    let h = Harness::with_policy(
        StubEmbedder::fixed(vec![0.1]),
        StubIndex::with_texts(&[FERGIE]),
        StubGenerator::new(GenMode::Fail("model overloaded".into())),
        FailurePolicy::Error,
    );

    let err = h.pipeline.ask("who won in 2016?").await.unwrap_err();

    assert!(matches!(err, PipelineError::Generation(_)));
    assert!(err.to_string().contains("model overloaded"));
}

#[tokio::test]
async fn test_dimension_mismatch_is_configuration_error() {
    let h = Harness::new(
        StubEmbedder::fixed(vec![0.1, 0.2]).with_dims(1536),
        StubIndex::with_texts(&[FERGIE]),
        StubGenerator::new(GenMode::EchoContext),
    );

    let err = h.pipeline.ask("Hack Wilson?").await.unwrap_err();

    assert!(matches!(err, PipelineError::Configuration(_)));
    assert!(!err.is_client_error());
    assert_eq!(h.index.calls(), 0);
}

#[tokio::test]
async fn test_stage_timeout_counts_as_stage_failure() {
    let h = Harness::new(
        StubEmbedder::slow(vec![0.1], Duration::from_secs(5)),
        StubIndex::with_texts(&[FERGIE]),
        StubGenerator::new(GenMode::EchoContext),
    );
    let pipeline = h
        .pipeline
        .with_stage_timeout(Some(Duration::from_millis(50)));

    let err = pipeline.ask("Three Finger Brown?").await.unwrap_err();

    assert!(matches!(err, PipelineError::Embedding(_)));
    assert!(err.to_string().contains("timed out"));
    assert_eq!(h.index.calls(), 0);
}

#[tokio::test]
async fn test_handle_payload_trims_message() {
    let h = happy_path(GenMode::EchoContext);

    let outcome = h
        .pipeline
        .handle_payload(br#"{"message": "   who was the best Cubs pitcher?   "}"#)
        .await
        .unwrap();

    assert!(outcome.answer.contains(FERGIE));
    let prompts = h.generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0]
        .user_content()
        .unwrap()
        .ends_with("User message: \"who was the best Cubs pitcher?\""));
}

#[tokio::test]
async fn test_in_memory_index_ranks_closest_passage_first() {
    use oldtimer::generation::AnswerGenerator;
    use oldtimer::pipeline::Pipeline;
    use oldtimer::retrieval::{InMemoryIndex, Retriever};
    use std::sync::Arc;

    let index = InMemoryIndex::new("cubs-history");
    index.upsert("wrigley", "Wrigley Field opened in 1914.", vec![0.0, 1.0]);
    index.upsert("fergie", FERGIE, vec![1.0, 0.1]);
    index.upsert("blank", "   ", vec![1.0, 0.0]);

    let generator = Arc::new(StubGenerator::new(GenMode::EchoContext));
    let pipeline = Pipeline::new(
        Arc::new(StubEmbedder::fixed(vec![1.0, 0.0])),
        Retriever::new(Arc::new(index), 3),
        AnswerGenerator::new(generator.clone(), FailurePolicy::Fallback, FALLBACK),
    );

    let outcome = pipeline.ask("best Cubs pitcher?").await.unwrap();

    let ids: Vec<&str> = outcome.passages.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["fergie", "wrigley"]);
    assert_eq!(
        generator.contexts(),
        vec![format!("{}\nWrigley Field opened in 1914.", FERGIE)]
    );
}
