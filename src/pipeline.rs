//! Request pipeline orchestrator.
//!
//! ```text
//! Validating ──▶ Embedding ──▶ Retrieving ──▶ Generating ──▶ Done
//!      │             │              │              │
//!      └─────────────┴──────────────┴──────────────┴──▶ Error
//! ```
//!
//! Stages run strictly in sequence; each one's output is the next one's
//! only input. Per-stage policy:
//!
//! | Stage | On failure |
//! |-------|------------|
//! | Validating | [`PipelineError::Validation`], no outbound calls made |
//! | Embedding | [`PipelineError::Embedding`] (or `Configuration` on a dimension mismatch) |
//! | Retrieving | [`PipelineError::Retrieval`]; zero matches is *not* a failure |
//! | Generating | fallback answer or [`PipelineError::Generation`], per [`FailurePolicy`] |
//!
//! The three service handles are built once at startup by
//! [`Pipeline::from_config`] and shared by all requests. Tests construct a
//! [`Pipeline`] directly around stub implementations.

use anyhow::{anyhow, bail, Context, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, FailurePolicy, PINECONE_INDEX_VAR};
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::error::{PipelineError, PipelineResult, Stage};
use crate::generation::{AnswerGenerator, GenerationOutcome, Generator, OpenAIChat};
use crate::logging::query_for_log;
use crate::models::RetrievedPassage;
use crate::pinecone::PineconeIndex;
use crate::retrieval::{Retriever, VectorIndex};
use crate::validate::{validate_message, validate_payload};

/// Result of a completed pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub answer: String,
    /// `true` when the fallback message replaced a failed generation.
    pub fell_back: bool,
    /// Passages that made it into the context, best first.
    pub passages: Vec<RetrievedPassage>,
    /// Every stage entered, in order, ending with [`Stage::Done`].
    pub transitions: Vec<Stage>,
}

pub struct Pipeline {
    embedder: Arc<dyn Embedder>,
    retriever: Retriever,
    answerer: AnswerGenerator,
    stage_timeout: Option<Duration>,
}

impl Pipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        retriever: Retriever,
        answerer: AnswerGenerator,
    ) -> Self {
        Self {
            embedder,
            retriever,
            answerer,
            stage_timeout: None,
        }
    }

    /// Sets a deadline for each outbound stage call. A timeout counts as a
    /// failure of that stage.
    pub fn with_stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Builds the production service handles.
    ///
    /// Resolves the vector index host (and dimension) once, and refuses to
    /// start when the embedding and index dimensions disagree.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let credentials = &config.credentials;
        let index_name = config
            .index_name()
            .ok_or_else(|| anyhow!("{} is not set", PINECONE_INDEX_VAR))?;

        let embedder = OpenAIEmbedder::new(&config.embedding, &credentials.openai_api_key)
            .context("Failed to create embedding client")?;

        let index = PineconeIndex::connect(&config.index, &credentials.pinecone_api_key, index_name)
            .await
            .context("Failed to connect to the vector index")?;

        check_dimensions(config.embedding.dims, index.dims())?;

        let generator = OpenAIChat::new(&config.generation, &credentials.openai_api_key)
            .context("Failed to create generation client")?;

        let retriever = Retriever::new(Arc::new(index), config.index.top_k);
        tracing::info!(
            embedding_model = embedder.model_name(),
            generation_model = generator.model_name(),
            index = retriever.index().name(),
            top_k = retriever.top_k(),
            "pipeline ready"
        );

        let answerer = AnswerGenerator::new(
            Arc::new(generator),
            config.generation.on_failure,
            config.generation.fallback_message.clone(),
        );

        Ok(Self::new(Arc::new(embedder), retriever, answerer)
            .with_stage_timeout(config.pipeline.stage_timeout_secs.map(Duration::from_secs)))
    }

    /// Validates a raw JSON request body and answers it.
    pub async fn handle_payload(&self, body: &[u8]) -> PipelineResult<PipelineOutcome> {
        let mut run = Run::start();
        let query = run.check(validate_payload(body), "")?;
        self.answer_query(run, query).await
    }

    /// Validates a bare question and answers it.
    pub async fn ask(&self, message: &str) -> PipelineResult<PipelineOutcome> {
        let mut run = Run::start();
        let query = run.check(validate_message(message), "")?;
        self.answer_query(run, query).await
    }

    async fn answer_query(&self, mut run: Run, query: String) -> PipelineResult<PipelineOutcome> {
        tracing::info!(
            model = self.embedder.model_name(),
            query = query_for_log(&query),
            "processing message"
        );

        // Embedding
        run.enter(Stage::Embedding);
        let vector = self
            .bounded(self.embedder.embed(&query))
            .await
            .map_err(|e| PipelineError::Embedding(format!("{:#}", e)))
            .and_then(|v| {
                if v.is_empty() {
                    Err(PipelineError::Embedding("no vector was produced".to_string()))
                } else {
                    Ok(v)
                }
            });
        let vector = run.check(vector, &query)?;

        let expected = self.embedder.dims().or_else(|| self.retriever.index().dims());
        if let Some(expected) = expected {
            if vector.len() != expected {
                let err = PipelineError::Configuration(format!(
                    "embedding has {} dimensions but {} were expected",
                    vector.len(),
                    expected
                ));
                return Err(run.fail(err, &query));
            }
        }

        // Retrieval
        run.enter(Stage::Retrieving);
        let retrieval = self
            .bounded(self.retriever.retrieve(&vector))
            .await
            .map_err(|e| PipelineError::Retrieval(format!("{:#}", e)));
        let retrieval = run.check(retrieval, &query)?;
        if retrieval.is_empty() {
            tracing::info!("no indexed passages matched; answering from general knowledge");
        } else {
            tracing::debug!(
                passages = retrieval.passages.len(),
                context_len = retrieval.context.len(),
                "retrieved context"
            );
        }

        // Generation
        run.enter(Stage::Generating);
        let prompt = self.answerer.prompt_for(&query, &retrieval.context);
        let outcome = match self.stage_timeout {
            Some(limit) => tokio::time::timeout(limit, self.answerer.attempt(&prompt))
                .await
                .unwrap_or_else(|_| {
                    GenerationOutcome::Failed(anyhow!("timed out after {:?}", limit))
                }),
            None => self.answerer.attempt(&prompt).await,
        };
        if !matches!(outcome, GenerationOutcome::Answered(_))
            && self.answerer.policy() == FailurePolicy::Fallback
        {
            tracing::warn!(
                stage = %Stage::Generating,
                model = self.answerer.model_name(),
                query = query_for_log(&query),
                outcome = ?outcome,
                "generation yielded nothing usable; substituting fallback answer"
            );
        }
        let answer = self
            .answerer
            .resolve(outcome)
            .map_err(PipelineError::Generation);
        let answer = run.check(answer, &query)?;

        run.enter(Stage::Done);
        Ok(PipelineOutcome {
            answer: answer.text,
            fell_back: answer.fell_back,
            passages: retrieval.passages,
            transitions: run.stages,
        })
    }

    /// Applies the stage deadline, if any.
    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.stage_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => bail!("timed out after {:?}", limit),
            },
            None => fut.await,
        }
    }
}

/// Refuses a configured embedding size that the index cannot hold.
pub fn check_dimensions(embedding: Option<usize>, index: Option<usize>) -> Result<()> {
    if let (Some(e), Some(i)) = (embedding, index) {
        if e != i {
            bail!(
                "embedding.dims is {} but the vector index expects {} dimensions",
                e,
                i
            );
        }
    }
    Ok(())
}

/// Stage bookkeeping for a single request.
struct Run {
    stages: Vec<Stage>,
}

impl Run {
    fn start() -> Self {
        let mut run = Self { stages: Vec::new() };
        run.enter(Stage::Validating);
        run
    }

    fn enter(&mut self, stage: Stage) {
        if let Some(from) = self.stages.last() {
            tracing::debug!(from = %from, to = %stage, "stage transition");
        }
        self.stages.push(stage);
    }

    fn check<T>(&mut self, result: PipelineResult<T>, query: &str) -> PipelineResult<T> {
        result.map_err(|e| self.fail(e, query))
    }

    fn fail(&mut self, err: PipelineError, query: &str) -> PipelineError {
        let stage = self.stages.last().copied().unwrap_or(Stage::Validating);
        if err.is_client_error() {
            tracing::warn!(stage = %stage, error = %err, "rejected request");
        } else {
            tracing::error!(
                stage = %stage,
                code = err.code(),
                query = query_for_log(query),
                error = %err,
                "pipeline failed"
            );
        }
        self.enter(Stage::Error);
        err
    }
}
