//! Recording stub services shared by the integration tests.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use oldtimer::config::FailurePolicy;
use oldtimer::embedding::Embedder;
use oldtimer::generation::{AnswerGenerator, Generator};
use oldtimer::models::{PromptMessages, RetrievedPassage};
use oldtimer::pipeline::Pipeline;
use oldtimer::retrieval::{Retriever, VectorIndex};

pub const FALLBACK: &str = "Shucks, friend, ask me again in a minute.";

// ─── Embedder ───────────────────────────────────────────────────────

pub struct StubEmbedder {
    reply: Result<Vec<f32>, String>,
    delay: Option<Duration>,
    dims: Option<usize>,
    calls: AtomicUsize,
}

impl StubEmbedder {
    pub fn fixed(vector: Vec<f32>) -> Self {
        Self {
            reply: Ok(vector),
            delay: None,
            dims: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            ..Self::fixed(Vec::new())
        }
    }

    pub fn slow(vector: Vec<f32>, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::fixed(vector)
        }
    }

    pub fn with_dims(mut self, dims: usize) -> Self {
        self.dims = Some(dims);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    fn model_name(&self) -> &str {
        "stub-embedder"
    }

    fn dims(&self) -> Option<usize> {
        self.dims
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone().map_err(|e| anyhow!(e))
    }
}

// ─── Vector index ───────────────────────────────────────────────────

pub struct StubIndex {
    reply: Result<Vec<RetrievedPassage>, String>,
    calls: AtomicUsize,
}

impl StubIndex {
    pub fn with_texts(texts: &[&str]) -> Self {
        let passages = texts
            .iter()
            .enumerate()
            .map(|(i, t)| RetrievedPassage {
                id: format!("p{}", i),
                text: t.to_string(),
                score: 1.0 - i as f32 * 0.1,
                metadata: None,
            })
            .collect();
        Self {
            reply: Ok(passages),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::with_texts(&[])
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorIndex for StubIndex {
    fn name(&self) -> &str {
        "stub-index"
    }

    async fn query(&self, _vector: &[f32], top_k: usize) -> Result<Vec<RetrievedPassage>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut passages = self.reply.clone().map_err(|e| anyhow!(e))?;
        passages.truncate(top_k);
        Ok(passages)
    }
}

// ─── Generator ──────────────────────────────────────────────────────

pub enum GenMode {
    /// Replies with the context section of the prompt.
    EchoContext,
    Fixed(String),
    Fail(String),
    Empty,
}

pub struct StubGenerator {
    mode: GenMode,
    prompts: Mutex<Vec<PromptMessages>>,
}

impl StubGenerator {
    pub fn new(mode: GenMode) -> Self {
        Self {
            mode,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<PromptMessages> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn contexts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().iter().map(context_of).collect()
    }
}

/// Pulls the background-knowledge block out of a built prompt.
pub fn context_of(prompt: &PromptMessages) -> String {
    let user = prompt.user_content().expect("prompt has a user message");
    let start = user
        .find("knowledge base:\n")
        .map(|i| i + "knowledge base:\n".len())
        .expect("prompt has a context label");
    let end = user[start..].find("\n---").expect("prompt has a context terminator") + start;
    user[start..end].to_string()
}

#[async_trait]
impl Generator for StubGenerator {
    fn model_name(&self) -> &str {
        "stub-generator"
    }

    async fn complete(&self, prompt: &PromptMessages) -> Result<Option<String>> {
        self.prompts.lock().unwrap().push(prompt.clone());
        match &self.mode {
            GenMode::EchoContext => Ok(Some(format!("From the archives: {}", context_of(prompt)))),
            GenMode::Fixed(text) => Ok(Some(text.clone())),
            GenMode::Fail(message) => Err(anyhow!(message.clone())),
            GenMode::Empty => Ok(None),
        }
    }
}

// ─── Harness ────────────────────────────────────────────────────────

pub struct Harness {
    pub embedder: Arc<StubEmbedder>,
    pub index: Arc<StubIndex>,
    pub generator: Arc<StubGenerator>,
    pub pipeline: Pipeline,
}

impl Harness {
    pub fn new(embedder: StubEmbedder, index: StubIndex, generator: StubGenerator) -> Self {
        Self::with_policy(embedder, index, generator, FailurePolicy::Fallback)
    }

    pub fn with_policy(
        embedder: StubEmbedder,
        index: StubIndex,
        generator: StubGenerator,
        policy: FailurePolicy,
    ) -> Self {
        let embedder = Arc::new(embedder);
        let index = Arc::new(index);
        let generator = Arc::new(generator);
        let pipeline = Pipeline::new(
            embedder.clone(),
            Retriever::new(index.clone(), 3),
            AnswerGenerator::new(generator.clone(), policy, FALLBACK),
        );
        Self {
            embedder,
            index,
            generator,
            pipeline,
        }
    }

    pub fn total_calls(&self) -> usize {
        self.embedder.calls() + self.index.calls() + self.generator.calls()
    }
}
