//! Query embedding.
//!
//! Defines the [`Embedder`] trait used by the pipeline and the
//! [`OpenAIEmbedder`] implementation that calls `POST {base_url}/embeddings`.
//! Also provides [`cosine_similarity`] for the in-memory index.

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::http::{build_client, join_url, send_json, RetryPolicy};
use crate::models::EmbeddingVector;

/// Converts text into a fixed-length vector.
///
/// Implementations are shared across concurrent requests and must not
/// hold per-request state.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-ada-002"`).
    fn model_name(&self) -> &str;

    /// Expected dimensionality, when known up front.
    fn dims(&self) -> Option<usize> {
        None
    }

    /// Embeds a single non-empty text.
    async fn embed(&self, text: &str) -> Result<EmbeddingVector>;
}

// ============ OpenAI Provider ============

/// Embedding provider backed by the OpenAI embeddings API.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    dims: Option<usize>,
    retry: RetryPolicy,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: &str) -> Result<Self> {
        if api_key.is_empty() {
            return Err(anyhow!("OpenAI API key must not be empty"));
        }

        Ok(Self {
            client: build_client(config.timeout_secs)?,
            api_key: api_key.to_string(),
            url: join_url(&config.base_url, "embeddings"),
            model: config.model.clone(),
            dims: config.dims,
            retry: RetryPolicy::new(config.max_retries, config.backoff_base_ms),
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> Option<usize> {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let json = send_json("OpenAI", self.retry, || {
            self.client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;

        parse_embedding_response(&json)
    }
}

/// Extracts `data[0].embedding` from an embeddings API response.
fn parse_embedding_response(json: &serde_json::Value) -> Result<EmbeddingVector> {
    let first = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?
        .first()
        .ok_or_else(|| anyhow!("Invalid OpenAI response: empty data array"))?;

    let embedding = first
        .get("embedding")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;

    let vector = embedding
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow!("Invalid OpenAI response: non-numeric embedding value"))
        })
        .collect::<Result<EmbeddingVector>>()?;

    if vector.is_empty() {
        return Err(anyhow!("Invalid OpenAI response: embedding is empty"));
    }

    Ok(vector)
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors or vectors
/// of different lengths.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
