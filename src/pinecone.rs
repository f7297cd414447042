//! Pinecone vector index client.
//!
//! Two endpoints are used:
//!
//! | Plane | Request | Purpose |
//! |-------|---------|---------|
//! | control | `GET {control_plane_url}/indexes/{name}` | resolve host and dimension at startup |
//! | data | `POST https://{host}/query` | top-K similarity search per request |
//!
//! Passage text is read from the `text` metadata field written by the
//! ingestion job; the rest of the metadata is carried through untouched.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::IndexConfig;
use crate::http::{build_client, join_url, send_json, RetryPolicy};
use crate::models::RetrievedPassage;
use crate::retrieval::VectorIndex;

/// Pinecone REST API version sent with every request.
pub const API_VERSION: &str = "2024-07";

/// Metadata key holding the passage text.
pub const TEXT_METADATA_KEY: &str = "text";

/// Control-plane view of an index.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexDescription {
    pub name: String,
    pub host: String,
    #[serde(default)]
    pub dimension: Option<usize>,
    #[serde(default)]
    pub metric: Option<String>,
    #[serde(default)]
    pub status: Option<IndexStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub state: Option<String>,
}

impl IndexDescription {
    pub fn is_ready(&self) -> bool {
        self.status.as_ref().map(|s| s.ready).unwrap_or(true)
    }

    /// Control-plane lifecycle state, e.g. `Ready` or `Initializing`.
    pub fn state(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|s| s.state.as_deref())
            .unwrap_or("unknown")
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: Option<f32>,
    #[serde(default)]
    metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Looks up an index by name on the control plane.
pub async fn describe_index(
    config: &IndexConfig,
    api_key: &str,
    name: &str,
) -> Result<IndexDescription> {
    let client = build_client(config.timeout_secs)?;
    let url = join_url(&config.control_plane_url, &format!("indexes/{}", name));
    let retry = RetryPolicy::new(config.max_retries, config.backoff_base_ms);

    let json = send_json("Pinecone", retry, || {
        client
            .get(&url)
            .header("Api-Key", api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    })
    .await
    .with_context(|| format!("Failed to describe index '{}'", name))?;

    serde_json::from_value(json)
        .with_context(|| format!("Invalid Pinecone description for index '{}'", name))
}

/// A Pinecone index queried over the data-plane REST API.
pub struct PineconeIndex {
    client: reqwest::Client,
    api_key: String,
    name: String,
    query_url: String,
    namespace: Option<String>,
    filter: Option<serde_json::Value>,
    dims: Option<usize>,
    retry: RetryPolicy,
}

impl PineconeIndex {
    /// Builds a client for a known host without contacting the control plane.
    pub fn with_host(
        config: &IndexConfig,
        api_key: &str,
        name: &str,
        host: &str,
        dims: Option<usize>,
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(anyhow!("Pinecone API key must not be empty"));
        }
        if host.trim().is_empty() {
            return Err(anyhow!("Pinecone host for index '{}' is empty", name));
        }

        Ok(Self {
            client: build_client(config.timeout_secs)?,
            api_key: api_key.to_string(),
            name: name.to_string(),
            query_url: join_url(&normalize_host(host), "query"),
            namespace: config.namespace.clone().filter(|ns| !ns.is_empty()),
            filter: config.filter.clone(),
            dims,
            retry: RetryPolicy::new(config.max_retries, config.backoff_base_ms),
        })
    }

    /// Uses `index.host` when configured, otherwise resolves it (and the
    /// index dimension) through the control plane.
    pub async fn connect(config: &IndexConfig, api_key: &str, name: &str) -> Result<Self> {
        match config.host.as_deref().filter(|h| !h.trim().is_empty()) {
            Some(host) => Self::with_host(config, api_key, name, host, None),
            None => {
                let description = describe_index(config, api_key, name).await?;
                if !description.is_ready() {
                    tracing::warn!(
                        index = %description.name,
                        state = description.state(),
                        "index reports it is not ready yet"
                    );
                }
                Self::with_host(
                    config,
                    api_key,
                    name,
                    &description.host,
                    description.dimension,
                )
            }
        }
    }

    pub fn query_url(&self) -> &str {
        &self.query_url
    }

    fn query_body(&self, vector: &[f32], top_k: usize) -> serde_json::Value {
        let mut body = serde_json::json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
            "includeValues": false,
        });
        if let Some(ns) = &self.namespace {
            body["namespace"] = serde_json::Value::String(ns.clone());
        }
        if let Some(filter) = &self.filter {
            body["filter"] = filter.clone();
        }
        body
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn dims(&self) -> Option<usize> {
        self.dims
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievedPassage>> {
        let body = self.query_body(vector, top_k);

        let json = send_json("Pinecone", self.retry, || {
            self.client
                .post(&self.query_url)
                .header("Api-Key", &self.api_key)
                .header("X-Pinecone-API-Version", API_VERSION)
                .json(&body)
        })
        .await?;

        parse_query_response(json)
    }
}

fn parse_query_response(json: serde_json::Value) -> Result<Vec<RetrievedPassage>> {
    let response: QueryResponse =
        serde_json::from_value(json).context("Invalid Pinecone query response")?;

    Ok(response
        .matches
        .into_iter()
        .map(|m| {
            let mut metadata = m.metadata.unwrap_or_default();
            let text = match metadata.remove(TEXT_METADATA_KEY) {
                Some(serde_json::Value::String(s)) => s,
                _ => String::new(),
            };
            RetrievedPassage {
                id: m.id,
                text,
                score: m.score.unwrap_or(0.0),
                metadata: if metadata.is_empty() {
                    None
                } else {
                    Some(serde_json::Value::Object(metadata))
                },
            }
        })
        .collect())
}

/// Control-plane hosts come without a scheme.
fn normalize_host(host: &str) -> String {
    let host = host.trim();
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}
