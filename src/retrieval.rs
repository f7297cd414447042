//! Similarity retrieval and context assembly.
//!
//! The [`VectorIndex`] trait is the narrow interface to the external
//! vector index. [`Retriever`] asks it for the top-K passages and joins
//! their text into the context string handed to generation.
//!
//! Zero matches is a normal outcome: the retriever returns an empty
//! [`Retrieval`] rather than an error. Only a failure to reach or read
//! from the index is an error.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, RwLock};

use crate::embedding::cosine_similarity;
use crate::models::{Retrieval, RetrievedPassage};

/// Separator placed between passage texts in the context string.
pub const CONTEXT_SEPARATOR: &str = "\n";

/// Nearest-neighbour lookup over stored passages.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Index name, for logs.
    fn name(&self) -> &str;

    /// Dimensionality the index expects, when known.
    fn dims(&self) -> Option<usize> {
        None
    }

    /// Returns up to `top_k` passages, best match first.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievedPassage>>;
}

/// Joins passage texts in the given order, skipping blank ones.
pub fn assemble_context(passages: &[RetrievedPassage]) -> String {
    passages
        .iter()
        .map(|p| p.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Queries the index and builds the context string.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    top_k: usize,
}

impl Retriever {
    pub fn new(index: Arc<dyn VectorIndex>, top_k: usize) -> Self {
        Self {
            index,
            top_k: top_k.max(1),
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn index(&self) -> &dyn VectorIndex {
        self.index.as_ref()
    }

    /// Keeps the index's own ranking. Scores are not compared here since
    /// their meaning depends on the index metric (a euclidean score is a
    /// distance, lower is closer).
    ///
    /// Blank-text matches are dropped after the `top_k` cut, so the context
    /// can hold fewer than `top_k` passages.
    pub async fn retrieve(&self, vector: &[f32]) -> Result<Retrieval> {
        let mut passages = self.index.query(vector, self.top_k).await?;

        passages.truncate(self.top_k);
        passages.retain(|p| !p.text.trim().is_empty());

        let context = assemble_context(&passages);
        Ok(Retrieval { passages, context })
    }
}

// ============ In-memory index ============

/// Brute-force cosine index over passages held in memory.
///
/// Useful for local runs and tests; not meant for large corpora.
pub struct InMemoryIndex {
    name: String,
    entries: RwLock<Vec<(Vec<f32>, RetrievedPassage)>>,
}

impl InMemoryIndex {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Stores a passage under `vector`, replacing any entry with the same id.
    pub fn upsert(&self, id: &str, text: &str, vector: Vec<f32>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.retain(|(_, p)| p.id != id);
        entries.push((
            vector,
            RetrievedPassage {
                id: id.to_string(),
                text: text.to_string(),
                score: 0.0,
                metadata: None,
            },
        ));
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievedPassage>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut scored: Vec<RetrievedPassage> = entries
            .iter()
            .filter(|(v, _)| v.len() == vector.len())
            .map(|(v, p)| RetrievedPassage {
                score: cosine_similarity(vector, v),
                ..p.clone()
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        Ok(scored)
    }
}
