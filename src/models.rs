//! Request-scoped values that flow between pipeline stages.
//!
//! Nothing here is persisted. Each stage produces a fresh value and hands
//! it to the next one.

use serde::Serialize;

/// A fixed-length embedding of the query text.
pub type EmbeddingVector = Vec<f32>;

/// A passage returned by the vector index, ordered by descending score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedPassage {
    pub id: String,
    pub text: String,
    pub score: f32,
    /// Remaining metadata from the index match, minus the `text` field.
    pub metadata: Option<serde_json::Value>,
}

/// Chat role understood by the generation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// The structured prompt sent to the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptMessages {
    pub messages: Vec<ChatMessage>,
}

impl PromptMessages {
    /// Content of the last user message, if any.
    pub fn user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// The retriever's product: ranked passages and the joined context string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Retrieval {
    pub passages: Vec<RetrievedPassage>,
    pub context: String,
}

impl Retrieval {
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

/// Final answer text plus whether the fallback message was substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedAnswer {
    pub text: String,
    pub fell_back: bool,
}
