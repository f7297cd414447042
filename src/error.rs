//! Pipeline stages and the per-request error taxonomy.
//!
//! Provider clients report failures as `anyhow::Error`; the orchestrator
//! converts them into a [`PipelineError`] at each stage boundary so the
//! caller always sees exactly one typed outcome.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// States of the request pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Validating,
    Embedding,
    Retrieving,
    Generating,
    Done,
    Error,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validating => "validating",
            Stage::Embedding => "embedding",
            Stage::Retrieving => "retrieving",
            Stage::Generating => "generating",
            Stage::Done => "done",
            Stage::Error => "error",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("retrieval failed: {0}")]
    Retrieval(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl PipelineError {
    /// The stage that was active when the error occurred.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Validation(_) => Stage::Validating,
            PipelineError::Embedding(_) | PipelineError::Configuration(_) => Stage::Embedding,
            PipelineError::Retrieval(_) => Stage::Retrieving,
            PipelineError::Generation(_) => Stage::Generating,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation_error",
            PipelineError::Embedding(_) => "embedding_failure",
            PipelineError::Retrieval(_) => "retrieval_failure",
            PipelineError::Generation(_) => "generation_failure",
            PipelineError::Configuration(_) => "configuration_error",
        }
    }

    /// Message shown to the caller. Upstream detail goes in the structured details.
    pub fn public_message(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "Invalid request: message is required",
            PipelineError::Embedding(_) => "Failed to create embedding for the message",
            PipelineError::Retrieval(_) => "Failed to retrieve relevant baseball knowledge",
            PipelineError::Generation(_) => "Failed to generate Old Timer's response",
            PipelineError::Configuration(_) => "Service is misconfigured",
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::Validation(_))
    }
}
