//! Grounded answer generation.
//!
//! [`build_prompt`] is a pure function turning a [`Persona`], the retrieved
//! context, and the user's question into [`PromptMessages`]. A [`Generator`]
//! sends that prompt to a text-generation service; [`OpenAIChat`] is the
//! production implementation using `POST {base_url}/chat/completions`.
//!
//! [`AnswerGenerator`] wraps a generator with the failure policy: when the
//! service errors or returns no usable text, it either substitutes the
//! configured fallback message or reports a generation failure.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{FailurePolicy, GenerationConfig};
use crate::http::{build_client, join_url, send_json, RetryPolicy};
use crate::models::{ChatMessage, GeneratedAnswer, PromptMessages};

/// Fixed voice of the assistant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    /// System-role instruction.
    pub system: String,
    /// Opening line of the user-role message.
    pub introduction: String,
    /// Tone instruction plus the prefer-context-then-general-knowledge rule.
    pub guidance: String,
}

impl Persona {
    /// The folksy "Old Timer" baseball historian.
    pub fn old_timer() -> Self {
        Self {
            system: "You are a friendly baseball historian who speaks in a folksy manner."
                .to_string(),
            introduction: "You are an \"Old Timer\" baseball historian.".to_string(),
            guidance: "Answer the user in a friendly, folksy tone. If the context doesn't \
                       contain relevant information, you can draw from your general baseball \
                       knowledge, but prioritize the context if available."
                .to_string(),
        }
    }
}

/// Builds the system + user messages for one question.
///
/// The context block is labelled as background knowledge and left empty
/// when retrieval found nothing; the guidance tells the model to fall back
/// on general knowledge in that case. The query is quoted verbatim.
pub fn build_prompt(persona: &Persona, context: &str, query: &str) -> PromptMessages {
    let user = format!(
        concat!(
            "{intro}\nContext from baseball knowledge base:\n{context}\n---\n",
            "{guidance}\nUser message: \"{query}\""
        ),
        intro = persona.introduction,
        context = context,
        guidance = persona.guidance,
        query = query,
    );

    PromptMessages {
        messages: vec![ChatMessage::system(persona.system.clone()), ChatMessage::user(user)],
    }
}

/// Sampling parameters sent with every completion request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A chat-style text-generation service.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    /// Returns the generated text, or `None` when the service answered
    /// without any content.
    async fn complete(&self, prompt: &PromptMessages) -> Result<Option<String>>;
}

// ============ OpenAI Provider ============

/// Chat completions client for the OpenAI API.
pub struct OpenAIChat {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    sampling: SamplingParams,
    retry: RetryPolicy,
}

impl OpenAIChat {
    pub fn new(config: &GenerationConfig, api_key: &str) -> Result<Self> {
        if api_key.is_empty() {
            return Err(anyhow!("OpenAI API key must not be empty"));
        }

        Ok(Self {
            client: build_client(config.timeout_secs)?,
            api_key: api_key.to_string(),
            url: join_url(&config.base_url, "chat/completions"),
            model: config.model.clone(),
            sampling: SamplingParams {
                temperature: config.temperature,
                max_tokens: config.max_tokens,
            },
            retry: RetryPolicy::new(config.max_retries, config.backoff_base_ms),
        })
    }

    fn request_body(&self, prompt: &PromptMessages) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": prompt.messages,
            "temperature": self.sampling.temperature,
            "max_tokens": self.sampling.max_tokens,
        })
    }
}

#[async_trait]
impl Generator for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &PromptMessages) -> Result<Option<String>> {
        let body = self.request_body(prompt);

        let json = send_json("OpenAI", self.retry, || {
            self.client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;

        parse_completion_response(&json)
    }
}

/// Extracts `choices[0].message.content`. A null content is `None`.
fn parse_completion_response(json: &serde_json::Value) -> Result<Option<String>> {
    let first = json
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices array"))?
        .first();

    let Some(choice) = first else {
        return Ok(None);
    };

    Ok(choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string()))
}

// ============ Answer generator ============

/// Prompt construction, the generation call, and the failure policy.
#[derive(Clone)]
pub struct AnswerGenerator {
    generator: Arc<dyn Generator>,
    persona: Persona,
    policy: FailurePolicy,
    fallback_message: String,
}

/// Why generation produced no usable text.
#[derive(Debug)]
pub enum GenerationOutcome {
    Answered(String),
    Empty,
    Failed(anyhow::Error),
}

impl AnswerGenerator {
    pub fn new(
        generator: Arc<dyn Generator>,
        policy: FailurePolicy,
        fallback_message: impl Into<String>,
    ) -> Self {
        Self {
            generator,
            persona: Persona::old_timer(),
            policy,
            fallback_message: fallback_message.into(),
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Model identifier of the underlying generator, for logs.
    pub fn model_name(&self) -> &str {
        self.generator.model_name()
    }

    pub fn prompt_for(&self, query: &str, context: &str) -> PromptMessages {
        build_prompt(&self.persona, context, query)
    }

    /// Runs one completion and classifies the result. Never applies the policy.
    pub async fn attempt(&self, prompt: &PromptMessages) -> GenerationOutcome {
        match self.generator.complete(prompt).await {
            Ok(Some(text)) if !text.trim().is_empty() => {
                GenerationOutcome::Answered(text.trim().to_string())
            }
            Ok(_) => GenerationOutcome::Empty,
            Err(e) => GenerationOutcome::Failed(e),
        }
    }

    /// Applies the failure policy to an outcome.
    ///
    /// Returns `Err` with a description only under [`FailurePolicy::Error`].
    pub fn resolve(&self, outcome: GenerationOutcome) -> Result<GeneratedAnswer, String> {
        let problem = match outcome {
            GenerationOutcome::Answered(text) => {
                return Ok(GeneratedAnswer {
                    text,
                    fell_back: false,
                })
            }
            GenerationOutcome::Empty => "service returned no content".to_string(),
            GenerationOutcome::Failed(e) => format!("{:#}", e),
        };

        match self.policy {
            FailurePolicy::Fallback => Ok(GeneratedAnswer {
                text: self.fallback_message.clone(),
                fell_back: true,
            }),
            FailurePolicy::Error => Err(problem),
        }
    }
}
