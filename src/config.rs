//! Configuration parsing and startup validation.
//!
//! Settings come from an optional TOML file; secrets come only from the
//! process environment (optionally seeded from a `.env` file by the binary).
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:3000"
//!
//! [embedding]
//! model = "text-embedding-ada-002"
//! dims = 1536
//!
//! [index]
//! top_k = 3
//! namespace = "cubs"
//!
//! [generation]
//! model = "gpt-3.5-turbo"
//! on_failure = "fallback"
//! ```
//!
//! Required environment variables:
//!
//! | Variable | Purpose |
//! |----------|---------|
//! | `OPENAI_API_KEY` | Embedding and generation provider key |
//! | `PINECONE_API_KEY` | Vector index provider key |
//! | `PINECONE_INDEX` | Vector index name (or `index.name` in the file) |
//!
//! Any of them missing is fatal: [`load_config`] fails before a single
//! request can be served.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

pub const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const PINECONE_API_KEY_VAR: &str = "PINECONE_API_KEY";
pub const PINECONE_INDEX_VAR: &str = "PINECONE_INDEX";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Provider keys, filled from the environment. Never read from the file.
    #[serde(skip)]
    pub credentials: Credentials,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_chat_path")]
    pub chat_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            chat_path: default_chat_path(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}
fn default_chat_path() -> String {
    "/api/chat".to_string()
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Expected vector dimensionality. Checked against the index when both are known.
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dims: None,
            base_url: default_openai_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: 0,
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_backoff_base_ms() -> u64 {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Index name. `PINECONE_INDEX` takes precedence when set.
    #[serde(default)]
    pub name: Option<String>,
    /// Data-plane host. Resolved through the control plane when absent.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_control_plane_url")]
    pub control_plane_url: String,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Metadata filter passed verbatim to every query.
    #[serde(default)]
    pub filter: Option<serde_json::Value>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            name: None,
            host: None,
            control_plane_url: default_control_plane_url(),
            namespace: None,
            filter: None,
            top_k: default_top_k(),
            timeout_secs: default_timeout_secs(),
            max_retries: 0,
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

fn default_control_plane_url() -> String {
    "https://api.pinecone.io".to_string()
}
fn default_top_k() -> usize {
    3
}

/// What the orchestrator does when the generation stage yields nothing usable.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Answer with `generation.fallback_message` and a success status.
    #[default]
    Fallback,
    /// Surface a generation failure to the caller.
    Error,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default)]
    pub on_failure: FailurePolicy,
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_generation_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            base_url: default_openai_base_url(),
            timeout_secs: default_generation_timeout_secs(),
            max_retries: 0,
            backoff_base_ms: default_backoff_base_ms(),
            on_failure: FailurePolicy::Fallback,
            fallback_message: default_fallback_message(),
        }
    }
}

fn default_generation_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    300
}
fn default_generation_timeout_secs() -> u64 {
    60
}
fn default_fallback_message() -> String {
    "Well, shucks. This old memory of mine went foggy for a second there, friend. \
     Give me a moment and ask me that one again."
        .to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PipelineConfig {
    /// Deadline applied to each outbound stage call, on top of the client timeouts.
    #[serde(default)]
    pub stage_timeout_secs: Option<u64>,
}

/// Provider keys. `Debug` never prints the secret values.
#[derive(Clone, Default)]
pub struct Credentials {
    pub openai_api_key: String,
    pub pinecone_api_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("pinecone_api_key", &redact(&self.pinecone_api_key))
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl Config {
    /// Overlays environment-provided values using `lookup` (normally `std::env::var`).
    ///
    /// Blank values count as unset.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(key) = get(OPENAI_API_KEY_VAR) {
            self.credentials.openai_api_key = key;
        }
        if let Some(key) = get(PINECONE_API_KEY_VAR) {
            self.credentials.pinecone_api_key = key;
        }
        if let Some(name) = get(PINECONE_INDEX_VAR) {
            self.index.name = Some(name);
        }
    }

    /// Returns the configured index name, if any.
    pub fn index_name(&self) -> Option<&str> {
        self.index.name.as_deref().filter(|n| !n.trim().is_empty())
    }

    /// Checks credentials and value ranges. All missing credentials are named at once.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.credentials.openai_api_key.is_empty() {
            missing.push(OPENAI_API_KEY_VAR);
        }
        if self.credentials.pinecone_api_key.is_empty() {
            missing.push(PINECONE_API_KEY_VAR);
        }
        if self.index_name().is_none() {
            missing.push(PINECONE_INDEX_VAR);
        }
        if !missing.is_empty() {
            anyhow::bail!(
                "Missing required environment variable(s): {}",
                missing.join(", ")
            );
        }

        if self.embedding.model.trim().is_empty() {
            anyhow::bail!("embedding.model must not be empty");
        }
        if self.embedding.dims == Some(0) {
            anyhow::bail!("embedding.dims must be > 0 when set");
        }
        if self.index.top_k == 0 {
            anyhow::bail!("index.top_k must be >= 1");
        }
        if self.generation.model.trim().is_empty() {
            anyhow::bail!("generation.model must not be empty");
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            anyhow::bail!("generation.temperature must be in [0.0, 2.0]");
        }
        if self.generation.max_tokens == 0 {
            anyhow::bail!("generation.max_tokens must be >= 1");
        }
        if self.generation.fallback_message.trim().is_empty() {
            anyhow::bail!("generation.fallback_message must not be empty");
        }

        for (key, secs) in [
            ("embedding.timeout_secs", self.embedding.timeout_secs),
            ("index.timeout_secs", self.index.timeout_secs),
            ("generation.timeout_secs", self.generation.timeout_secs),
        ] {
            if secs == 0 {
                anyhow::bail!("{} must be >= 1", key);
            }
        }
        if self.pipeline.stage_timeout_secs == Some(0) {
            anyhow::bail!("pipeline.stage_timeout_secs must be >= 1 when set");
        }

        if !self.server.chat_path.starts_with('/') {
            anyhow::bail!("server.chat_path must start with '/'");
        }

        Ok(())
    }
}

/// Parses a config file without touching the environment.
pub fn parse_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    toml::from_str(&content).with_context(|| "Failed to parse config file")
}

/// Loads the file (or defaults), overlays the environment and validates.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => parse_config_file(path)?,
        None => Config::default(),
    };

    config.apply_env(|key| std::env::var(key).ok());
    config.validate()?;

    Ok(config)
}
